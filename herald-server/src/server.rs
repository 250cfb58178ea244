//! Component wiring and the HTTP server.

use std::sync::Arc;

use axum::{Json, Router, routing::get};
use ring::rand::{SecureRandom, SystemRandom};
use tracing::{info, warn};

use herald_cache::{BrandingCache, Cipher, CredentialCache, HttpIdentityClient};
use herald_core::HeraldConfig;
use herald_core::error::HeraldError;
use herald_channel::{
    ChannelSender, EmailSender, InAppPublisher, InAppSender, PushSender, SmsSender,
};
use herald_event::{EventConsumer, EventDispatcher, HandlerRegistry, create_source};
use herald_hub::{ChatService, ConnectionRegistry, HubAuth, HubBroadcaster, HubState, hub_router,
    spawn_idle_sweeper};
use herald_queue::{BackoffPolicy, DeliveryQueue, SenderRegistry};
use herald_store::{
    AuditStore, ChatStore, CredentialStore, DeliveryStore, DeviceTokenStore, InMemoryAuditStore,
    InMemoryChatStore, InMemoryCredentialStore, InMemoryDeliveryStore, InMemoryDeviceTokenStore,
};
use herald_template::{InMemoryTemplateStore, TemplateStore};

use crate::shutdown::{ShutdownController, setup_signal_handlers};

/// The assembled Herald service.
pub struct HeraldServer {
    config: HeraldConfig,
    queue: Arc<DeliveryQueue>,
    consumer: Arc<EventConsumer>,
    hub_state: Arc<HubState>,
    hub_registry: Arc<ConnectionRegistry>,
    shutdown: ShutdownController,
}

impl HeraldServer {
    /// Builds every subsystem from configuration.
    ///
    /// The storage traits are backed by the in-memory implementations; the
    /// database seam is `herald-store`'s traits and swapping the backend is
    /// a wiring change here.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid configuration or an unsupported event
    /// source kind.
    pub fn new(config: HeraldConfig) -> Result<Self, HeraldError> {
        config.validate()?;

        let cipher = Arc::new(Cipher::new(Self::encryption_key(&config)?));

        let delivery_store: Arc<dyn DeliveryStore> = Arc::new(InMemoryDeliveryStore::new());
        let credential_store: Arc<dyn CredentialStore> = Arc::new(InMemoryCredentialStore::new());
        let template_store: Arc<dyn TemplateStore> = Arc::new(InMemoryTemplateStore::new());
        let device_store: Arc<dyn DeviceTokenStore> = Arc::new(InMemoryDeviceTokenStore::new());
        let chat_store: Arc<dyn ChatStore> = Arc::new(InMemoryChatStore::new());
        let audit_store: Arc<dyn AuditStore> = Arc::new(InMemoryAuditStore::new());

        let credentials = Arc::new(CredentialCache::new(
            &config.cache,
            Arc::clone(&credential_store),
            cipher,
            config.defaults.clone(),
        ));
        let branding = Arc::new(BrandingCache::new(
            &config.cache,
            Arc::new(HttpIdentityClient::new(&config.identity)),
        ));

        let hub_registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(HubBroadcaster::new(Arc::clone(&hub_registry)));

        let senders = Arc::new(
            SenderRegistry::new()
                .with_sender(Arc::new(EmailSender::new()) as Arc<dyn ChannelSender>)
                .with_sender(Arc::new(SmsSender::new()) as Arc<dyn ChannelSender>)
                .with_sender(
                    Arc::new(PushSender::new(Arc::clone(&device_store))) as Arc<dyn ChannelSender>
                )
                .with_sender(Arc::new(InAppSender::new(
                    Arc::clone(&broadcaster) as Arc<dyn InAppPublisher>
                )) as Arc<dyn ChannelSender>),
        );

        let queue = Arc::new(DeliveryQueue::new(
            Arc::clone(&delivery_store),
            audit_store,
            credentials,
            senders,
            config.queue.clone(),
            BackoffPolicy::new(config.retry.clone()),
        ));

        let dispatcher = Arc::new(EventDispatcher::new(
            branding,
            template_store,
            device_store,
            Arc::clone(&queue),
        ));
        let registry = Arc::new(HandlerRegistry::standard());
        let source = create_source(&config.event_source)?;
        let consumer = Arc::new(EventConsumer::new(
            source,
            registry,
            dispatcher,
            config.event_source.handler_deadline,
        ));

        let chat = Arc::new(ChatService::new(chat_store, Arc::clone(&hub_registry)));
        let hub_state = Arc::new(HubState {
            auth: HubAuth::new(&config.hub.jwt_secret),
            registry: Arc::clone(&hub_registry),
            chat,
            deliveries: delivery_store,
            buffer_size: config.hub.buffer_size,
        });

        Ok(Self {
            config,
            queue,
            consumer,
            hub_state,
            hub_registry,
            shutdown: ShutdownController::new(),
        })
    }

    fn encryption_key(config: &HeraldConfig) -> Result<[u8; 32], HeraldError> {
        if config.encryption_key.is_empty() {
            warn!("encryption_key not configured, generating an ephemeral key");
            let rng = SystemRandom::new();
            let mut key = [0u8; 32];
            rng.fill(&mut key).map_err(|_| {
                HeraldError::Config(herald_core::error::ConfigError::InvalidValue {
                    key: "encryption_key".to_string(),
                    reason: "failed to generate ephemeral key".to_string(),
                })
            })?;
            return Ok(key);
        }
        Ok(config.encryption_key_bytes()?)
    }

    /// The shutdown controller, for embedding and tests.
    #[must_use]
    pub fn shutdown_controller(&self) -> ShutdownController {
        self.shutdown.clone()
    }

    /// Builds the HTTP router: WebSocket paths plus `/health`.
    #[must_use]
    pub fn router(&self) -> Router {
        hub_router(Arc::clone(&self.hub_state)).route("/health", get(health))
    }

    /// Runs the service until a shutdown signal arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind.
    pub async fn run(self) -> Result<(), std::io::Error> {
        let mut tasks = self.queue.start(self.shutdown.subscribe());

        let consumer = Arc::clone(&self.consumer);
        let consumer_shutdown = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            consumer.run(consumer_shutdown).await;
        }));

        tasks.push(spawn_idle_sweeper(
            Arc::clone(&self.hub_registry),
            self.config.hub.idle_timeout(),
            self.shutdown.subscribe(),
        ));

        tokio::spawn(setup_signal_handlers(self.shutdown.clone()));

        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(%addr, workers = self.config.queue.workers, "Herald server listening");

        let shutdown = self.shutdown.clone();
        let server = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.wait().await });
        let result = server.await;

        // Drain: close every live WebSocket, stop the queue, join tasks.
        self.queue.close();
        let closed = self.hub_registry.close_all(1001);
        if closed > 0 {
            info!(closed, "Closed WebSocket connections on shutdown");
        }
        for task in tasks {
            let _ = task.await;
        }
        info!("Herald server stopped");
        result
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_builds_from_default_config() {
        let server = HeraldServer::new(HeraldConfig::default()).unwrap();
        assert!(!server.shutdown_controller().is_initiated());
    }

    #[test]
    fn test_server_rejects_unsupported_source() {
        let config = HeraldConfig {
            event_source: herald_core::config::EventSourceSettings {
                kind: "kafka".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(HeraldServer::new(config).is_err());
    }

    #[test]
    fn test_router_has_health_route() {
        let server = HeraldServer::new(HeraldConfig::default()).unwrap();
        let _router = server.router();
    }
}
