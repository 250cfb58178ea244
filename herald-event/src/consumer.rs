//! Event log consumer.
//!
//! Pulls messages from the configured source, validates the envelope,
//! dispatches to the handler registry under a deadline, and commits the
//! offset per the at-least-once contract: committed on success, on unknown
//! event types and on non-retriable failures (which are dead-lettered);
//! left uncommitted on retriable failures so the log redelivers.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, watch};
use tracing::{debug, error, info, warn};

use herald_core::config::EventSourceSettings;
use herald_core::error::EventError;

use crate::dispatch::EventDispatcher;
use crate::envelope::validate_envelope;
use crate::handler::HandlerRegistry;

/// One message pulled from the event log.
#[derive(Debug, Clone)]
pub struct SourcedMessage {
    /// Topic the message arrived on.
    pub topic: String,
    /// Offset used for commit.
    pub offset: u64,
    /// Raw message body.
    pub payload: serde_json::Value,
}

/// Seam to the ordered event log.
///
/// `poll` returns the next uncommitted message; until `commit` is called
/// for its offset, subsequent polls redeliver it.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Returns the next uncommitted message, or `None` after the timeout.
    ///
    /// # Errors
    ///
    /// Returns an error on broker failure.
    async fn poll(&self, timeout: Duration) -> Result<Option<SourcedMessage>, EventError>;

    /// Commits an offset, acknowledging the message.
    ///
    /// # Errors
    ///
    /// Returns an error on broker failure.
    async fn commit(&self, message: &SourcedMessage) -> Result<(), EventError>;
}

/// Creates an event source from configuration.
///
/// # Errors
///
/// Returns `UnsupportedSource` for source kinds without an implementation
/// (the broker-backed source is deployed as a sidecar binary and not part
/// of this crate).
pub fn create_source(settings: &EventSourceSettings) -> Result<Arc<dyn EventSource>, EventError> {
    match settings.kind.as_str() {
        "in_memory" => Ok(Arc::new(InMemoryEventSource::new(settings.topics()))),
        other => Err(EventError::UnsupportedSource {
            kind: other.to_string(),
        }),
    }
}

struct InMemoryInner {
    queue: VecDeque<SourcedMessage>,
    next_offset: u64,
}

/// In-memory event source for tests and local runs.
///
/// Messages stay at the head of the queue until committed, giving the same
/// redelivery behaviour as an uncommitted log offset.
pub struct InMemoryEventSource {
    topics: Vec<String>,
    inner: Mutex<InMemoryInner>,
    arrival: Notify,
}

impl InMemoryEventSource {
    /// Creates a source over the given topics.
    #[must_use]
    pub fn new(topics: Vec<String>) -> Self {
        Self {
            topics,
            inner: Mutex::new(InMemoryInner {
                queue: VecDeque::new(),
                next_offset: 0,
            }),
            arrival: Notify::new(),
        }
    }

    /// Topics this source serves.
    #[must_use]
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Publishes a message onto a topic.
    pub fn publish(&self, topic: impl Into<String>, payload: serde_json::Value) {
        let mut inner = self.inner.lock();
        let offset = inner.next_offset;
        inner.next_offset += 1;
        inner.queue.push_back(SourcedMessage {
            topic: topic.into(),
            offset,
            payload,
        });
        drop(inner);
        self.arrival.notify_waiters();
    }

    /// Number of uncommitted messages.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.lock().queue.len()
    }
}

#[async_trait]
impl EventSource for InMemoryEventSource {
    async fn poll(&self, timeout: Duration) -> Result<Option<SourcedMessage>, EventError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(message) = self.inner.lock().queue.front().cloned() {
                return Ok(Some(message));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let _ = tokio::time::timeout(remaining, self.arrival.notified()).await;
        }
    }

    async fn commit(&self, message: &SourcedMessage) -> Result<(), EventError> {
        let mut inner = self.inner.lock();
        if inner
            .queue
            .front()
            .is_some_and(|head| head.offset == message.offset)
        {
            inner.queue.pop_front();
        }
        Ok(())
    }
}

/// A rejected event retained for inspection.
#[derive(Debug, Clone)]
pub struct DeadLetterEntry {
    /// Topic the message arrived on.
    pub topic: String,
    /// Raw message body.
    pub payload: serde_json::Value,
    /// Why the event was rejected.
    pub reason: String,
    /// When it was dead-lettered.
    pub dead_lettered_at: Instant,
}

/// Bounded dead-letter log for events rejected non-retriably.
pub struct DeadLetterLog {
    entries: Mutex<VecDeque<DeadLetterEntry>>,
    max_size: usize,
    total: AtomicU64,
}

impl DeadLetterLog {
    /// Creates a log with the given capacity.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(max_size)),
            max_size,
            total: AtomicU64::new(0),
        }
    }

    /// Records a rejected event, evicting the oldest entry when full.
    pub fn add(&self, topic: impl Into<String>, payload: serde_json::Value, reason: impl Into<String>) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.max_size {
            entries.pop_front();
        }
        entries.push_back(DeadLetterEntry {
            topic: topic.into(),
            payload,
            reason: reason.into(),
            dead_lettered_at: Instant::now(),
        });
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Current number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if no entries are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Total events ever dead-lettered.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Snapshot of retained entries.
    #[must_use]
    pub fn entries(&self) -> Vec<DeadLetterEntry> {
        self.entries.lock().iter().cloned().collect()
    }
}

impl Default for DeadLetterLog {
    fn default() -> Self {
        Self::new(10_000)
    }
}

/// The event consumer loop.
pub struct EventConsumer {
    source: Arc<dyn EventSource>,
    registry: Arc<HandlerRegistry>,
    dispatcher: Arc<EventDispatcher>,
    handler_deadline: Duration,
    dead_letters: Arc<DeadLetterLog>,
}

impl EventConsumer {
    /// Creates a consumer over its collaborators.
    #[must_use]
    pub fn new(
        source: Arc<dyn EventSource>,
        registry: Arc<HandlerRegistry>,
        dispatcher: Arc<EventDispatcher>,
        handler_deadline: Duration,
    ) -> Self {
        Self {
            source,
            registry,
            dispatcher,
            handler_deadline,
            dead_letters: Arc::new(DeadLetterLog::default()),
        }
    }

    /// The dead-letter log for inspection.
    #[must_use]
    pub fn dead_letters(&self) -> Arc<DeadLetterLog> {
        Arc::clone(&self.dead_letters)
    }

    /// Runs until the shutdown signal fires.
    ///
    /// The reader never blocks on channel I/O: each event is handed to the
    /// delivery queue by the dispatcher and the loop returns to polling.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Event consumer started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let polled = tokio::select! {
                polled = self.source.poll(Duration::from_millis(250)) => polled,
                _ = shutdown.changed() => continue,
            };

            let message = match polled {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(e) => {
                    error!(error = %e, "Event source poll failed");
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    continue;
                }
            };

            if !self.process(&message).await {
                // Retriable failure: leave uncommitted and back off briefly
                // before the log redelivers.
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        }
        info!("Event consumer stopped");
    }

    /// Processes one message. Returns false when the message was left
    /// uncommitted for redelivery.
    pub async fn process(&self, message: &SourcedMessage) -> bool {
        let event = match validate_envelope(&message.payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "Rejecting malformed event");
                self.dead_letters
                    .add(&message.topic, message.payload.clone(), e.to_string());
                self.commit(message).await;
                return true;
            }
        };

        let Some(handler) = self.registry.get(&event.event_type) else {
            info!(event_type = %event.event_type, "No handler registered, skipping event");
            self.commit(message).await;
            return true;
        };

        debug!(
            event_type = %event.event_type,
            tenant_id = %event.tenant_id,
            handler = handler.name(),
            "Processing event"
        );

        let outcome =
            tokio::time::timeout(self.handler_deadline, self.dispatcher.dispatch(handler, &event))
                .await;

        match outcome {
            Ok(Ok(created)) => {
                debug!(event_type = %event.event_type, created, "Event handled");
                self.commit(message).await;
                true
            }
            Ok(Err(e)) if e.is_retriable() => {
                warn!(event_type = %event.event_type, error = %e, "Retriable handler failure, leaving uncommitted");
                false
            }
            Ok(Err(e)) => {
                warn!(event_type = %event.event_type, error = %e, "Non-retriable handler failure, dead-lettering");
                self.dead_letters
                    .add(&message.topic, message.payload.clone(), e.to_string());
                self.commit(message).await;
                true
            }
            Err(_) => {
                warn!(
                    event_type = %event.event_type,
                    deadline_secs = self.handler_deadline.as_secs(),
                    "Handler deadline exceeded, leaving uncommitted"
                );
                false
            }
        }
    }

    async fn commit(&self, message: &SourcedMessage) {
        if let Err(e) = self.source.commit(message).await {
            error!(topic = %message.topic, offset = message.offset, error = %e, "Offset commit failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use herald_cache::{BrandingCache, Cipher, CredentialCache, StaticBrandingProvider};
    use herald_core::config::{
        DefaultCredentialSettings, EmailDefaults, QueueSettings, RetrySettings,
    };
    use herald_core::types::{DeliveryState, TenantId};
    use herald_queue::{BackoffPolicy, DeliveryQueue, SenderRegistry};
    use herald_store::{
        DeliveryStore, InMemoryAuditStore, InMemoryCredentialStore, InMemoryDeliveryStore,
        InMemoryDeviceTokenStore,
    };
    use herald_template::InMemoryTemplateStore;

    fn consumer_fixture() -> (EventConsumer, Arc<InMemoryEventSource>, Arc<InMemoryDeliveryStore>)
    {
        let source = Arc::new(InMemoryEventSource::new(vec!["auth-events".to_string()]));
        let store = Arc::new(InMemoryDeliveryStore::new());

        let credentials = Arc::new(CredentialCache::with_ttls(
            Duration::from_secs(300),
            Duration::from_secs(30),
            Arc::new(InMemoryCredentialStore::new()),
            Arc::new(Cipher::new([1u8; 32])),
            DefaultCredentialSettings {
                email: Some(EmailDefaults {
                    smtp_host: "mail.test".to_string(),
                    smtp_port: 587,
                    username: "u".to_string(),
                    password: "p".to_string(),
                    from_email: "noreply@test".to_string(),
                    use_ssl: false,
                }),
                sms: None,
                push: None,
            },
        ));
        let queue = Arc::new(DeliveryQueue::new(
            Arc::clone(&store) as Arc<dyn DeliveryStore>,
            Arc::new(InMemoryAuditStore::new()),
            credentials,
            Arc::new(SenderRegistry::new()),
            QueueSettings::default(),
            BackoffPolicy::new(RetrySettings::default()),
        ));
        let dispatcher = Arc::new(EventDispatcher::new(
            Arc::new(BrandingCache::with_ttls(
                Duration::from_secs(300),
                Duration::from_secs(30),
                Arc::new(StaticBrandingProvider::new()),
            )),
            Arc::new(InMemoryTemplateStore::new()),
            Arc::new(InMemoryDeviceTokenStore::new()),
            queue,
        ));

        let consumer = EventConsumer::new(
            Arc::clone(&source) as Arc<dyn EventSource>,
            Arc::new(HandlerRegistry::standard()),
            dispatcher,
            Duration::from_secs(15),
        );
        (consumer, source, store)
    }

    fn welcome_message(tenant: &TenantId) -> serde_json::Value {
        serde_json::json!({
            "event_type": "user.registration.completed",
            "tenant_id": tenant.to_string(),
            "timestamp": "2024-03-01T10:00:00Z",
            "payload": {"user_id": "U", "email": "a@b.test", "first_name": "John"},
        })
    }

    #[tokio::test]
    async fn test_valid_event_committed_and_dispatched() {
        let (consumer, source, store) = consumer_fixture();
        let tenant = TenantId::generate();
        source.publish("auth-events", welcome_message(&tenant));

        let message = source.poll(Duration::from_millis(10)).await.unwrap().unwrap();
        assert!(consumer.process(&message).await);

        assert_eq!(source.pending(), 0);
        let pending = store
            .list_by_state(&tenant, DeliveryState::Pending)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].channel, herald_core::types::ChannelType::Email);
    }

    #[tokio::test]
    async fn test_unknown_event_type_committed_no_records() {
        let (consumer, source, store) = consumer_fixture();
        let tenant = TenantId::generate();
        source.publish(
            "app-events",
            serde_json::json!({
                "event_type": "totally.unknown.event",
                "tenant_id": tenant.to_string(),
                "timestamp": "2024-03-01T10:00:00Z",
                "payload": {},
            }),
        );

        let message = source.poll(Duration::from_millis(10)).await.unwrap().unwrap();
        assert!(consumer.process(&message).await);

        assert_eq!(source.pending(), 0);
        assert!(store.is_empty());
        // Unknown types are skipped, not dead-lettered.
        assert_eq!(consumer.dead_letters().total(), 0);
    }

    #[tokio::test]
    async fn test_missing_tenant_dead_lettered() {
        let (consumer, source, store) = consumer_fixture();
        source.publish(
            "auth-events",
            serde_json::json!({
                "event_type": "user.registration.completed",
                "timestamp": "2024-03-01T10:00:00Z",
                "payload": {},
            }),
        );

        let message = source.poll(Duration::from_millis(10)).await.unwrap().unwrap();
        assert!(consumer.process(&message).await);

        assert_eq!(source.pending(), 0);
        assert!(store.is_empty());
        let dead_letters = consumer.dead_letters();
        assert_eq!(dead_letters.total(), 1);
        assert!(dead_letters.entries()[0].reason.contains("tenant_id"));
    }

    #[tokio::test]
    async fn test_uncommitted_message_redelivered() {
        let source = InMemoryEventSource::new(vec!["auth-events".to_string()]);
        source.publish("auth-events", serde_json::json!({"n": 1}));

        let first = source.poll(Duration::from_millis(10)).await.unwrap().unwrap();
        // No commit: the next poll returns the same offset.
        let second = source.poll(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(first.offset, second.offset);

        source.commit(&first).await.unwrap();
        assert!(source.poll(Duration::from_millis(10)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_drains_and_stops() {
        let (consumer, source, store) = consumer_fixture();
        let tenant = TenantId::generate();
        source.publish("auth-events", welcome_message(&tenant));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = {
            let consumer = Arc::new(consumer);
            let consumer_clone = Arc::clone(&consumer);
            tokio::spawn(async move { consumer_clone.run(shutdown_rx).await })
        };

        for _ in 0..100 {
            if source.pending() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(source.pending(), 0);
        assert_eq!(store.len(), 1);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_create_source_kinds() {
        let settings = EventSourceSettings::default();
        assert!(create_source(&settings).is_ok());

        let kafka = EventSourceSettings {
            kind: "kafka".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            create_source(&kafka),
            Err(EventError::UnsupportedSource { .. })
        ));
    }

    #[test]
    fn test_dead_letter_log_bounded() {
        let log = DeadLetterLog::new(2);
        for i in 0..5 {
            log.add("t", serde_json::json!({"i": i}), "reason");
        }
        assert_eq!(log.len(), 2);
        assert_eq!(log.total(), 5);
    }
}
