//! In-app sender.
//!
//! The delivery record is already persisted by the queue; this sender asks
//! the WebSocket hub to broadcast a notification frame to the recipient's
//! live connections. A recipient with no open connection is still a
//! successful delivery, the record stays retrievable through the REST
//! surface.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use herald_core::error::ChannelError;
use herald_core::types::{ChannelType, DeliveryRecord, FailureReason, TenantId};
use herald_store::Credential;

use crate::{ChannelSender, SendOutcome};

/// Bridge into the WebSocket hub's broadcast operation.
///
/// Implemented by the hub; the indirection keeps the delivery pipeline
/// free of a dependency on the hub crate.
#[async_trait]
pub trait InAppPublisher: Send + Sync {
    /// Forwards a notification frame to the recipient's connections in the
    /// tenant group. Returns how many connections received it.
    ///
    /// # Errors
    ///
    /// Returns an error only on hub-internal failure, not for an offline
    /// recipient.
    async fn publish(
        &self,
        tenant_id: &TenantId,
        recipient: &str,
        frame: serde_json::Value,
    ) -> Result<usize, ChannelError>;
}

/// Sender for the in-app channel.
pub struct InAppSender {
    publisher: Arc<dyn InAppPublisher>,
}

impl InAppSender {
    /// Creates an in-app sender over a hub publisher.
    #[must_use]
    pub fn new(publisher: Arc<dyn InAppPublisher>) -> Self {
        Self { publisher }
    }

    fn notification_frame(record: &DeliveryRecord) -> serde_json::Value {
        serde_json::json!({
            "type": "notification",
            "id": record.id,
            "title": record.content.subject,
            "body": record.content.body,
            "data": record.content.data.clone().unwrap_or_else(|| serde_json::json!({})),
            "timestamp": Utc::now().to_rfc3339(),
        })
    }
}

#[async_trait]
impl ChannelSender for InAppSender {
    fn channel(&self) -> ChannelType {
        ChannelType::InApp
    }

    async fn send(&self, _credentials: &Credential, record: &DeliveryRecord) -> SendOutcome {
        let frame = Self::notification_frame(record);
        match self
            .publisher
            .publish(&record.tenant_id, &record.recipient, frame)
            .await
        {
            Ok(connections) => {
                debug!(
                    record_id = %record.id,
                    connections,
                    "In-app notification broadcast"
                );
                SendOutcome::success(format!("delivered to {connections} connections"))
            }
            Err(e) => SendOutcome::failure_default(FailureReason::InternalError, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::types::{PayloadMap, RenderedContent};
    use parking_lot::Mutex;

    struct RecordingPublisher {
        frames: Mutex<Vec<(String, serde_json::Value)>>,
        connections: usize,
    }

    #[async_trait]
    impl InAppPublisher for RecordingPublisher {
        async fn publish(
            &self,
            _tenant_id: &TenantId,
            recipient: &str,
            frame: serde_json::Value,
        ) -> Result<usize, ChannelError> {
            self.frames.lock().push((recipient.to_string(), frame));
            Ok(self.connections)
        }
    }

    fn inapp_record() -> DeliveryRecord {
        let content = RenderedContent {
            subject: Some("Welcome!".to_string()),
            body: "Your account has been created.".to_string(),
            html_body: None,
            data: Some(serde_json::json!({"action": "redirect", "url": "/dashboard"})),
        };
        DeliveryRecord::new(
            TenantId::generate(),
            ChannelType::InApp,
            "user-1",
            content,
            PayloadMap::new(),
        )
    }

    #[tokio::test]
    async fn test_broadcast_success() {
        let publisher = Arc::new(RecordingPublisher {
            frames: Mutex::new(Vec::new()),
            connections: 2,
        });
        let sender = InAppSender::new(Arc::clone(&publisher) as Arc<dyn InAppPublisher>);
        let record = inapp_record();
        let credential = Credential::new(
            record.tenant_id.clone(),
            ChannelType::InApp,
            serde_json::Map::new(),
            false,
        );

        let outcome = sender.send(&credential, &record).await;
        assert!(outcome.is_success());

        let frames = publisher.frames.lock();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0, "user-1");
        assert_eq!(frames[0].1["type"], "notification");
        assert_eq!(frames[0].1["title"], "Welcome!");
        assert_eq!(frames[0].1["data"]["url"], "/dashboard");
    }

    #[tokio::test]
    async fn test_offline_recipient_still_success() {
        let publisher = Arc::new(RecordingPublisher {
            frames: Mutex::new(Vec::new()),
            connections: 0,
        });
        let sender = InAppSender::new(publisher as Arc<dyn InAppPublisher>);
        let record = inapp_record();
        let credential = Credential::new(
            record.tenant_id.clone(),
            ChannelType::InApp,
            serde_json::Map::new(),
            false,
        );

        let outcome = sender.send(&credential, &record).await;
        assert!(outcome.is_success());
    }
}
