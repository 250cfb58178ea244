//! Scripted sender for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

use herald_core::types::{ChannelType, DeliveryRecord};
use herald_store::Credential;

use crate::{ChannelSender, SendOutcome};

/// A sender that replays scripted outcomes and records every send.
pub struct MockSender {
    channel: ChannelType,
    outcomes: Mutex<VecDeque<SendOutcome>>,
    sent: Mutex<Vec<DeliveryRecord>>,
}

impl MockSender {
    /// Creates a mock that always succeeds.
    #[must_use]
    pub fn accepting(channel: ChannelType) -> Self {
        Self {
            channel,
            outcomes: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Creates a mock that replays the given outcomes in order, then
    /// succeeds.
    #[must_use]
    pub fn scripted(channel: ChannelType, outcomes: impl IntoIterator<Item = SendOutcome>) -> Self {
        Self {
            channel,
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Records passed to `send`, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<DeliveryRecord> {
        self.sent.lock().clone()
    }

    /// Number of send attempts observed.
    #[must_use]
    pub fn send_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl ChannelSender for MockSender {
    fn channel(&self) -> ChannelType {
        self.channel
    }

    async fn send(&self, _credentials: &Credential, record: &DeliveryRecord) -> SendOutcome {
        self.sent.lock().push(record.clone());
        self.outcomes
            .lock()
            .pop_front()
            .unwrap_or_else(|| SendOutcome::success("mock accepted"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::types::{FailureReason, PayloadMap, RenderedContent, TenantId};

    fn record() -> DeliveryRecord {
        DeliveryRecord::new(
            TenantId::generate(),
            ChannelType::Email,
            "a@b.test",
            RenderedContent::body("x"),
            PayloadMap::new(),
        )
    }

    fn credential() -> Credential {
        Credential::new(
            TenantId::generate(),
            ChannelType::Email,
            serde_json::Map::new(),
            false,
        )
    }

    #[tokio::test]
    async fn test_scripted_outcomes_then_success() {
        let mock = MockSender::scripted(
            ChannelType::Email,
            [SendOutcome::failure(
                FailureReason::ProviderError,
                true,
                "transient",
            )],
        );

        let first = mock.send(&credential(), &record()).await;
        assert!(!first.is_success());
        let second = mock.send(&credential(), &record()).await;
        assert!(second.is_success());
        assert_eq!(mock.send_count(), 2);
    }
}
