//! # Herald Channel
//!
//! Channel sender implementations for the Herald delivery pipeline.
//!
//! Senders never propagate provider failures as errors across the
//! component boundary: every send resolves to a [`SendOutcome`] carrying a
//! failure classification and retriability flag that the worker pool feeds
//! into the delivery state machine.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod email;
pub mod inapp;
pub mod mock;
pub mod push;
pub mod sms;

use async_trait::async_trait;

use herald_core::types::{ChannelType, DeliveryRecord, FailureReason};
use herald_store::Credential;

pub use email::EmailSender;
pub use inapp::{InAppPublisher, InAppSender};
pub use mock::MockSender;
pub use push::PushSender;
pub use sms::SmsSender;

/// Maximum provider response length persisted on a record.
pub const PROVIDER_RESPONSE_LIMIT: usize = 1024;

/// Structured outcome of a channel send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The provider accepted the message.
    Success {
        /// Raw provider response, truncated for storage.
        provider_response: Option<String>,
    },
    /// The provider (or transport) rejected the message.
    Failure {
        /// Failure classification.
        reason: FailureReason,
        /// Whether the worker may retry.
        retriable: bool,
        /// Raw provider response, truncated for storage.
        provider_response: Option<String>,
    },
}

impl SendOutcome {
    /// Builds a success outcome, truncating the provider response.
    #[must_use]
    pub fn success(provider_response: impl Into<String>) -> Self {
        Self::Success {
            provider_response: Some(truncate(provider_response.into())),
        }
    }

    /// Builds a failure outcome, truncating the provider response.
    #[must_use]
    pub fn failure(
        reason: FailureReason,
        retriable: bool,
        provider_response: impl Into<String>,
    ) -> Self {
        Self::Failure {
            reason,
            retriable,
            provider_response: Some(truncate(provider_response.into())),
        }
    }

    /// Builds a failure outcome with the reason's default retriability.
    #[must_use]
    pub fn failure_default(reason: FailureReason, provider_response: impl Into<String>) -> Self {
        Self::failure(reason, reason.retriable_by_default(), provider_response)
    }

    /// Returns true for a success outcome.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

fn truncate(mut response: String) -> String {
    if response.len() > PROVIDER_RESPONSE_LIMIT {
        let mut end = PROVIDER_RESPONSE_LIMIT;
        while !response.is_char_boundary(end) {
            end -= 1;
        }
        response.truncate(end);
    }
    response
}

/// A per-channel message sender.
///
/// `send` receives the decrypted credential snapshot and the delivery
/// record whose content snapshot and recipient it transmits.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// The channel this sender serves.
    fn channel(&self) -> ChannelType;

    /// Transmits one record. Never returns an error; failures are
    /// classified into the outcome.
    async fn send(&self, credentials: &Credential, record: &DeliveryRecord) -> SendOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_truncates_provider_response() {
        let long = "x".repeat(PROVIDER_RESPONSE_LIMIT * 2);
        let SendOutcome::Success { provider_response } = SendOutcome::success(long) else {
            panic!("expected success");
        };
        assert_eq!(provider_response.unwrap().len(), PROVIDER_RESPONSE_LIMIT);
    }

    #[test]
    fn test_failure_default_uses_taxonomy() {
        let outcome = SendOutcome::failure_default(FailureReason::AuthError, "535");
        assert!(matches!(
            outcome,
            SendOutcome::Failure {
                retriable: false,
                ..
            }
        ));

        let outcome = SendOutcome::failure_default(FailureReason::NetworkError, "timeout");
        assert!(matches!(outcome, SendOutcome::Failure { retriable: true, .. }));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let multibyte = "é".repeat(PROVIDER_RESPONSE_LIMIT);
        let truncated = truncate(multibyte);
        assert!(truncated.len() <= PROVIDER_RESPONSE_LIMIT);
        assert!(!truncated.is_empty());
    }
}
