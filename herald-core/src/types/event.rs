//! Event envelope consumed from the distributed event log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tenant::TenantId;

/// Nested key/value payload carried by an event.
pub type PayloadMap = serde_json::Map<String, serde_json::Value>;

/// Immutable domain event envelope.
///
/// `event_type` is a dotted-path string such as `user.login.failed`.
/// The payload is preserved as the producer sent it; handlers validate the
/// fields they need and the original map is snapshotted onto every delivery
/// record created from the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Dotted-path event classification.
    pub event_type: String,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Producer-side timestamp.
    pub timestamp: DateTime<Utc>,
    /// Event payload.
    #[serde(default)]
    pub payload: PayloadMap,
    /// Producer metadata, e.g. an `event_id` used for idempotent handling.
    #[serde(default)]
    pub metadata: PayloadMap,
}

impl Event {
    /// Creates a new event with the current timestamp.
    #[must_use]
    pub fn new(event_type: impl Into<String>, tenant_id: TenantId, payload: PayloadMap) -> Self {
        Self {
            event_type: event_type.into(),
            tenant_id,
            timestamp: Utc::now(),
            payload,
            metadata: PayloadMap::new(),
        }
    }

    /// Attaches a producer event id for idempotent delivery-record creation.
    #[must_use]
    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.metadata
            .insert("event_id".to_string(), event_id.into().into());
        self
    }

    /// Returns the producer event id, if present in metadata.
    #[must_use]
    pub fn event_id(&self) -> Option<&str> {
        self.metadata.get("event_id").and_then(|v| v.as_str())
    }

    /// Returns a payload field as a string slice.
    #[must_use]
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }
}
