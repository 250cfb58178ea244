//! Delivery record: the durable row tracking one attempt-chain.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::channel::ChannelType;
use super::event::PayloadMap;
use super::tenant::TenantId;

/// Unique identifier for a delivery record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Creates a record id from an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a new unique record id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivery state machine states.
///
/// `Pending` and `Retrying` are in-flight; `Success` and `Failed` are
/// terminal and immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    /// Waiting for the first attempt.
    Pending,
    /// A previous attempt failed retriably; waiting for the next attempt.
    Retrying,
    /// Delivered.
    Success,
    /// Exhausted retries or failed non-retriably.
    Failed,
}

impl DeliveryState {
    /// Returns true for terminal states.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Returns true for states eligible for claiming by a worker.
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        matches!(self, Self::Pending | Self::Retrying)
    }

    /// Returns the state as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Retrying => "retrying",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Failure classification reported by channel senders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Credentials rejected by a provider.
    AuthError,
    /// Malformed recipient, oversized payload or invalid template output.
    ContentError,
    /// Connect/DNS/TLS failure or socket timeout.
    NetworkError,
    /// Provider-specific error.
    ProviderError,
    /// Unclassified error inside the worker.
    InternalError,
}

impl FailureReason {
    /// Default retriability per the failure taxonomy.
    ///
    /// Provider errors are retriable by default; each sender downgrades the
    /// explicit non-retriable codes (FCM `UNREGISTERED`, SMTP permanent 5xx,
    /// SMS invalid-number) when it classifies the outcome.
    #[must_use]
    pub const fn retriable_by_default(&self) -> bool {
        match self {
            Self::AuthError | Self::ContentError => false,
            Self::NetworkError | Self::ProviderError | Self::InternalError => true,
        }
    }

    /// Returns the reason as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AuthError => "auth_error",
            Self::ContentError => "content_error",
            Self::NetworkError => "network_error",
            Self::ProviderError => "provider_error",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rendered content snapshot persisted on a delivery record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderedContent {
    /// Rendered subject, where the channel has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Rendered plaintext body.
    pub body: String,
    /// Branded HTML body, produced for the email channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_body: Option<String>,
    /// Channel-specific structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RenderedContent {
    /// Creates a body-only content snapshot.
    #[must_use]
    pub fn body(body: impl Into<String>) -> Self {
        Self {
            subject: None,
            body: body.into(),
            html_body: None,
            data: None,
        }
    }
}

/// Durable row tracking a single attempt-chain for one
/// (channel, recipient, event) decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    /// Unique record id.
    pub id: RecordId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Target channel.
    pub channel: ChannelType,
    /// Recipient address: email, E.164 phone, device token or user id.
    pub recipient: String,
    /// Rendered content snapshot.
    pub content: RenderedContent,
    /// Original template context, kept for audit.
    #[serde(default)]
    pub context: PayloadMap,
    /// Current state.
    pub state: DeliveryState,
    /// Failure classification for the last failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    /// Truncated provider response for observability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_response: Option<String>,
    /// Attempts performed so far.
    pub retry_count: u32,
    /// Retry budget.
    pub max_retries: u32,
    /// Idempotency key `(tenant, event_id, channel, recipient)`, when the
    /// source event carried an `event_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedup_key: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Successful delivery time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    /// Earliest time the next attempt may run.
    pub next_attempt_at: DateTime<Utc>,
    /// When the recipient read an in-app record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
    /// Claim lease; a worker crash leaves this to be reclaimed on expiry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_expires_at: Option<DateTime<Utc>>,
    /// Soft-delete marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Default retry budget for a delivery record.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

impl DeliveryRecord {
    /// Creates a new pending delivery record due immediately.
    #[must_use]
    pub fn new(
        tenant_id: TenantId,
        channel: ChannelType,
        recipient: impl Into<String>,
        content: RenderedContent,
        context: PayloadMap,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: RecordId::generate(),
            tenant_id,
            channel,
            recipient: recipient.into(),
            content,
            context,
            state: DeliveryState::Pending,
            failure_reason: None,
            provider_response: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            dedup_key: None,
            created_at: now,
            sent_at: None,
            next_attempt_at: now,
            read_at: None,
            lease_expires_at: None,
            deleted_at: None,
        }
    }

    /// Overrides the retry budget.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the idempotency key.
    #[must_use]
    pub fn with_dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }

    /// Returns true if the record is in a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Returns true if the record may be claimed at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state.is_in_flight() && self.deleted_at.is_none() && self.next_attempt_at <= now
    }
}
