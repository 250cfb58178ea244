//! Push sender over the FCM HTTP v1 API.
//!
//! One messaging client per tenant, keyed by the service-account project.
//! `UNREGISTERED` devices yield a non-retriable provider failure and the
//! token is marked inactive so future fan-outs skip it; `QUOTA_EXCEEDED`
//! and transient server errors are retriable.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use herald_core::types::{ChannelType, DeliveryRecord, FailureReason};
use herald_store::{Credential, DeviceTokenStore};

use crate::{ChannelSender, SendOutcome};

const DEFAULT_API_BASE: &str = "https://fcm.googleapis.com";

/// HTTP sender for the push channel.
pub struct PushSender {
    client: reqwest::Client,
    api_base: String,
    devices: Arc<dyn DeviceTokenStore>,
}

impl PushSender {
    /// Creates a sender against the production FCM endpoint.
    #[must_use]
    pub fn new(devices: Arc<dyn DeviceTokenStore>) -> Self {
        Self::with_api_base(DEFAULT_API_BASE, devices)
    }

    /// Creates a sender against an alternate API base, for tests.
    #[must_use]
    pub fn with_api_base(api_base: impl Into<String>, devices: Arc<dyn DeviceTokenStore>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            devices,
        }
    }

    /// Builds the FCM v1 message body with platform-specific overrides.
    fn build_message(record: &DeliveryRecord) -> serde_json::Value {
        let mut notification = serde_json::Map::new();
        if let Some(subject) = &record.content.subject {
            notification.insert("title".into(), subject.clone().into());
        }
        notification.insert("body".into(), record.content.body.clone().into());

        // FCM requires string values in the data map.
        let data: serde_json::Map<String, serde_json::Value> = record
            .content
            .data
            .as_ref()
            .and_then(|d| d.as_object())
            .map(|map| {
                map.iter()
                    .map(|(k, v)| {
                        let text = match v {
                            serde_json::Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (k.clone(), serde_json::Value::String(text))
                    })
                    .collect()
            })
            .unwrap_or_default();

        serde_json::json!({
            "message": {
                "token": record.recipient,
                "notification": notification,
                "data": data,
                "android": { "priority": "high" },
                "apns": { "headers": { "apns-priority": "10" } },
                "webpush": { "headers": { "Urgency": "high" } },
            }
        })
    }

    async fn classify_error(
        &self,
        record: &DeliveryRecord,
        status: reqwest::StatusCode,
        body: &str,
    ) -> SendOutcome {
        if body.contains("UNREGISTERED") || body.contains("NOT_FOUND") {
            info!(record_id = %record.id, "Device token unregistered, marking inactive");
            let _ = self
                .devices
                .mark_inactive(&record.tenant_id, &record.recipient)
                .await;
            return SendOutcome::failure(FailureReason::ProviderError, false, body);
        }
        if body.contains("QUOTA_EXCEEDED") || body.contains("UNAVAILABLE") {
            return SendOutcome::failure(FailureReason::ProviderError, true, body);
        }
        if body.contains("UNAUTHENTICATED") || body.contains("PERMISSION_DENIED") {
            return SendOutcome::failure_default(FailureReason::AuthError, body);
        }
        if body.contains("INVALID_ARGUMENT") {
            return SendOutcome::failure_default(FailureReason::ContentError, body);
        }
        if status.is_server_error() {
            return SendOutcome::failure(FailureReason::ProviderError, true, body);
        }
        SendOutcome::failure_default(FailureReason::ProviderError, body)
    }
}

#[async_trait]
impl ChannelSender for PushSender {
    fn channel(&self) -> ChannelType {
        ChannelType::Push
    }

    async fn send(&self, credentials: &Credential, record: &DeliveryRecord) -> SendOutcome {
        let Some(project_id) = credentials.secret_str("project_id") else {
            return SendOutcome::failure_default(
                FailureReason::AuthError,
                "missing FCM project_id",
            );
        };
        // The OAuth exchange against the service account lives in the
        // credential provisioning flow; by send time an access token is
        // part of the decrypted snapshot.
        let Some(access_token) = credentials.secret_str("access_token") else {
            return SendOutcome::failure_default(
                FailureReason::AuthError,
                "missing FCM access token",
            );
        };

        let url = format!("{}/v1/projects/{}/messages:send", self.api_base, project_id);
        let body = Self::build_message(record);

        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!(record_id = %record.id, error = %e, "Push transport error");
                return SendOutcome::failure_default(FailureReason::NetworkError, e.to_string());
            }
        };

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if status.is_success() {
            debug!(record_id = %record.id, "Push accepted by FCM");
            return SendOutcome::success(text);
        }

        warn!(record_id = %record.id, %status, "Push rejected by FCM");
        self.classify_error(record, status, &text).await
    }
}
