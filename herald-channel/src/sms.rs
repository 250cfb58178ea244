//! SMS sender over the provider REST API.
//!
//! Validates the recipient against E.164 before submit and maps provider
//! error codes into the failure taxonomy (21211 invalid number is on the
//! explicit non-retriable list, 20003 is an authentication failure).

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use herald_core::types::{ChannelType, DeliveryRecord, FailureReason};
use herald_store::Credential;

use crate::{ChannelSender, SendOutcome};

const DEFAULT_API_BASE: &str = "https://api.twilio.com";

/// Provider error codes that are never retried.
const NON_RETRIABLE_CODES: [u32; 2] = [21211, 21614];

#[derive(Debug, Deserialize)]
struct ProviderMessageResponse {
    sid: Option<String>,
    status: Option<String>,
    code: Option<u32>,
    message: Option<String>,
}

/// REST sender for the SMS channel.
pub struct SmsSender {
    client: reqwest::Client,
    api_base: String,
}

impl Default for SmsSender {
    fn default() -> Self {
        Self::new()
    }
}

impl SmsSender {
    /// Creates a sender against the production provider API.
    #[must_use]
    pub fn new() -> Self {
        Self::with_api_base(DEFAULT_API_BASE)
    }

    /// Creates a sender against an alternate API base, for tests.
    #[must_use]
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Validates an E.164 phone number: `+` followed by 8 to 15 digits,
    /// the first being non-zero.
    #[must_use]
    pub fn is_e164(number: &str) -> bool {
        let Some(digits) = number.strip_prefix('+') else {
            return false;
        };
        (8..=15).contains(&digits.len())
            && digits.chars().all(|c| c.is_ascii_digit())
            && !digits.starts_with('0')
    }

    fn classify_response(status: reqwest::StatusCode, body: &ProviderMessageResponse) -> SendOutcome {
        let detail = body
            .message
            .clone()
            .unwrap_or_else(|| format!("HTTP {status}"));

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return SendOutcome::failure_default(FailureReason::AuthError, detail);
        }
        if let Some(code) = body.code {
            if code == 20003 {
                return SendOutcome::failure_default(FailureReason::AuthError, detail);
            }
            if NON_RETRIABLE_CODES.contains(&code) {
                return SendOutcome::failure(
                    FailureReason::ProviderError,
                    false,
                    format!("code {code}: {detail}"),
                );
            }
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return SendOutcome::failure(FailureReason::ProviderError, true, detail);
        }
        SendOutcome::failure(FailureReason::ProviderError, true, detail)
    }
}

#[async_trait]
impl ChannelSender for SmsSender {
    fn channel(&self) -> ChannelType {
        ChannelType::Sms
    }

    async fn send(&self, credentials: &Credential, record: &DeliveryRecord) -> SendOutcome {
        if !Self::is_e164(&record.recipient) {
            return SendOutcome::failure_default(
                FailureReason::ContentError,
                format!("recipient is not E.164: {}", record.recipient),
            );
        }

        let (Some(account_sid), Some(auth_token), Some(from_number)) = (
            credentials.secret_str("account_sid"),
            credentials.secret_str("auth_token"),
            credentials.secret_str("from_number"),
        ) else {
            return SendOutcome::failure_default(
                FailureReason::AuthError,
                "missing SMS provider credentials",
            );
        };

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, account_sid
        );
        let params = [
            ("To", record.recipient.as_str()),
            ("From", from_number),
            ("Body", record.content.body.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .basic_auth(account_sid, Some(auth_token))
            .form(&params)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!(record_id = %record.id, error = %e, "SMS transport error");
                return SendOutcome::failure_default(FailureReason::NetworkError, e.to_string());
            }
        };

        let status = response.status();
        let body: ProviderMessageResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                if status.is_success() {
                    return SendOutcome::success(format!("HTTP {status}"));
                }
                return SendOutcome::failure(
                    FailureReason::ProviderError,
                    true,
                    format!("HTTP {status}, unreadable body: {e}"),
                );
            }
        };

        if status.is_success() {
            debug!(record_id = %record.id, sid = ?body.sid, "SMS accepted by provider");
            let sid = body.sid.unwrap_or_default();
            let message_status = body.status.unwrap_or_default();
            return SendOutcome::success(format!("sid={sid} status={message_status}"));
        }

        warn!(record_id = %record.id, code = ?body.code, "SMS rejected by provider");
        Self::classify_response(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::types::{PayloadMap, RenderedContent, TenantId};

    fn record(recipient: &str) -> DeliveryRecord {
        DeliveryRecord::new(
            TenantId::generate(),
            ChannelType::Sms,
            recipient,
            RenderedContent::body("your code is 123456"),
            PayloadMap::new(),
        )
    }

    #[test]
    fn test_e164_validation() {
        assert!(SmsSender::is_e164("+14155552671"));
        assert!(SmsSender::is_e164("+4915112345678"));
        assert!(!SmsSender::is_e164("14155552671"));
        assert!(!SmsSender::is_e164("+0123456789"));
        assert!(!SmsSender::is_e164("+1415555"));
        assert!(!SmsSender::is_e164("+1415555abcd"));
        assert!(!SmsSender::is_e164(""));
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_content_error() {
        let sender = SmsSender::new();
        let credential = Credential::new(
            TenantId::generate(),
            ChannelType::Sms,
            serde_json::Map::new(),
            false,
        );
        let outcome = sender.send(&credential, &record("not-a-number")).await;
        assert!(matches!(
            outcome,
            SendOutcome::Failure {
                reason: FailureReason::ContentError,
                retriable: false,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_credentials_is_auth_error() {
        let sender = SmsSender::new();
        let credential = Credential::new(
            TenantId::generate(),
            ChannelType::Sms,
            serde_json::Map::new(),
            false,
        );
        let outcome = sender.send(&credential, &record("+14155552671")).await;
        assert!(matches!(
            outcome,
            SendOutcome::Failure {
                reason: FailureReason::AuthError,
                retriable: false,
                ..
            }
        ));
    }

    #[test]
    fn test_classify_invalid_number_not_retriable() {
        let body = ProviderMessageResponse {
            sid: None,
            status: None,
            code: Some(21211),
            message: Some("invalid 'To' number".to_string()),
        };
        let outcome = SmsSender::classify_response(reqwest::StatusCode::BAD_REQUEST, &body);
        assert!(matches!(
            outcome,
            SendOutcome::Failure {
                reason: FailureReason::ProviderError,
                retriable: false,
                ..
            }
        ));
    }

    #[test]
    fn test_classify_auth_code() {
        let body = ProviderMessageResponse {
            sid: None,
            status: None,
            code: Some(20003),
            message: Some("authenticate".to_string()),
        };
        let outcome = SmsSender::classify_response(reqwest::StatusCode::BAD_REQUEST, &body);
        assert!(matches!(
            outcome,
            SendOutcome::Failure {
                reason: FailureReason::AuthError,
                ..
            }
        ));
    }

    #[test]
    fn test_classify_rate_limit_retriable() {
        let body = ProviderMessageResponse {
            sid: None,
            status: None,
            code: None,
            message: None,
        };
        let outcome = SmsSender::classify_response(reqwest::StatusCode::TOO_MANY_REQUESTS, &body);
        assert!(matches!(
            outcome,
            SendOutcome::Failure {
                reason: FailureReason::ProviderError,
                retriable: true,
                ..
            }
        ));
    }
}
