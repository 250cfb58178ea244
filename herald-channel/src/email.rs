//! SMTP email sender.
//!
//! Opens a fresh SMTP connection per record using the tenant's credentials
//! and sends a multipart message carrying the branded HTML body alongside
//! the plaintext rendering.

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart, header::ContentType};
use lettre::transport::smtp::authentication::Credentials as SmtpCredentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, warn};

use herald_core::types::{ChannelType, DeliveryRecord, FailureReason};
use herald_store::Credential;

use crate::{ChannelSender, SendOutcome};

/// SMTP sender for the email channel.
#[derive(Debug, Default)]
pub struct EmailSender;

impl EmailSender {
    /// Creates an email sender.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn build_transport(
        credentials: &Credential,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, SendOutcome> {
        let host = credentials.secret_str("smtp_host").ok_or_else(|| {
            SendOutcome::failure_default(FailureReason::AuthError, "missing smtp_host")
        })?;
        let port = credentials
            .secrets
            .get("smtp_port")
            .and_then(serde_json::Value::as_u64)
            .map_or(587, |p| p as u16);
        let use_ssl = credentials
            .secrets
            .get("use_ssl")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);

        let builder = if use_ssl {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        };
        let mut builder = builder
            .map_err(|e| SendOutcome::failure_default(FailureReason::NetworkError, e.to_string()))?
            .port(port);

        if let (Some(username), Some(password)) = (
            credentials.secret_str("username"),
            credentials.secret_str("password"),
        ) {
            builder = builder.credentials(SmtpCredentials::new(
                username.to_string(),
                password.to_string(),
            ));
        }

        Ok(builder.build())
    }

    fn from_address(credentials: &Credential, record: &DeliveryRecord) -> Option<String> {
        credentials
            .secret_str("from_email")
            .map(str::to_string)
            .or_else(|| {
                record
                    .context
                    .get("email_from")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })
    }

    fn classify_smtp_error(error: &lettre::transport::smtp::Error) -> SendOutcome {
        let text = error.to_string();
        let lowered = text.to_lowercase();
        if lowered.contains("credentials") || lowered.contains("authentication") {
            return SendOutcome::failure_default(FailureReason::AuthError, text);
        }
        if error.is_permanent() {
            // Permanent 5xx rejections are on the explicit non-retriable list.
            return SendOutcome::failure(FailureReason::ProviderError, false, text);
        }
        if error.is_transient() {
            return SendOutcome::failure(FailureReason::ProviderError, true, text);
        }
        SendOutcome::failure_default(FailureReason::NetworkError, text)
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn channel(&self) -> ChannelType {
        ChannelType::Email
    }

    async fn send(&self, credentials: &Credential, record: &DeliveryRecord) -> SendOutcome {
        let transport = match Self::build_transport(credentials) {
            Ok(transport) => transport,
            Err(outcome) => return outcome,
        };

        let Some(from) = Self::from_address(credentials, record) else {
            return SendOutcome::failure_default(FailureReason::ContentError, "no from address");
        };
        let Ok(from) = from.parse::<Mailbox>() else {
            return SendOutcome::failure_default(
                FailureReason::ContentError,
                format!("invalid from address: {from}"),
            );
        };
        let Ok(to) = record.recipient.parse::<Mailbox>() else {
            return SendOutcome::failure_default(
                FailureReason::ContentError,
                format!("invalid recipient address: {}", record.recipient),
            );
        };

        let subject = record.content.subject.clone().unwrap_or_default();
        let builder = Message::builder().from(from).to(to).subject(subject);

        let message = match &record.content.html_body {
            Some(html) => builder.multipart(MultiPart::alternative_plain_html(
                record.content.body.clone(),
                html.clone(),
            )),
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(record.content.body.clone()),
        };
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                return SendOutcome::failure_default(FailureReason::ContentError, e.to_string());
            }
        };

        match transport.send(message).await {
            Ok(response) => {
                debug!(record_id = %record.id, "Email accepted by SMTP server");
                SendOutcome::success(format!("{:?}", response.code()))
            }
            Err(e) => {
                warn!(record_id = %record.id, error = %e, "SMTP send failed");
                Self::classify_smtp_error(&e)
            }
        }
    }
}
