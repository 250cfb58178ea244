//! Authentication event handlers.

use herald_core::types::{ChannelType, Event, PayloadMap, TenantBranding};

use crate::handler::{EventHandler, HandlerContent, copy_payload_keys};

/// Handles `user.registration.completed`.
pub struct RegistrationHandler;

impl EventHandler for RegistrationHandler {
    fn name(&self) -> &'static str {
        "registration"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &["user.registration.completed"]
    }

    fn channels_for(&self, _event: &Event) -> Vec<ChannelType> {
        // A completed registration produces exactly one welcome email.
        vec![ChannelType::Email]
    }

    fn context_for(&self, event: &Event, _branding: &TenantBranding) -> PayloadMap {
        copy_payload_keys(
            event,
            &[
                "username",
                "first_name",
                "last_name",
                "email",
                "registration_date",
                "verification_required",
                "login_link",
            ],
        )
    }

    fn content_for(
        &self,
        _event_type: &str,
        channel: ChannelType,
        context: &PayloadMap,
    ) -> Option<HandlerContent> {
        match channel {
            ChannelType::Email => {
                let verification = if context
                    .get("verification_required")
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(false)
                {
                    "\nTo get started, please verify your email address.\n"
                } else {
                    ""
                };
                Some(HandlerContent::with_subject(
                    "Welcome to {tenant_name}, {first_name}!",
                    format!(
                        "Hi {{first_name}},\n\n\
                         Welcome to {{tenant_name}}! Your account has been successfully created.\n\
                         {verification}\n\
                         If you have any questions, feel free to reach out to our support team.\n\n\
                         Best regards,\n\
                         The {{tenant_name}} Team"
                    ),
                ))
            }
            _ => None,
        }
    }
}

/// Handles `user.password.reset.requested`.
pub struct PasswordResetHandler;

impl EventHandler for PasswordResetHandler {
    fn name(&self) -> &'static str {
        "password_reset"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &["user.password.reset.requested"]
    }

    fn channels_for(&self, _event: &Event) -> Vec<ChannelType> {
        vec![ChannelType::Email, ChannelType::Sms]
    }

    fn context_for(&self, event: &Event, _branding: &TenantBranding) -> PayloadMap {
        let mut context = copy_payload_keys(
            event,
            &["email", "phone", "reset_token", "expires_at", "ip_address", "reset_link"],
        );
        // Synthesise the reset link from the token when the producer sent
        // none.
        if !context.contains_key("reset_link") {
            if let Some(token) = event.payload_str("reset_token") {
                context.insert(
                    "reset_link".to_string(),
                    format!("/reset-password?token={token}").into(),
                );
            }
        }
        context
    }

    fn content_for(
        &self,
        _event_type: &str,
        channel: ChannelType,
        _context: &PayloadMap,
    ) -> Option<HandlerContent> {
        match channel {
            ChannelType::Email => Some(HandlerContent::with_subject(
                "Password Reset Request - {tenant_name}",
                "Hi,\n\n\
                 We received a request to reset your password for your {tenant_name} account. \
                 If you made this request, open the link below:\n\n\
                 {reset_link}\n\n\
                 This link will expire at {expires_at}.\n\n\
                 If you didn't request this reset, please ignore this email and secure your \
                 account.\n\n\
                 For security reasons, this request was made from IP: {ip_address}\n\n\
                 Best regards,\n\
                 The {tenant_name} Security Team",
            )),
            ChannelType::Sms => Some(HandlerContent::body(
                "Password reset requested. Use this code to reset: {reset_token}",
            )),
            _ => None,
        }
    }
}

/// Handles `user.login.succeeded` and `user.login.failed`.
pub struct LoginSecurityHandler;

impl EventHandler for LoginSecurityHandler {
    fn name(&self) -> &'static str {
        "login_security"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &["user.login.succeeded", "user.login.failed"]
    }

    fn channels_for(&self, event: &Event) -> Vec<ChannelType> {
        if event.event_type == "user.login.failed" {
            vec![
                ChannelType::Email,
                ChannelType::Sms,
                ChannelType::Push,
                ChannelType::InApp,
            ]
        } else {
            vec![ChannelType::Email, ChannelType::InApp]
        }
    }

    fn context_for(&self, event: &Event, _branding: &TenantBranding) -> PayloadMap {
        copy_payload_keys(
            event,
            &[
                "email",
                "user_id",
                "login_time",
                "ip_address",
                "user_agent",
                "location",
                "failure_reason",
                "attempt_count",
            ],
        )
    }

    fn content_for(
        &self,
        event_type: &str,
        channel: ChannelType,
        _context: &PayloadMap,
    ) -> Option<HandlerContent> {
        let failed = event_type == "user.login.failed";
        match channel {
            ChannelType::Email if failed => Some(HandlerContent::with_subject(
                "Security Alert: Failed Login Attempt",
                "Security Alert!\n\n\
                 We detected a failed login attempt on your account.\n\n\
                 Details:\n\
                 - Time: {login_time}\n\
                 - IP Address: {ip_address}\n\
                 - Location: {location}\n\
                 - Reason: {failure_reason}\n\
                 - Attempt Count: {attempt_count}\n\n\
                 If this wasn't you, please change your password immediately and contact \
                 support.\n\n\
                 Best regards,\n\
                 The {tenant_name} Security Team",
            )),
            ChannelType::Email => Some(HandlerContent::with_subject(
                "New Login to Your Account",
                "Hi,\n\n\
                 We noticed a new login to your account.\n\n\
                 Details:\n\
                 - Time: {login_time}\n\
                 - IP Address: {ip_address}\n\
                 - Location: {location}\n\
                 - Device: {user_agent}\n\n\
                 If this wasn't you, please secure your account immediately.\n\n\
                 Best regards,\n\
                 The {tenant_name} Security Team",
            )),
            ChannelType::Sms if failed => Some(HandlerContent::body(
                "Security Alert: Failed login attempt detected. Check your email for details.",
            )),
            ChannelType::Push if failed => Some(
                HandlerContent::with_subject("Security Alert", "Failed login attempt detected")
                    .with_data(serde_json::json!({
                        "type": "security_alert",
                        "action": "open_security",
                    })),
            ),
            ChannelType::InApp if failed => Some(
                HandlerContent::with_subject(
                    "Security Alert: Failed Login",
                    "A failed login attempt was detected from {location}. Attempt #{attempt_count}",
                )
                .with_data(serde_json::json!({
                    "type": "login_failed",
                    "action": "view_security",
                    "priority": "urgent",
                })),
            ),
            ChannelType::InApp => Some(
                HandlerContent::with_subject(
                    "New Login Detected",
                    "A new login was detected on your account from {location}",
                )
                .with_data(serde_json::json!({
                    "type": "login_success",
                    "action": "view_activity",
                    "priority": "normal",
                })),
            ),
            _ => None,
        }
    }
}
