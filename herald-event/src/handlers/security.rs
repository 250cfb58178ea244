//! Two-factor authentication event handlers.

use herald_core::types::{ChannelType, Event, PayloadMap, TenantBranding};

use crate::handler::{EventHandler, HandlerContent, copy_payload_keys};

/// Handles the 2FA event family: code requested, attempt failed, method
/// changed.
pub struct TwoFactorHandler;

impl EventHandler for TwoFactorHandler {
    fn name(&self) -> &'static str {
        "two_factor"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &[
            "auth.2fa.code.requested",
            "auth.2fa.attempt.failed",
            "auth.2fa.method.changed",
        ]
    }

    fn channels_for(&self, event: &Event) -> Vec<ChannelType> {
        match event.event_type.as_str() {
            // A requested code goes out over the chosen delivery method
            // only; sending the same code over a second channel defeats
            // the method selection.
            "auth.2fa.code.requested" => match event.payload_str("method") {
                Some("email") => vec![ChannelType::Email],
                _ => vec![ChannelType::Sms],
            },
            "auth.2fa.attempt.failed" => {
                vec![ChannelType::Email, ChannelType::Sms, ChannelType::Push]
            }
            _ => vec![ChannelType::Email, ChannelType::InApp],
        }
    }

    fn context_for(&self, event: &Event, _branding: &TenantBranding) -> PayloadMap {
        let mut context = copy_payload_keys(
            event,
            &[
                "user_id",
                "user_first_name",
                "method",
                "expires_at",
                "ip_address",
                "user_agent",
                "failure_reason",
                "attempt_count",
                "old_method",
                "new_method",
                "changed_at",
            ],
        );
        // Producers have shipped the code under both keys.
        if let Some(code) = event
            .payload_str("code")
            .or_else(|| event.payload_str("2fa_code"))
        {
            context.insert("code".to_string(), code.into());
        }
        context
    }

    fn content_for(
        &self,
        event_type: &str,
        channel: ChannelType,
        _context: &PayloadMap,
    ) -> Option<HandlerContent> {
        match (event_type, channel) {
            ("auth.2fa.code.requested", ChannelType::Email) => Some(HandlerContent::with_subject(
                "Your Two-Factor Authentication Code",
                "Hi {user_first_name},\n\n\
                 Your two-factor authentication code is: {code}\n\n\
                 This code will expire at {expires_at}.\n\n\
                 If you didn't request this code, please secure your account immediately.\n\n\
                 Best regards,\n\
                 {tenant_name} Security Team",
            )),
            ("auth.2fa.code.requested", ChannelType::Sms) => Some(HandlerContent::body(
                "Your 2FA code: {code}. Expires: {expires_at}",
            )),
            ("auth.2fa.attempt.failed", ChannelType::Email) => Some(HandlerContent::with_subject(
                "Security Alert: Failed 2FA Attempt",
                "Security Alert!\n\n\
                 A failed two-factor authentication attempt was detected on your account.\n\n\
                 Details:\n\
                 - Method: {method}\n\
                 - IP Address: {ip_address}\n\
                 - Failure Reason: {failure_reason}\n\
                 - Attempt Count: {attempt_count}\n\n\
                 If this wasn't you, please change your password and contact support \
                 immediately.\n\n\
                 Best regards,\n\
                 {tenant_name} Security Team",
            )),
            ("auth.2fa.attempt.failed", ChannelType::Sms) => Some(HandlerContent::body(
                "Security Alert: Failed 2FA attempt detected. Check email for details.",
            )),
            ("auth.2fa.attempt.failed", ChannelType::Push) => Some(
                HandlerContent::with_subject("Security Alert", "Failed 2FA attempt detected")
                    .with_data(serde_json::json!({
                        "type": "security_alert",
                        "action": "review_security",
                    })),
            ),
            ("auth.2fa.method.changed", ChannelType::Email) => Some(HandlerContent::with_subject(
                "Security Settings Changed",
                "Hi,\n\n\
                 Your two-factor authentication method has been changed.\n\n\
                 Previous method: {old_method}\n\
                 New method: {new_method}\n\
                 Changed at: {changed_at}\n\n\
                 If you didn't make this change, please contact support immediately.\n\n\
                 Best regards,\n\
                 {tenant_name} Security Team",
            )),
            ("auth.2fa.method.changed", ChannelType::InApp) => Some(
                HandlerContent::with_subject(
                    "Security Settings Updated",
                    "Your 2FA method has been changed to {new_method}",
                )
                .with_data(serde_json::json!({
                    "type": "security_settings_changed",
                    "action": "view_security_settings",
                })),
            ),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::types::TenantId;

    fn event(event_type: &str, payload: serde_json::Value) -> Event {
        Event::new(
            event_type,
            TenantId::generate(),
            payload.as_object().cloned().unwrap_or_default(),
        )
    }

    #[test]
    fn test_code_requested_respects_method() {
        let handler = TwoFactorHandler;

        let sms = event("auth.2fa.code.requested", serde_json::json!({"method": "sms"}));
        assert_eq!(handler.channels_for(&sms), vec![ChannelType::Sms]);

        let email = event(
            "auth.2fa.code.requested",
            serde_json::json!({"method": "email"}),
        );
        assert_eq!(handler.channels_for(&email), vec![ChannelType::Email]);

        // Unknown or missing method defaults to SMS.
        let none = event("auth.2fa.code.requested", serde_json::json!({}));
        assert_eq!(handler.channels_for(&none), vec![ChannelType::Sms]);
    }

    #[test]
    fn test_code_lands_in_sms_body_after_render() {
        let handler = TwoFactorHandler;
        let event = event(
            "auth.2fa.code.requested",
            serde_json::json!({"method": "sms", "code": "123456", "phone": "+14155552671"}),
        );
        let branding = TenantBranding::fallback(&event.tenant_id);
        let context = handler.context_for(&event, &branding);
        let content = handler
            .content_for("auth.2fa.code.requested", ChannelType::Sms, &context)
            .unwrap();

        let body = herald_template::render_string(&content.body, &context);
        assert!(body.contains("123456"));
    }

    #[test]
    fn test_legacy_code_key_accepted() {
        let handler = TwoFactorHandler;
        let event = event(
            "auth.2fa.code.requested",
            serde_json::json!({"2fa_code": "654321"}),
        );
        let branding = TenantBranding::fallback(&event.tenant_id);
        let context = handler.context_for(&event, &branding);
        assert_eq!(context.get("code").and_then(|v| v.as_str()), Some("654321"));
    }

    #[test]
    fn test_method_changed_channels() {
        let handler = TwoFactorHandler;
        let event = event("auth.2fa.method.changed", serde_json::json!({}));
        assert_eq!(
            handler.channels_for(&event),
            vec![ChannelType::Email, ChannelType::InApp]
        );
    }
}
