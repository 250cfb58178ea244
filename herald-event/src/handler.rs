//! Event handler capability set and registry.
//!
//! Handlers are pure with respect to the input event plus tenant branding;
//! all side effects flow through the delivery queue. The registry is an
//! explicit value constructed at init and passed by reference into the
//! consumer.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use herald_core::types::{ChannelType, Event, PayloadMap, TenantBranding};

/// Channel content produced by a handler: an inline template whose markers
/// the renderer substitutes from the handler's context.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerContent {
    /// Subject line, where the channel has one.
    pub subject: Option<String>,
    /// Body text with `{name}` / `{{name}}` markers.
    pub body: String,
    /// Channel-specific structured payload.
    pub data: Option<serde_json::Value>,
}

impl HandlerContent {
    /// Builds body-only content.
    #[must_use]
    pub fn body(body: impl Into<String>) -> Self {
        Self {
            subject: None,
            body: body.into(),
            data: None,
        }
    }

    /// Builds subject + body content.
    #[must_use]
    pub fn with_subject(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            body: body.into(),
            data: None,
        }
    }

    /// Attaches a structured payload.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// The capability set implemented by every event handler.
pub trait EventHandler: Send + Sync {
    /// Handler name for logs.
    fn name(&self) -> &'static str;

    /// Event types this handler serves.
    fn event_types(&self) -> &'static [&'static str];

    /// Exact-match check against the supported event types.
    fn can_handle(&self, event_type: &str) -> bool {
        self.event_types().contains(&event_type)
    }

    /// Target channels for an event. Each returned channel becomes a
    /// separate delivery record.
    fn channels_for(&self, event: &Event) -> Vec<ChannelType>;

    /// Extracts the template context from the event payload.
    ///
    /// Branding is injected into the rendered context by the dispatcher;
    /// handlers only need it when content depends on tenant identity
    /// beyond the standard keys.
    fn context_for(&self, event: &Event, branding: &TenantBranding) -> PayloadMap;

    /// Inline content for one channel, or `None` to skip the channel.
    fn content_for(
        &self,
        event_type: &str,
        channel: ChannelType,
        context: &PayloadMap,
    ) -> Option<HandlerContent>;

    /// Recipient address for a channel.
    ///
    /// The default maps email to the payload `email`, SMS to `phone`, and
    /// push/in-app to `user_id`.
    fn recipient_for(&self, channel: ChannelType, event: &Event) -> Option<String> {
        let key_chain: &[&str] = match channel {
            ChannelType::Email => &["email", "user_email"],
            ChannelType::Sms => &["phone"],
            ChannelType::Push | ChannelType::InApp => &["user_id"],
        };
        key_chain
            .iter()
            .find_map(|key| event.payload_str(key))
            .map(str::to_string)
    }
}

/// Copies the named payload keys into a fresh context map.
///
/// Missing keys are skipped; the renderer preserves their markers so the
/// omission is visible in the output rather than silently blank.
#[must_use]
pub fn copy_payload_keys(event: &Event, keys: &[&str]) -> PayloadMap {
    let mut context = PayloadMap::new();
    for key in keys {
        if let Some(value) = event.payload.get(*key) {
            context.insert((*key).to_string(), value.clone());
        }
    }
    context
}

/// Registry mapping event type to handler, exact match.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the registry with every built-in handler.
    #[must_use]
    pub fn standard() -> Self {
        let registry = Self::new()
            .with_handler(Arc::new(crate::handlers::auth::RegistrationHandler))
            .with_handler(Arc::new(crate::handlers::auth::PasswordResetHandler))
            .with_handler(Arc::new(crate::handlers::auth::LoginSecurityHandler))
            .with_handler(Arc::new(crate::handlers::security::TwoFactorHandler))
            .with_handler(Arc::new(crate::handlers::app::InvoicePaymentHandler))
            .with_handler(Arc::new(crate::handlers::app::TaskAssignmentHandler))
            .with_handler(Arc::new(crate::handlers::app::CommentMentionHandler))
            .with_handler(Arc::new(crate::handlers::app::ContentEngagementHandler))
            .with_handler(Arc::new(crate::handlers::document::DocumentExpiryHandler));
        info!(
            handlers = registry.supported_events().len(),
            "Event handler registry built"
        );
        registry
    }

    /// Registers a handler under all of its event types.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        for event_type in handler.event_types() {
            self.handlers.insert(event_type, Arc::clone(&handler));
        }
        self
    }

    /// Looks up the handler for an event type.
    #[must_use]
    pub fn get(&self, event_type: &str) -> Option<&Arc<dyn EventHandler>> {
        self.handlers.get(event_type)
    }

    /// All supported event types, sorted.
    #[must_use]
    pub fn supported_events(&self) -> Vec<&'static str> {
        let mut events: Vec<_> = self.handlers.keys().copied().collect();
        events.sort_unstable();
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::types::TenantId;

    #[test]
    fn test_standard_registry_covers_supported_events() {
        let registry = HandlerRegistry::standard();
        for event_type in [
            "user.registration.completed",
            "user.password.reset.requested",
            "user.login.succeeded",
            "user.login.failed",
            "auth.2fa.code.requested",
            "auth.2fa.attempt.failed",
            "auth.2fa.method.changed",
            "invoice.payment.failed",
            "task.assigned",
            "comment.mentioned",
            "content.liked",
            "user.document.expiry.warning",
            "user.document.expired",
        ] {
            assert!(
                registry.get(event_type).is_some(),
                "no handler for {event_type}"
            );
        }
    }

    #[test]
    fn test_unknown_event_type_unmatched() {
        let registry = HandlerRegistry::standard();
        assert!(registry.get("unknown.event.type").is_none());
        // Exact match only, no prefix routing.
        assert!(registry.get("user.login").is_none());
    }

    #[test]
    fn test_copy_payload_keys_skips_missing() {
        let mut payload = PayloadMap::new();
        payload.insert("email".to_string(), "a@b.test".into());
        let event = Event::new("x.y", TenantId::generate(), payload);

        let context = copy_payload_keys(&event, &["email", "phone"]);
        assert_eq!(context.len(), 1);
        assert!(context.contains_key("email"));
    }
}
