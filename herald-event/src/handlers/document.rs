//! Document lifecycle event handlers.

use herald_core::types::{ChannelType, Event, PayloadMap, TenantBranding};

use crate::handler::{EventHandler, HandlerContent, copy_payload_keys};

/// Handles `user.document.expiry.warning` and `user.document.expired`.
pub struct DocumentExpiryHandler;

impl EventHandler for DocumentExpiryHandler {
    fn name(&self) -> &'static str {
        "document_expiry"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &["user.document.expiry.warning", "user.document.expired"]
    }

    fn channels_for(&self, _event: &Event) -> Vec<ChannelType> {
        vec![ChannelType::Email, ChannelType::InApp]
    }

    fn context_for(&self, event: &Event, _branding: &TenantBranding) -> PayloadMap {
        copy_payload_keys(
            event,
            &[
                "document_id",
                "document_name",
                "document_type",
                "expiry_date",
                "days_remaining",
            ],
        )
    }

    fn content_for(
        &self,
        event_type: &str,
        channel: ChannelType,
        _context: &PayloadMap,
    ) -> Option<HandlerContent> {
        let expired = event_type == "user.document.expired";
        match channel {
            ChannelType::Email if expired => Some(HandlerContent::with_subject(
                "Document Expired: {document_name}",
                "Hi,\n\n\
                 Your document \"{document_name}\" ({document_type}) expired on \
                 {expiry_date}.\n\n\
                 Please upload a renewed document to keep your account in good standing.\n\n\
                 Best regards,\n\
                 The {tenant_name} Team",
            )),
            ChannelType::Email => Some(HandlerContent::with_subject(
                "Document Expiring Soon: {document_name}",
                "Hi,\n\n\
                 Your document \"{document_name}\" ({document_type}) will expire on \
                 {expiry_date}, in {days_remaining} days.\n\n\
                 Please upload a renewed document before it expires.\n\n\
                 Best regards,\n\
                 The {tenant_name} Team",
            )),
            ChannelType::InApp if expired => Some(
                HandlerContent::with_subject(
                    "Document expired",
                    "\"{document_name}\" expired on {expiry_date}",
                )
                .with_data(serde_json::json!({
                    "type": "document_expired",
                    "document_id": "{document_id}",
                    "action": "open_documents",
                })),
            ),
            ChannelType::InApp => Some(
                HandlerContent::with_subject(
                    "Document expiring soon",
                    "\"{document_name}\" expires in {days_remaining} days",
                )
                .with_data(serde_json::json!({
                    "type": "document_expiry_warning",
                    "document_id": "{document_id}",
                    "action": "open_documents",
                })),
            ),
            _ => None,
        }
    }
}
