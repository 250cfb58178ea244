//! Application event handlers.

use herald_core::types::{ChannelType, Event, PayloadMap, TenantBranding};

use crate::handler::{EventHandler, HandlerContent, copy_payload_keys};

/// Handles `invoice.payment.failed`.
pub struct InvoicePaymentHandler;

impl EventHandler for InvoicePaymentHandler {
    fn name(&self) -> &'static str {
        "invoice_payment"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &["invoice.payment.failed"]
    }

    fn channels_for(&self, _event: &Event) -> Vec<ChannelType> {
        vec![ChannelType::Email, ChannelType::Sms, ChannelType::Push]
    }

    fn context_for(&self, event: &Event, _branding: &TenantBranding) -> PayloadMap {
        copy_payload_keys(
            event,
            &[
                "invoice_id",
                "amount",
                "currency",
                "failure_reason",
                "next_retry_date",
                "payment_method",
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
                let retry_line = if context.contains_key("next_retry_date") {
                    "\nWe'll automatically retry this payment on {next_retry_date}.\n"
                } else {
                    ""
                };
                Some(HandlerContent::with_subject(
                    "Payment Failed - Invoice {invoice_id} - {tenant_name}",
                    format!(
                        "Payment Failed\n\n\
                         We're sorry, but your payment of {{currency}} {{amount}} for invoice \
                         {{invoice_id}} has failed.\n\n\
                         Reason: {{failure_reason}}\n\n\
                         Please update your payment method or contact {{tenant_name}} support to \
                         resolve this issue.\n\
                         {retry_line}\n\
                         Best regards,\n\
                         {{tenant_name}} Billing Team"
                    ),
                ))
            }
            ChannelType::Sms => Some(HandlerContent::body(
                "Payment failed for invoice {invoice_id} ({currency} {amount}). \
                 Please update payment method.",
            )),
            ChannelType::Push => Some(
                HandlerContent::with_subject(
                    "Payment Failed",
                    "Invoice {invoice_id} payment of {currency} {amount} failed",
                )
                .with_data(serde_json::json!({
                    "type": "payment_failed",
                    "invoice_id": "{invoice_id}",
                    "action": "open_billing",
                })),
            ),
            _ => None,
        }
    }
}

/// Handles `task.assigned`.
pub struct TaskAssignmentHandler;

impl EventHandler for TaskAssignmentHandler {
    fn name(&self) -> &'static str {
        "task_assignment"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &["task.assigned"]
    }

    fn channels_for(&self, _event: &Event) -> Vec<ChannelType> {
        vec![ChannelType::Email, ChannelType::InApp, ChannelType::Push]
    }

    fn context_for(&self, event: &Event, _branding: &TenantBranding) -> PayloadMap {
        copy_payload_keys(
            event,
            &[
                "task_id",
                "task_title",
                "task_description",
                "assigned_by",
                "due_date",
                "priority",
            ],
        )
    }

    fn content_for(
        &self,
        _event_type: &str,
        channel: ChannelType,
        _context: &PayloadMap,
    ) -> Option<HandlerContent> {
        match channel {
            ChannelType::Email => Some(HandlerContent::with_subject(
                "New Task Assigned: {task_title} - {tenant_name}",
                "Hi,\n\n\
                 A new task has been assigned to you in {tenant_name}:\n\n\
                 Task: {task_title}\n\
                 Description: {task_description}\n\
                 Assigned by: {assigned_by}\n\
                 Due Date: {due_date}\n\
                 Priority: {priority}\n\n\
                 Please review and complete this task by the due date.\n\n\
                 Best regards,\n\
                 {tenant_name} Task Management",
            )),
            ChannelType::InApp => Some(
                HandlerContent::with_subject("New Task Assigned", "{task_title} - Due: {due_date}")
                    .with_data(serde_json::json!({
                        "type": "task_assigned",
                        "task_id": "{task_id}",
                        "action": "open_task",
                    })),
            ),
            ChannelType::Push => Some(
                HandlerContent::with_subject("New Task: {task_title}", "Assigned by {assigned_by}")
                    .with_data(serde_json::json!({
                        "type": "task_assigned",
                        "task_id": "{task_id}",
                    })),
            ),
            _ => None,
        }
    }
}

/// Handles `comment.mentioned`.
pub struct CommentMentionHandler;

impl EventHandler for CommentMentionHandler {
    fn name(&self) -> &'static str {
        "comment_mention"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &["comment.mentioned"]
    }

    fn channels_for(&self, _event: &Event) -> Vec<ChannelType> {
        vec![ChannelType::InApp, ChannelType::Push, ChannelType::Email]
    }

    fn context_for(&self, event: &Event, _branding: &TenantBranding) -> PayloadMap {
        copy_payload_keys(
            event,
            &["comment_id", "comment_text", "mentioned_by", "thread_title", "thread_url"],
        )
    }

    fn content_for(
        &self,
        _event_type: &str,
        channel: ChannelType,
        _context: &PayloadMap,
    ) -> Option<HandlerContent> {
        match channel {
            ChannelType::Email => Some(HandlerContent::with_subject(
                "{mentioned_by} mentioned you in {thread_title}",
                "Hi,\n\n\
                 {mentioned_by} mentioned you in a comment:\n\n\
                 \"{comment_text}\"\n\n\
                 Thread: {thread_title}\n\
                 {thread_url}\n\n\
                 Best regards,\n\
                 The {tenant_name} Team",
            )),
            ChannelType::InApp | ChannelType::Push => Some(
                HandlerContent::with_subject("You were mentioned", "{mentioned_by}: {comment_text}")
                    .with_data(serde_json::json!({
                        "type": "comment_mention",
                        "comment_id": "{comment_id}",
                        "action": "open_thread",
                        "url": "{thread_url}",
                    })),
            ),
            ChannelType::Sms => None,
        }
    }
}

/// Handles `content.liked`.
pub struct ContentEngagementHandler;

impl EventHandler for ContentEngagementHandler {
    fn name(&self) -> &'static str {
        "content_engagement"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &["content.liked"]
    }

    fn channels_for(&self, _event: &Event) -> Vec<ChannelType> {
        // Engagement noise stays in-app only.
        vec![ChannelType::InApp]
    }

    fn context_for(&self, event: &Event, _branding: &TenantBranding) -> PayloadMap {
        copy_payload_keys(event, &["content_id", "content_title", "liked_by"])
    }

    fn content_for(
        &self,
        _event_type: &str,
        channel: ChannelType,
        _context: &PayloadMap,
    ) -> Option<HandlerContent> {
        match channel {
            ChannelType::InApp => Some(
                HandlerContent::with_subject("New like", "{liked_by} liked \"{content_title}\"")
                    .with_data(serde_json::json!({
                        "type": "content_liked",
                        "content_id": "{content_id}",
                        "action": "open_content",
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
    fn test_invoice_retry_line_only_with_date() {
        let handler = InvoicePaymentHandler;
        let branding = TenantBranding::fallback(&TenantId::generate());

        let with_date = event(
            "invoice.payment.failed",
            serde_json::json!({"next_retry_date": "2024-04-01"}),
        );
        let context = handler.context_for(&with_date, &branding);
        let content = handler
            .content_for("invoice.payment.failed", ChannelType::Email, &context)
            .unwrap();
        assert!(content.body.contains("automatically retry"));

        let without = event("invoice.payment.failed", serde_json::json!({}));
        let context = handler.context_for(&without, &branding);
        let content = handler
            .content_for("invoice.payment.failed", ChannelType::Email, &context)
            .unwrap();
        assert!(!content.body.contains("automatically retry"));
    }

    #[test]
    fn test_content_liked_is_inapp_only() {
        let handler = ContentEngagementHandler;
        let event = event("content.liked", serde_json::json!({}));
        assert_eq!(handler.channels_for(&event), vec![ChannelType::InApp]);
        assert!(handler
            .content_for("content.liked", ChannelType::Email, &PayloadMap::new())
            .is_none());
    }

    #[test]
    fn test_mention_has_no_sms_content() {
        let handler = CommentMentionHandler;
        assert!(handler
            .content_for("comment.mentioned", ChannelType::Sms, &PayloadMap::new())
            .is_none());
    }
}
