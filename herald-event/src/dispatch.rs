//! Event dispatch: from a validated event to enqueued delivery records.
//!
//! For each channel the handler selects, the dispatcher resolves a
//! tenant-owned template override (named after the event type) or falls
//! back to the handler's inline content, renders it against the handler
//! context enriched with branding, and persists one delivery record per
//! recipient into the queue.

use std::sync::Arc;

use tracing::{debug, warn};

use herald_cache::BrandingCache;
use herald_core::error::EventError;
use herald_core::types::{
    ChannelType, DeliveryRecord, Event, PayloadMap, RenderedContent, TenantBranding,
};
use herald_queue::DeliveryQueue;
use herald_store::DeviceTokenStore;
use herald_template::{Template, TemplateStore, render, wrap_email_html};

use crate::handler::EventHandler;

/// Builds delivery records for events and feeds them to the queue.
pub struct EventDispatcher {
    branding: Arc<BrandingCache>,
    templates: Arc<dyn TemplateStore>,
    devices: Arc<dyn DeviceTokenStore>,
    queue: Arc<DeliveryQueue>,
}

impl EventDispatcher {
    /// Creates a dispatcher over its collaborators.
    #[must_use]
    pub fn new(
        branding: Arc<BrandingCache>,
        templates: Arc<dyn TemplateStore>,
        devices: Arc<dyn DeviceTokenStore>,
        queue: Arc<DeliveryQueue>,
    ) -> Self {
        Self {
            branding,
            templates,
            devices,
            queue,
        }
    }

    /// Processes one event through its handler.
    ///
    /// Returns the number of delivery records enqueued.
    ///
    /// # Errors
    ///
    /// Returns a retriable error when the store or queue is unavailable;
    /// content-level gaps (no recipient, no content for a channel) skip the
    /// channel instead of failing the event.
    pub async fn dispatch(
        &self,
        handler: &Arc<dyn EventHandler>,
        event: &Event,
    ) -> Result<usize, EventError> {
        let branding = self.branding.get(&event.tenant_id).await;

        let mut context = handler.context_for(event, &branding);
        inject_branding(&mut context, &branding);

        let mut created = 0;
        for channel in handler.channels_for(event) {
            let Some(rendered) = self.render_channel(handler, event, channel, &context, &branding).await?
            else {
                debug!(
                    event_type = %event.event_type,
                    %channel,
                    "No content for channel, skipping"
                );
                continue;
            };

            let recipients = self.recipients_for(handler, event, channel).await?;
            if recipients.is_empty() {
                warn!(
                    event_type = %event.event_type,
                    %channel,
                    "No recipient resolved, skipping channel"
                );
                continue;
            }

            for recipient in recipients {
                let mut record = DeliveryRecord::new(
                    event.tenant_id.clone(),
                    channel,
                    recipient.clone(),
                    rendered.clone(),
                    context.clone(),
                );
                if let Some(event_id) = event.event_id() {
                    record = record.with_dedup_key(format!(
                        "{}:{}:{}:{}",
                        event.tenant_id, event_id, channel, recipient
                    ));
                }
                self.queue
                    .enqueue(record)
                    .await
                    .map_err(|e| EventError::Handler {
                        event_type: event.event_type.clone(),
                        reason: e.to_string(),
                        retriable: e.is_retriable(),
                    })?;
                created += 1;
            }
        }

        debug!(
            event_type = %event.event_type,
            tenant_id = %event.tenant_id,
            created,
            "Event dispatched"
        );
        Ok(created)
    }

    /// Direct send: bypasses event intake but still flows through the
    /// renderer and the delivery queue.
    ///
    /// The named tenant template must exist for the channel; the context
    /// is enriched with branding before rendering.
    ///
    /// # Errors
    ///
    /// Returns a non-retriable error when the template is missing and a
    /// retriable one when the store or queue is unavailable.
    pub async fn dispatch_direct(
        &self,
        tenant_id: herald_core::types::TenantId,
        channel: ChannelType,
        recipient: &str,
        template_name: &str,
        mut context: PayloadMap,
    ) -> Result<herald_core::types::RecordId, EventError> {
        let branding = self.branding.get(&tenant_id).await;
        inject_branding(&mut context, &branding);

        let template = self
            .templates
            .get_active(&tenant_id, template_name, channel)
            .await
            .map_err(|e| EventError::Handler {
                event_type: template_name.to_string(),
                reason: e.to_string(),
                retriable: e.is_retriable(),
            })?
            .ok_or_else(|| EventError::Handler {
                event_type: template_name.to_string(),
                reason: format!("no active {channel} template named {template_name}"),
                retriable: false,
            })?;

        let mut rendered = herald_template::render(&template, &context);
        if channel == ChannelType::Email {
            let subject = rendered.subject.clone().unwrap_or_default();
            rendered.html_body = Some(wrap_email_html(&subject, &rendered.body, &branding));
        }

        let record = DeliveryRecord::new(tenant_id, channel, recipient, rendered, context);
        let record_id = record.id.clone();
        self.queue
            .enqueue(record)
            .await
            .map_err(|e| EventError::Handler {
                event_type: template_name.to_string(),
                reason: e.to_string(),
                retriable: e.is_retriable(),
            })?;
        Ok(record_id)
    }

    async fn render_channel(
        &self,
        handler: &Arc<dyn EventHandler>,
        event: &Event,
        channel: ChannelType,
        context: &PayloadMap,
        branding: &TenantBranding,
    ) -> Result<Option<RenderedContent>, EventError> {
        let stored = self
            .templates
            .get_active(&event.tenant_id, &event.event_type, channel)
            .await
            .map_err(|e| EventError::Handler {
                event_type: event.event_type.clone(),
                reason: e.to_string(),
                retriable: e.is_retriable(),
            })?;

        let template = match stored {
            Some(template) => template,
            None => {
                let Some(content) = handler.content_for(&event.event_type, channel, context)
                else {
                    return Ok(None);
                };
                let mut template = Template::new(
                    event.tenant_id.clone(),
                    event.event_type.clone(),
                    channel,
                    content.body,
                );
                template.subject = content.subject;
                template.data = content.data;
                template
            }
        };

        let mut rendered = render(&template, context);
        if channel == ChannelType::Email {
            let subject = rendered.subject.clone().unwrap_or_default();
            rendered.html_body = Some(wrap_email_html(&subject, &rendered.body, branding));
        }
        Ok(Some(rendered))
    }

    async fn recipients_for(
        &self,
        handler: &Arc<dyn EventHandler>,
        event: &Event,
        channel: ChannelType,
    ) -> Result<Vec<String>, EventError> {
        let Some(recipient) = handler.recipient_for(channel, event) else {
            return Ok(Vec::new());
        };

        // Push fans out to the user's registered device tokens.
        if channel == ChannelType::Push {
            let tokens = self
                .devices
                .active_for_user(&event.tenant_id, &recipient)
                .await
                .map_err(|e| EventError::Handler {
                    event_type: event.event_type.clone(),
                    reason: e.to_string(),
                    retriable: e.is_retriable(),
                })?;
            return Ok(tokens.into_iter().map(|t| t.token).collect());
        }

        Ok(vec![recipient])
    }
}

fn inject_branding(context: &mut PayloadMap, branding: &TenantBranding) {
    context.insert("tenant_name".to_string(), branding.name.clone().into());
    context.insert(
        "primary_color".to_string(),
        branding.primary_color.clone().into(),
    );
    context.insert(
        "secondary_color".to_string(),
        branding.secondary_color.clone().into(),
    );
    if let Some(logo_url) = &branding.logo_url {
        context.insert("logo_url".to_string(), logo_url.clone().into());
    }
    if let Some(email_from) = &branding.email_from {
        context.insert("email_from".to_string(), email_from.clone().into());
    }
}
