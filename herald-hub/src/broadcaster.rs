//! Internal publish operations over the connection registry.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use herald_core::error::ChannelError;
use herald_core::types::TenantId;
use herald_channel::InAppPublisher;

use crate::connection::{ConnectionKind, ConnectionRegistry};
use crate::message::ServerFrame;

/// Broadcast facade used by the delivery pipeline and the admin surface.
#[derive(Clone)]
pub struct HubBroadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl HubBroadcaster {
    /// Creates a broadcaster over the registry.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Forwards a frame to every notification connection of a tenant.
    pub fn broadcast(&self, tenant_id: &TenantId, frame: &ServerFrame) -> usize {
        self.registry
            .broadcast_tenant(tenant_id, ConnectionKind::Notifications, &frame.to_text())
    }

    /// Live connection count, for diagnostics.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.registry.count()
    }
}

#[async_trait]
impl InAppPublisher for HubBroadcaster {
    async fn publish(
        &self,
        tenant_id: &TenantId,
        recipient: &str,
        frame: serde_json::Value,
    ) -> Result<usize, ChannelError> {
        let text = frame.to_string();
        // `all` is the tenant-wide broadcast recipient; anything else is a
        // user id within the tenant group.
        let delivered = if recipient == "all" {
            self.registry
                .broadcast_tenant(tenant_id, ConnectionKind::Notifications, &text)
        } else {
            self.registry
                .send_to_user(tenant_id, ConnectionKind::Notifications, recipient, &text)
        };
        debug!(%tenant_id, recipient, delivered, "In-app frame published");
        Ok(delivered)
    }
}
