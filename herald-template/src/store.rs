//! Template storage.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use herald_core::error::StoreError;
use herald_core::types::{ChannelType, TenantId};

use crate::model::Template;

/// Storage seam for templates.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Upserts a template for `(tenant, name, channel)`, bumping the version
    /// and deactivating the previous row.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the template uses undeclared placeholders.
    async fn upsert(&self, template: Template) -> Result<Template, StoreError>;

    /// Resolves the active template for `(tenant, name, channel)`.
    ///
    /// # Errors
    ///
    /// Returns an error only on backend failure.
    async fn get_active(
        &self,
        tenant_id: &TenantId,
        name: &str,
        channel: ChannelType,
    ) -> Result<Option<Template>, StoreError>;
}

/// In-memory template store.
#[derive(Default)]
pub struct InMemoryTemplateStore {
    rows: Mutex<HashMap<(TenantId, String, ChannelType), Vec<Template>>>,
}

impl InMemoryTemplateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TemplateStore for InMemoryTemplateStore {
    async fn upsert(&self, mut template: Template) -> Result<Template, StoreError> {
        let undeclared = template.undeclared_placeholders();
        if !undeclared.is_empty() {
            return Err(StoreError::Conflict {
                entity: "template",
                reason: format!("undeclared placeholders: {}", undeclared.join(", ")),
            });
        }

        let mut rows = self.rows.lock();
        let key = (
            template.tenant_id.clone(),
            template.name.clone(),
            template.channel,
        );
        let entry = rows.entry(key).or_default();
        if let Some(previous) = entry.iter_mut().find(|t| t.active) {
            previous.active = false;
            template.version = previous.version + 1;
        }
        debug!(
            tenant_id = %template.tenant_id,
            name = %template.name,
            channel = %template.channel,
            version = template.version,
            "Template stored"
        );
        entry.push(template.clone());
        Ok(template)
    }

    async fn get_active(
        &self,
        tenant_id: &TenantId,
        name: &str,
        channel: ChannelType,
    ) -> Result<Option<Template>, StoreError> {
        let rows = self.rows.lock();
        Ok(rows
            .get(&(tenant_id.clone(), name.to_string(), channel))
            .and_then(|entry| entry.iter().find(|t| t.active).cloned()))
    }
}
