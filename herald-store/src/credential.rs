//! Tenant channel credential storage.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use herald_core::error::StoreError;
use herald_core::types::{ChannelType, TenantId};

/// A `(tenant, channel)` credential row.
///
/// `secrets` is an opaque map; sensitive fields are stored encrypted and
/// only the cache hands out decrypted snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Unique id.
    pub id: String,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Channel the credential applies to.
    pub channel: ChannelType,
    /// Opaque secret map, e.g. SMTP host/port/user/pass.
    pub secrets: serde_json::Map<String, serde_json::Value>,
    /// Operator-provisioned credentials never fall back to defaults.
    pub custom: bool,
    /// At most one active credential per `(tenant, channel)`.
    pub active: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Soft-delete marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Creates a new active credential.
    #[must_use]
    pub fn new(
        tenant_id: TenantId,
        channel: ChannelType,
        secrets: serde_json::Map<String, serde_json::Value>,
        custom: bool,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id,
            channel,
            secrets,
            custom,
            active: true,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    /// Returns a secret field as a string slice.
    #[must_use]
    pub fn secret_str(&self, key: &str) -> Option<&str> {
        self.secrets.get(key).and_then(|v| v.as_str())
    }
}

/// Storage seam for tenant credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Inserts a credential, superseding any previously active row for the
    /// same `(tenant, channel)`.
    ///
    /// # Errors
    ///
    /// Returns an error only on backend failure.
    async fn upsert(&self, credential: Credential) -> Result<(), StoreError>;

    /// Returns the active credential for a `(tenant, channel)` pair.
    ///
    /// # Errors
    ///
    /// Returns an error only on backend failure.
    async fn get_active(
        &self,
        tenant_id: &TenantId,
        channel: ChannelType,
    ) -> Result<Option<Credential>, StoreError>;
}

/// In-memory credential store.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    rows: Mutex<HashMap<(TenantId, ChannelType), Vec<Credential>>>,
}

impl InMemoryCredentialStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows (active and superseded) for a pair, for tests.
    #[must_use]
    pub fn row_count(&self, tenant_id: &TenantId, channel: ChannelType) -> usize {
        self.rows
            .lock()
            .get(&(tenant_id.clone(), channel))
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn upsert(&self, credential: Credential) -> Result<(), StoreError> {
        let mut rows = self.rows.lock();
        let entry = rows
            .entry((credential.tenant_id.clone(), credential.channel))
            .or_default();
        for existing in entry.iter_mut() {
            existing.active = false;
        }
        debug!(
            tenant_id = %credential.tenant_id,
            channel = %credential.channel,
            custom = credential.custom,
            "Credential stored"
        );
        entry.push(credential);
        Ok(())
    }

    async fn get_active(
        &self,
        tenant_id: &TenantId,
        channel: ChannelType,
    ) -> Result<Option<Credential>, StoreError> {
        let rows = self.rows.lock();
        Ok(rows
            .get(&(tenant_id.clone(), channel))
            .and_then(|entry| {
                entry
                    .iter()
                    .find(|c| c.active && c.deleted_at.is_none())
                    .cloned()
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_credential(tenant: &TenantId, custom: bool) -> Credential {
        let mut secrets = serde_json::Map::new();
        secrets.insert("smtp_host".to_string(), "mail.test".into());
        Credential::new(tenant.clone(), ChannelType::Email, secrets, custom)
    }

    #[tokio::test]
    async fn test_upsert_and_get_active() {
        let store = InMemoryCredentialStore::new();
        let tenant = TenantId::generate();

        store
            .upsert(create_test_credential(&tenant, false))
            .await
            .unwrap();

        let active = store
            .get_active(&tenant, ChannelType::Email)
            .await
            .unwrap()
            .unwrap();
        assert!(active.active);
        assert_eq!(active.secret_str("smtp_host"), Some("mail.test"));
    }

    #[tokio::test]
    async fn test_upsert_supersedes_previous_active() {
        let store = InMemoryCredentialStore::new();
        let tenant = TenantId::generate();

        store
            .upsert(create_test_credential(&tenant, false))
            .await
            .unwrap();
        let replacement = create_test_credential(&tenant, true);
        let replacement_id = replacement.id.clone();
        store.upsert(replacement).await.unwrap();

        // Both rows survive, exactly one is active.
        assert_eq!(store.row_count(&tenant, ChannelType::Email), 2);
        let active = store
            .get_active(&tenant, ChannelType::Email)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.id, replacement_id);
        assert!(active.custom);
    }

    #[tokio::test]
    async fn test_get_active_missing() {
        let store = InMemoryCredentialStore::new();
        let result = store
            .get_active(&TenantId::generate(), ChannelType::Sms)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_tenant_isolation() {
        let store = InMemoryCredentialStore::new();
        let tenant_a = TenantId::generate();
        let tenant_b = TenantId::generate();

        store
            .upsert(create_test_credential(&tenant_a, false))
            .await
            .unwrap();

        assert!(store
            .get_active(&tenant_b, ChannelType::Email)
            .await
            .unwrap()
            .is_none());
    }
}
