//! Push device token registry.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use herald_core::error::StoreError;
use herald_core::types::TenantId;

/// A registered push device token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceToken {
    /// Unique id.
    pub id: String,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Owning user.
    pub user_id: String,
    /// Platform: `android`, `ios` or `web`.
    pub platform: String,
    /// Provider device token.
    pub token: String,
    /// Inactive tokens are skipped during fan-out; the push sender marks a
    /// token inactive when the provider reports it unregistered.
    pub active: bool,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

impl DeviceToken {
    /// Registers a new active token.
    #[must_use]
    pub fn new(
        tenant_id: TenantId,
        user_id: impl Into<String>,
        platform: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id,
            user_id: user_id.into(),
            platform: platform.into(),
            token: token.into(),
            active: true,
            created_at: Utc::now(),
        }
    }
}

/// Storage seam for device tokens.
#[async_trait]
pub trait DeviceTokenStore: Send + Sync {
    /// Registers a token, replacing an existing row with the same token.
    ///
    /// # Errors
    ///
    /// Returns an error only on backend failure.
    async fn register(&self, token: DeviceToken) -> Result<(), StoreError>;

    /// Lists active tokens for a user.
    ///
    /// # Errors
    ///
    /// Returns an error only on backend failure.
    async fn active_for_user(
        &self,
        tenant_id: &TenantId,
        user_id: &str,
    ) -> Result<Vec<DeviceToken>, StoreError>;

    /// Marks a token inactive by its provider token value.
    ///
    /// # Errors
    ///
    /// Returns an error only on backend failure.
    async fn mark_inactive(&self, tenant_id: &TenantId, token: &str) -> Result<(), StoreError>;
}

/// In-memory device token store.
#[derive(Default)]
pub struct InMemoryDeviceTokenStore {
    tokens: Mutex<HashMap<String, DeviceToken>>,
}

impl InMemoryDeviceTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceTokenStore for InMemoryDeviceTokenStore {
    async fn register(&self, token: DeviceToken) -> Result<(), StoreError> {
        debug!(tenant_id = %token.tenant_id, user_id = %token.user_id, "Device token registered");
        self.tokens.lock().insert(token.token.clone(), token);
        Ok(())
    }

    async fn active_for_user(
        &self,
        tenant_id: &TenantId,
        user_id: &str,
    ) -> Result<Vec<DeviceToken>, StoreError> {
        let tokens = self.tokens.lock();
        let mut result: Vec<_> = tokens
            .values()
            .filter(|t| t.tenant_id == *tenant_id && t.user_id == user_id && t.active)
            .cloned()
            .collect();
        result.sort_by_key(|t| t.created_at);
        Ok(result)
    }

    async fn mark_inactive(&self, tenant_id: &TenantId, token: &str) -> Result<(), StoreError> {
        let mut tokens = self.tokens.lock();
        if let Some(row) = tokens.get_mut(token) {
            if row.tenant_id == *tenant_id {
                row.active = false;
                debug!(tenant_id = %tenant_id, "Device token marked inactive");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_list() {
        let store = InMemoryDeviceTokenStore::new();
        let tenant = TenantId::generate();

        store
            .register(DeviceToken::new(tenant.clone(), "u1", "android", "tok-1"))
            .await
            .unwrap();
        store
            .register(DeviceToken::new(tenant.clone(), "u1", "ios", "tok-2"))
            .await
            .unwrap();
        store
            .register(DeviceToken::new(tenant.clone(), "u2", "web", "tok-3"))
            .await
            .unwrap();

        let tokens = store.active_for_user(&tenant, "u1").await.unwrap();
        assert_eq!(tokens.len(), 2);
    }

    #[tokio::test]
    async fn test_mark_inactive_removes_from_fanout() {
        let store = InMemoryDeviceTokenStore::new();
        let tenant = TenantId::generate();

        store
            .register(DeviceToken::new(tenant.clone(), "u1", "android", "tok-1"))
            .await
            .unwrap();
        store.mark_inactive(&tenant, "tok-1").await.unwrap();

        let tokens = store.active_for_user(&tenant, "u1").await.unwrap();
        assert!(tokens.is_empty());
    }

    #[tokio::test]
    async fn test_mark_inactive_other_tenant_ignored() {
        let store = InMemoryDeviceTokenStore::new();
        let tenant = TenantId::generate();

        store
            .register(DeviceToken::new(tenant.clone(), "u1", "android", "tok-1"))
            .await
            .unwrap();
        store
            .mark_inactive(&TenantId::generate(), "tok-1")
            .await
            .unwrap();

        let tokens = store.active_for_user(&tenant, "u1").await.unwrap();
        assert_eq!(tokens.len(), 1);
    }
}
