//! Credential cache and priority resolution.
//!
//! Resolution order for a `(tenant, channel)` pair:
//!
//! 1. an active custom credential wins and never falls back;
//! 2. else an active auto-generated credential;
//! 3. else defaults from configuration are synthesised and persisted as a
//!    new auto-generated credential for the tenant.
//!
//! Sensitive fields are encrypted before they reach the store; the cache
//! hands out decrypted in-memory snapshots only.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use herald_core::config::{CacheSettings, DefaultCredentialSettings};
use herald_core::error::CacheError;
use herald_core::types::{ChannelType, TenantId};
use herald_store::{Credential, CredentialStore};

use crate::crypto::Cipher;
use crate::ttl::TtlCache;

/// Secret map fields encrypted at rest, per channel.
#[must_use]
pub fn sensitive_fields(channel: ChannelType) -> &'static [&'static str] {
    match channel {
        ChannelType::Email => &["password"],
        ChannelType::Sms => &["auth_token"],
        ChannelType::Push => &["private_key"],
        ChannelType::InApp => &[],
    }
}

/// Read-through credential cache over the credential store.
pub struct CredentialCache {
    cache: TtlCache<(TenantId, ChannelType), Credential>,
    store: Arc<dyn CredentialStore>,
    cipher: Arc<Cipher>,
    defaults: DefaultCredentialSettings,
}

impl CredentialCache {
    /// Creates a credential cache.
    #[must_use]
    pub fn new(
        settings: &CacheSettings,
        store: Arc<dyn CredentialStore>,
        cipher: Arc<Cipher>,
        defaults: DefaultCredentialSettings,
    ) -> Self {
        Self {
            cache: TtlCache::new(settings.positive_ttl, settings.negative_ttl),
            store,
            cipher,
            defaults,
        }
    }

    /// Creates a cache with explicit TTLs, for tests.
    #[must_use]
    pub fn with_ttls(
        positive_ttl: Duration,
        negative_ttl: Duration,
        store: Arc<dyn CredentialStore>,
        cipher: Arc<Cipher>,
        defaults: DefaultCredentialSettings,
    ) -> Self {
        Self {
            cache: TtlCache::new(positive_ttl, negative_ttl),
            store,
            cipher,
            defaults,
        }
    }

    /// Stores a credential, encrypting its sensitive fields.
    ///
    /// The cache entry for the pair is invalidated so the next resolve
    /// observes the new row.
    ///
    /// # Errors
    ///
    /// Returns an error on encryption or store failure.
    pub async fn put(&self, mut credential: Credential) -> Result<(), CacheError> {
        for field in sensitive_fields(credential.channel) {
            if let Some(value) = credential.secrets.get(*field).and_then(|v| v.as_str()) {
                let encrypted = self.cipher.encrypt_field(value)?;
                credential
                    .secrets
                    .insert((*field).to_string(), encrypted.into());
            }
        }
        let key = (credential.tenant_id.clone(), credential.channel);
        self.store
            .upsert(credential)
            .await
            .map_err(|e| CacheError::Fetch {
                reason: e.to_string(),
            })?;
        self.cache.invalidate(&key);
        Ok(())
    }

    /// Resolves the credential for a `(tenant, channel)` pair.
    ///
    /// Returns an immutable decrypted snapshot.
    ///
    /// # Errors
    ///
    /// Returns `ChannelNotConfigured` when neither a stored credential nor
    /// a configured default exists.
    pub async fn resolve(
        &self,
        tenant_id: &TenantId,
        channel: ChannelType,
    ) -> Result<Arc<Credential>, CacheError> {
        let key = (tenant_id.clone(), channel);
        let result = self
            .cache
            .get_or_fetch(key, || self.fetch(tenant_id.clone(), channel))
            .await?;

        result.ok_or_else(|| CacheError::ChannelNotConfigured {
            tenant_id: tenant_id.clone(),
            channel,
        })
    }

    async fn fetch(
        &self,
        tenant_id: TenantId,
        channel: ChannelType,
    ) -> Result<Option<Credential>, CacheError> {
        let stored = self
            .store
            .get_active(&tenant_id, channel)
            .await
            .map_err(|e| CacheError::Fetch {
                reason: e.to_string(),
            })?;

        if let Some(credential) = stored {
            debug!(%tenant_id, %channel, custom = credential.custom, "Credential resolved from store");
            return self.decrypt(credential).map(Some);
        }

        // First touch for this tenant: synthesise from global defaults and
        // persist as an auto-generated credential.
        let Some(secrets) = self.default_secrets(channel) else {
            return Ok(None);
        };

        info!(%tenant_id, %channel, "Auto-provisioning default credential");
        let mut credential = Credential::new(tenant_id, channel, secrets, false);
        let decrypted = credential.clone();
        for field in sensitive_fields(channel) {
            if let Some(value) = credential.secrets.get(*field).and_then(|v| v.as_str()) {
                let encrypted = self.cipher.encrypt_field(value)?;
                credential
                    .secrets
                    .insert((*field).to_string(), encrypted.into());
            }
        }
        self.store
            .upsert(credential)
            .await
            .map_err(|e| CacheError::Fetch {
                reason: e.to_string(),
            })?;
        Ok(Some(decrypted))
    }

    fn decrypt(&self, mut credential: Credential) -> Result<Credential, CacheError> {
        for field in sensitive_fields(credential.channel) {
            if let Some(value) = credential.secrets.get(*field).and_then(|v| v.as_str()) {
                let plaintext = self.cipher.decrypt_field(value)?;
                credential
                    .secrets
                    .insert((*field).to_string(), plaintext.into());
            }
        }
        Ok(credential)
    }

    fn default_secrets(
        &self,
        channel: ChannelType,
    ) -> Option<serde_json::Map<String, serde_json::Value>> {
        let mut secrets = serde_json::Map::new();
        match channel {
            ChannelType::Email => {
                let email = self.defaults.email.as_ref()?;
                secrets.insert("smtp_host".into(), email.smtp_host.clone().into());
                secrets.insert("smtp_port".into(), email.smtp_port.into());
                secrets.insert("username".into(), email.username.clone().into());
                secrets.insert("password".into(), email.password.clone().into());
                secrets.insert("from_email".into(), email.from_email.clone().into());
                secrets.insert("use_ssl".into(), email.use_ssl.into());
            }
            ChannelType::Sms => {
                let sms = self.defaults.sms.as_ref()?;
                secrets.insert("account_sid".into(), sms.account_sid.clone().into());
                secrets.insert("auth_token".into(), sms.auth_token.clone().into());
                secrets.insert("from_number".into(), sms.from_number.clone().into());
            }
            ChannelType::Push => {
                let push = self.defaults.push.as_ref()?;
                secrets.insert("project_id".into(), push.project_id.clone().into());
                secrets.insert("client_email".into(), push.client_email.clone().into());
                secrets.insert("private_key".into(), push.private_key.clone().into());
            }
            // In-app delivery needs no provider secrets.
            ChannelType::InApp => {}
        }
        Some(secrets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::config::{EmailDefaults, SmsDefaults};
    use herald_store::InMemoryCredentialStore;

    fn test_defaults() -> DefaultCredentialSettings {
        DefaultCredentialSettings {
            email: Some(EmailDefaults {
                smtp_host: "mail.default.test".to_string(),
                smtp_port: 587,
                username: "default".to_string(),
                password: "default-pass".to_string(),
                from_email: "noreply@default.test".to_string(),
                use_ssl: false,
            }),
            sms: Some(SmsDefaults {
                account_sid: "ACdefault".to_string(),
                auth_token: "default-token".to_string(),
                from_number: "+10000000000".to_string(),
            }),
            push: None,
        }
    }

    fn test_cache(store: Arc<InMemoryCredentialStore>) -> CredentialCache {
        CredentialCache::with_ttls(
            Duration::from_secs(300),
            Duration::from_secs(30),
            store,
            Arc::new(Cipher::new([7u8; 32])),
            test_defaults(),
        )
    }

    fn custom_email_credential(tenant: &TenantId) -> Credential {
        let mut secrets = serde_json::Map::new();
        secrets.insert("smtp_host".into(), "mail.custom.test".into());
        secrets.insert("smtp_port".into(), 465.into());
        secrets.insert("username".into(), "custom".into());
        secrets.insert("password".into(), "custom-pass".into());
        secrets.insert("from_email".into(), "hi@custom.test".into());
        Credential::new(tenant.clone(), ChannelType::Email, secrets, true)
    }

    #[tokio::test]
    async fn test_custom_credential_wins() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let cache = test_cache(Arc::clone(&store));
        let tenant = TenantId::generate();

        cache.put(custom_email_credential(&tenant)).await.unwrap();

        let resolved = cache.resolve(&tenant, ChannelType::Email).await.unwrap();
        assert!(resolved.custom);
        assert_eq!(resolved.secret_str("smtp_host"), Some("mail.custom.test"));
        // Decrypted view, not the stored ciphertext.
        assert_eq!(resolved.secret_str("password"), Some("custom-pass"));
    }

    #[tokio::test]
    async fn test_sensitive_fields_encrypted_at_rest() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let cache = test_cache(Arc::clone(&store));
        let tenant = TenantId::generate();

        cache.put(custom_email_credential(&tenant)).await.unwrap();

        let stored = store
            .get_active(&tenant, ChannelType::Email)
            .await
            .unwrap()
            .unwrap();
        let stored_password = stored.secret_str("password").unwrap();
        assert!(stored_password.starts_with("enc:"));
        // Non-sensitive fields stay readable.
        assert_eq!(stored.secret_str("username"), Some("custom"));
    }

    #[tokio::test]
    async fn test_auto_provisioning_from_defaults() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let cache = test_cache(Arc::clone(&store));
        let tenant = TenantId::generate();

        let resolved = cache.resolve(&tenant, ChannelType::Sms).await.unwrap();
        assert!(!resolved.custom);
        assert_eq!(resolved.secret_str("account_sid"), Some("ACdefault"));
        assert_eq!(resolved.secret_str("auth_token"), Some("default-token"));

        // Persisted for subsequent lookups, encrypted at rest.
        let stored = store
            .get_active(&tenant, ChannelType::Sms)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.secret_str("auth_token").unwrap().starts_with("enc:"));
    }

    #[tokio::test]
    async fn test_unconfigured_channel_errors() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let cache = test_cache(store);
        let tenant = TenantId::generate();

        let result = cache.resolve(&tenant, ChannelType::Push).await;
        assert!(matches!(
            result,
            Err(CacheError::ChannelNotConfigured { .. })
        ));
    }

    #[tokio::test]
    async fn test_put_invalidates_cache() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let cache = test_cache(Arc::clone(&store));
        let tenant = TenantId::generate();

        // Prime the cache with the auto-provisioned default.
        let first = cache.resolve(&tenant, ChannelType::Email).await.unwrap();
        assert!(!first.custom);

        cache.put(custom_email_credential(&tenant)).await.unwrap();

        let second = cache.resolve(&tenant, ChannelType::Email).await.unwrap();
        assert!(second.custom);
    }
}
