//! Tenant branding cache backed by the identity service.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use herald_core::config::{CacheSettings, IdentitySettings};
use herald_core::error::CacheError;
use herald_core::types::{TenantBranding, TenantId};

use crate::ttl::TtlCache;

/// Upstream source of tenant branding.
#[async_trait]
pub trait BrandingProvider: Send + Sync {
    /// Fetches branding for a tenant.
    ///
    /// `Ok(None)` means the identity service has no record (a 404), which
    /// the cache stores as a negative entry.
    ///
    /// # Errors
    ///
    /// Returns an error for transport failures; those are not cached.
    async fn fetch(&self, tenant_id: &TenantId) -> Result<Option<TenantBranding>, CacheError>;
}

/// Identity-service wire shape for a tenant record.
#[derive(Debug, Deserialize)]
struct TenantDetails {
    name: Option<String>,
    logo: Option<String>,
    primary_color: Option<String>,
    secondary_color: Option<String>,
    default_from_email: Option<String>,
    #[serde(default)]
    about_us: String,
}

/// HTTP client for `GET /api/tenants/{id}/` on the identity service.
pub struct HttpIdentityClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpIdentityClient {
    /// Creates a client from identity settings.
    #[must_use]
    pub fn new(settings: &IdentitySettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl BrandingProvider for HttpIdentityClient {
    async fn fetch(&self, tenant_id: &TenantId) -> Result<Option<TenantBranding>, CacheError> {
        let url = format!("{}/api/tenants/{}/", self.base_url, tenant_id);
        debug!(%tenant_id, "Fetching tenant branding");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CacheError::Fetch {
                reason: e.to_string(),
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(CacheError::Fetch {
                reason: format!("identity service returned {}", response.status()),
            });
        }

        let details: TenantDetails = response.json().await.map_err(|e| CacheError::Fetch {
            reason: e.to_string(),
        })?;

        let fallback = TenantBranding::fallback(tenant_id);
        Ok(Some(TenantBranding {
            name: details.name.unwrap_or(fallback.name),
            logo_url: details.logo,
            primary_color: details.primary_color.unwrap_or(fallback.primary_color),
            secondary_color: details.secondary_color.unwrap_or(fallback.secondary_color),
            email_from: details.default_from_email,
            about: details.about_us,
        }))
    }
}

/// Static branding provider for tests and local runs.
#[derive(Default)]
pub struct StaticBrandingProvider {
    brandings: HashMap<String, TenantBranding>,
}

impl StaticBrandingProvider {
    /// Creates an empty provider: every tenant resolves to a 404.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers branding for a tenant.
    #[must_use]
    pub fn with_branding(mut self, tenant_id: &TenantId, branding: TenantBranding) -> Self {
        self.brandings.insert(tenant_id.to_string(), branding);
        self
    }
}

#[async_trait]
impl BrandingProvider for StaticBrandingProvider {
    async fn fetch(&self, tenant_id: &TenantId) -> Result<Option<TenantBranding>, CacheError> {
        Ok(self.brandings.get(tenant_id.as_str()).cloned())
    }
}

/// Read-through branding cache.
///
/// Lookups always yield a branding: a 404 from the identity service caches
/// a negative entry for the negative TTL and resolves to the tenant-id
/// fallback, and transport failures resolve to the fallback without
/// caching.
pub struct BrandingCache {
    cache: TtlCache<TenantId, TenantBranding>,
    provider: Arc<dyn BrandingProvider>,
}

impl BrandingCache {
    /// Creates a branding cache over a provider.
    #[must_use]
    pub fn new(settings: &CacheSettings, provider: Arc<dyn BrandingProvider>) -> Self {
        Self {
            cache: TtlCache::new(settings.positive_ttl, settings.negative_ttl),
            provider,
        }
    }

    /// Creates a cache with explicit TTLs, for tests.
    #[must_use]
    pub fn with_ttls(
        positive_ttl: Duration,
        negative_ttl: Duration,
        provider: Arc<dyn BrandingProvider>,
    ) -> Self {
        Self {
            cache: TtlCache::new(positive_ttl, negative_ttl),
            provider,
        }
    }

    /// Resolves branding for a tenant, falling back to the tenant-id
    /// default when none exists.
    pub async fn get(&self, tenant_id: &TenantId) -> TenantBranding {
        let provider = Arc::clone(&self.provider);
        let result = self
            .cache
            .get_or_fetch(tenant_id.clone(), || {
                let tenant_id = tenant_id.clone();
                async move { provider.fetch(&tenant_id).await }
            })
            .await;

        match result {
            Ok(Some(branding)) => (*branding).clone(),
            Ok(None) => TenantBranding::fallback(tenant_id),
            Err(e) => {
                warn!(%tenant_id, error = %e, "Branding fetch failed, using fallback");
                TenantBranding::fallback(tenant_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        branding: Option<TenantBranding>,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl BrandingProvider for CountingProvider {
        async fn fetch(&self, _tenant_id: &TenantId) -> Result<Option<TenantBranding>, CacheError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.branding.clone())
        }
    }

    fn acme_branding() -> TenantBranding {
        TenantBranding {
            name: "Acme".to_string(),
            logo_url: None,
            primary_color: "#FF0000".to_string(),
            secondary_color: "#FADBD8".to_string(),
            email_from: Some("noreply@acme.test".to_string()),
            about: String::new(),
        }
    }

    #[tokio::test]
    async fn test_hit_is_cached() {
        let provider = Arc::new(CountingProvider {
            branding: Some(acme_branding()),
            fetches: AtomicUsize::new(0),
        });
        let cache = BrandingCache::with_ttls(
            Duration::from_secs(300),
            Duration::from_secs(30),
            Arc::clone(&provider) as Arc<dyn BrandingProvider>,
        );
        let tenant = TenantId::generate();

        assert_eq!(cache.get(&tenant).await.name, "Acme");
        assert_eq!(cache.get(&tenant).await.name, "Acme");
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_miss_negative_cached_and_falls_back() {
        let provider = Arc::new(CountingProvider {
            branding: None,
            fetches: AtomicUsize::new(0),
        });
        let cache = BrandingCache::with_ttls(
            Duration::from_secs(300),
            Duration::from_secs(30),
            Arc::clone(&provider) as Arc<dyn BrandingProvider>,
        );
        let tenant = TenantId::new("abcdef01-2345-6789-abcd-ef0123456789");

        let branding = cache.get(&tenant).await;
        assert_eq!(branding.name, "Tenant abcdef01");
        cache.get(&tenant).await;
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_static_provider() {
        let tenant = TenantId::generate();
        let provider = StaticBrandingProvider::new().with_branding(&tenant, acme_branding());
        assert!(provider.fetch(&tenant).await.unwrap().is_some());
        assert!(provider.fetch(&TenantId::generate()).await.unwrap().is_none());
    }
}
