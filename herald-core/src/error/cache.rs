//! Credential and branding cache errors.

use thiserror::Error;

use crate::types::{ChannelType, TenantId};

/// Errors raised by the credential/branding cache.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// No credential configured for the tenant/channel and no default exists.
    #[error("channel {channel} not configured for tenant {tenant_id} and no defaults available")]
    ChannelNotConfigured {
        /// Tenant.
        tenant_id: TenantId,
        /// Channel.
        channel: ChannelType,
    },

    /// Upstream fetch failure (database or identity service).
    #[error("cache fetch failed: {reason}")]
    Fetch {
        /// Failure description.
        reason: String,
    },

    /// Encryption or decryption failure at the secret boundary.
    #[error("crypto error: {reason}")]
    Crypto {
        /// Failure description.
        reason: String,
    },
}

impl CacheError {
    /// Upstream fetch failures are retriable; missing configuration is not.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Fetch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_tenant_and_channel() {
        let err = CacheError::ChannelNotConfigured {
            tenant_id: TenantId::new("t-1"),
            channel: ChannelType::Sms,
        };
        let msg = err.to_string();
        assert!(msg.contains("t-1"));
        assert!(msg.contains("sms"));
    }

    #[test]
    fn test_retriability() {
        assert!(CacheError::Fetch {
            reason: "timeout".into()
        }
        .is_retriable());
        assert!(!CacheError::Crypto {
            reason: "bad key".into()
        }
        .is_retriable());
    }
}
