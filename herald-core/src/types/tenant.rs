//! Tenant identifier type.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier scoping every other entity in the service.
///
/// Backed by a UUID string. No cross-tenant reference may resolve; every
/// store and cache key in the workspace carries a `TenantId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Creates a tenant id from an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a new random tenant id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Parses a tenant id, requiring a valid UUID.
    ///
    /// Event envelopes carry tenant ids from external producers, so the
    /// consumer validates the format before anything else touches it.
    #[must_use]
    pub fn parse(id: &str) -> Option<Self> {
        uuid::Uuid::parse_str(id).ok().map(|_| Self(id.to_string()))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the first eight characters, used for fallback branding names.
    #[must_use]
    pub fn short(&self) -> &str {
        let end = self.0.len().min(8);
        &self.0[..end]
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique() {
        assert_ne!(TenantId::generate(), TenantId::generate());
    }

    #[test]
    fn test_parse_valid_uuid() {
        let id = TenantId::generate();
        assert_eq!(TenantId::parse(id.as_str()), Some(id));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(TenantId::parse("not-a-uuid"), None);
        assert_eq!(TenantId::parse(""), None);
    }

    #[test]
    fn test_short_prefix() {
        let id = TenantId::new("abcdef01-2345-6789-abcd-ef0123456789");
        assert_eq!(id.short(), "abcdef01");
    }
}
