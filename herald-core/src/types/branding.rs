//! Tenant visual identity fetched from the identity service.

use serde::{Deserialize, Serialize};

use super::tenant::TenantId;

/// Per-tenant branding embedded into channel-specific content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantBranding {
    /// Display name.
    pub name: String,
    /// Logo URL for the email header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    /// Primary accent colour.
    pub primary_color: String,
    /// Secondary accent colour.
    pub secondary_color: String,
    /// Default from-address for email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_from: Option<String>,
    /// Short company description for email footers.
    #[serde(default)]
    pub about: String,
}

impl TenantBranding {
    /// Fallback branding used when the identity service has no record.
    ///
    /// The name is prefixed with the first eight characters of the tenant id
    /// so rendered output stays distinguishable across tenants.
    #[must_use]
    pub fn fallback(tenant_id: &TenantId) -> Self {
        Self {
            name: format!("Tenant {}", tenant_id.short()),
            logo_url: None,
            primary_color: "#1F6FEB".to_string(),
            secondary_color: "#E8F0FE".to_string(),
            email_from: None,
            about: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_name_uses_tenant_prefix() {
        let tenant = TenantId::new("abcdef01-2345-6789-abcd-ef0123456789");
        let branding = TenantBranding::fallback(&tenant);
        assert_eq!(branding.name, "Tenant abcdef01");
        assert!(branding.logo_url.is_none());
    }

    #[test]
    fn test_branding_serde_roundtrip() {
        let branding = TenantBranding {
            name: "Acme".to_string(),
            logo_url: Some("https://acme.test/logo.png".to_string()),
            primary_color: "#FF0000".to_string(),
            secondary_color: "#FADBD8".to_string(),
            email_from: Some("noreply@acme.test".to_string()),
            about: "Acme Corp".to_string(),
        };
        let json = serde_json::to_string(&branding).unwrap();
        let parsed: TenantBranding = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, branding);
    }
}
