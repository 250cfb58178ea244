//! Access-token validation for WebSocket connections.

use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// Claims carried by an access token issued by the identity service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user id).
    pub sub: String,
    /// Tenant the token is scoped to.
    pub tenant_id: String,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// Issued at (Unix timestamp).
    pub iat: i64,
}

/// Token validator for the hub.
#[derive(Clone)]
pub struct HubAuth {
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
}

impl std::fmt::Debug for HubAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubAuth").finish_non_exhaustive()
    }
}

impl HubAuth {
    /// Creates a validator over a shared secret.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Validates a token and returns its claims.
    ///
    /// # Errors
    ///
    /// Returns an error for a missing signature match, malformed token or
    /// expired claims.
    pub fn validate(&self, token: &str) -> Result<AccessClaims, jsonwebtoken::errors::Error> {
        let data = decode::<AccessClaims>(token, &self.decoding_key, &Validation::default())?;
        Ok(data.claims)
    }

    /// Issues a token for a user in a tenant, valid for one hour.
    ///
    /// Production tokens come from the identity service; this is used by
    /// tests and local tooling.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn issue(
        &self,
        user_id: &str,
        tenant_id: &str,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: user_id.to_string(),
            tenant_id: tenant_id.to_string(),
            exp: now + 3600,
            iat: now,
        };
        encode(&Header::default(), &claims, &self.encoding_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_validate() {
        let auth = HubAuth::new("test-secret");
        let token = auth.issue("user-1", "tenant-1").unwrap();
        let claims = auth.validate(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.tenant_id, "tenant-1");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let auth = HubAuth::new("secret-a");
        let token = auth.issue("user-1", "tenant-1").unwrap();
        let other = HubAuth::new("secret-b");
        assert!(other.validate(&token).is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        let auth = HubAuth::new("test-secret");
        assert!(auth.validate("not.a.token").is_err());
        assert!(auth.validate("").is_err());
    }
}
