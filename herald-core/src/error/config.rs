//! Configuration errors.

use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// File could not be read.
    #[error("failed to read config file {path}: {reason}")]
    FileRead {
        /// File path.
        path: String,
        /// I/O failure description.
        reason: String,
    },

    /// Content could not be parsed in the detected format.
    #[error("invalid config format in {path}: {reason}")]
    InvalidFormat {
        /// File path or `<string>` for inline content.
        path: String,
        /// Parser error description.
        reason: String,
    },

    /// A configuration value fails validation.
    #[error("invalid config value for `{key}`: {reason}")]
    InvalidValue {
        /// Dotted config key.
        key: String,
        /// Why the value is rejected.
        reason: String,
    },

    /// A required key is absent.
    #[error("missing required config key `{key}`")]
    MissingKey {
        /// Dotted config key.
        key: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ConfigError::InvalidValue {
            key: "encryption_key".to_string(),
            reason: "must be 32 bytes of hex".to_string(),
        };
        assert!(err.to_string().contains("encryption_key"));
        assert!(err.to_string().contains("32 bytes"));
    }
}
