//! Channel sender construction errors.
//!
//! Send-time failures never surface as `Err` across the sender boundary;
//! they are returned as structured outcomes carrying a failure
//! classification. This enum covers the cases where a sender cannot be
//! built at all.

use thiserror::Error;

use crate::types::ChannelType;

/// Errors raised while constructing a channel sender.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// A required credential field is missing.
    #[error("missing credential field `{field}` for {channel} sender")]
    MissingCredential {
        /// Channel being constructed.
        channel: ChannelType,
        /// Missing field name.
        field: &'static str,
    },

    /// A credential field has an unusable value.
    #[error("invalid credential field `{field}` for {channel} sender: {reason}")]
    InvalidCredential {
        /// Channel being constructed.
        channel: ChannelType,
        /// Offending field name.
        field: &'static str,
        /// Why the value is unusable.
        reason: String,
    },

    /// Transport construction failed.
    #[error("failed to build {channel} transport: {reason}")]
    Transport {
        /// Channel being constructed.
        channel: ChannelType,
        /// Failure description.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ChannelError::MissingCredential {
            channel: ChannelType::Email,
            field: "smtp_host",
        };
        assert_eq!(
            err.to_string(),
            "missing credential field `smtp_host` for email sender"
        );
    }
}
