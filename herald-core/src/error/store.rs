//! Persistence errors.

use thiserror::Error;

use crate::types::DeliveryState;

/// Errors raised by the storage layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Entity not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind.
        entity: &'static str,
        /// Looked-up identifier.
        id: String,
    },

    /// Uniqueness or idempotency conflict.
    #[error("conflict on {entity}: {reason}")]
    Conflict {
        /// Entity kind.
        entity: &'static str,
        /// Conflict description.
        reason: String,
    },

    /// Attempted transition out of a terminal state, or a claim race lost.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: DeliveryState,
        /// Requested state.
        to: DeliveryState,
    },

    /// Backend I/O failure.
    #[error("storage backend error: {reason}")]
    Backend {
        /// Failure description.
        reason: String,
    },
}

impl StoreError {
    /// Backend failures are retriable; logical conflicts are not.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Backend { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = StoreError::InvalidTransition {
            from: DeliveryState::Success,
            to: DeliveryState::Retrying,
        };
        assert_eq!(err.to_string(), "invalid transition from success to retrying");
    }

    #[test]
    fn test_retriability() {
        assert!(StoreError::Backend {
            reason: "io".into()
        }
        .is_retriable());
        assert!(!StoreError::Conflict {
            entity: "credential",
            reason: "dup".into()
        }
        .is_retriable());
    }
}
