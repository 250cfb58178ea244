//! Delivery queue errors.

use thiserror::Error;

use super::store::StoreError;

/// Errors raised by the delivery queue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The queue has been shut down and accepts no further records.
    #[error("delivery queue is closed")]
    Closed,

    /// Underlying store failure.
    #[error("{0}")]
    Store(#[from] StoreError),
}

impl QueueError {
    /// Returns true if retrying may succeed.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Closed => false,
            Self::Store(e) => e.is_retriable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_not_retriable() {
        assert!(!QueueError::Closed.is_retriable());
    }

    #[test]
    fn test_store_error_wraps() {
        let err: QueueError = StoreError::Backend {
            reason: "io".to_string(),
        }
        .into();
        assert!(err.is_retriable());
    }
}
