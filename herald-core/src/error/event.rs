//! Event envelope validation and consumer errors.

use thiserror::Error;

/// Errors raised during event intake.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// A required envelope field is absent.
    #[error("event envelope missing required field `{field}`")]
    MissingField {
        /// Missing field name.
        field: &'static str,
    },

    /// An envelope field is present but malformed.
    #[error("event envelope field `{field}` is invalid: {reason}")]
    InvalidField {
        /// Offending field name.
        field: &'static str,
        /// Why the value is invalid.
        reason: String,
    },

    /// The message body was not valid JSON.
    #[error("event payload is not valid JSON: {reason}")]
    Decode {
        /// Parser error description.
        reason: String,
    },

    /// Handler did not finish within its deadline.
    #[error("handler for `{event_type}` exceeded {seconds}s deadline")]
    HandlerTimeout {
        /// Event type being handled.
        event_type: String,
        /// Deadline in seconds.
        seconds: u64,
    },

    /// Handler failed while building delivery records.
    #[error("handler for `{event_type}` failed: {reason}")]
    Handler {
        /// Event type being handled.
        event_type: String,
        /// Failure description.
        reason: String,
        /// Whether the event log should redeliver.
        retriable: bool,
    },

    /// Event source (log/broker) failure.
    #[error("event source error: {reason}")]
    Source {
        /// Failure description.
        reason: String,
    },

    /// The configured source kind has no implementation.
    #[error("unsupported event source kind: {kind}")]
    UnsupportedSource {
        /// Source kind name.
        kind: String,
    },
}

impl EventError {
    /// Returns true if the event should be left uncommitted for redelivery.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::MissingField { .. }
            | Self::InvalidField { .. }
            | Self::Decode { .. }
            | Self::UnsupportedSource { .. } => false,
            Self::HandlerTimeout { .. } | Self::Source { .. } => true,
            Self::Handler { retriable, .. } => *retriable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_not_retriable() {
        assert!(!EventError::MissingField { field: "tenant_id" }.is_retriable());
        assert!(!EventError::Decode {
            reason: "eof".into()
        }
        .is_retriable());
    }

    #[test]
    fn test_timeout_retriable() {
        let err = EventError::HandlerTimeout {
            event_type: "task.assigned".to_string(),
            seconds: 15,
        };
        assert!(err.is_retriable());
        assert!(err.to_string().contains("15s"));
    }

    #[test]
    fn test_handler_error_carries_retriability() {
        let retriable = EventError::Handler {
            event_type: "x.y".into(),
            reason: "db down".into(),
            retriable: true,
        };
        let permanent = EventError::Handler {
            event_type: "x.y".into(),
            reason: "schema".into(),
            retriable: false,
        };
        assert!(retriable.is_retriable());
        assert!(!permanent.is_retriable());
    }
}
