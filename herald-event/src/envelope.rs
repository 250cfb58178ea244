//! Event envelope validation.

use chrono::DateTime;

use herald_core::error::EventError;
use herald_core::types::{Event, PayloadMap, TenantId};

/// Validates a raw event message into an [`Event`].
///
/// Required fields: `event_type` (a dotted-path string), `tenant_id`
/// (a UUID string), `timestamp` (RFC 3339) and `payload` (an object).
/// `metadata` is optional.
///
/// # Errors
///
/// Returns a non-retriable [`EventError`] describing the first missing or
/// malformed field.
pub fn validate_envelope(raw: &serde_json::Value) -> Result<Event, EventError> {
    let object = raw.as_object().ok_or(EventError::Decode {
        reason: "event message is not a JSON object".to_string(),
    })?;

    let event_type = object
        .get("event_type")
        .ok_or(EventError::MissingField {
            field: "event_type",
        })?
        .as_str()
        .ok_or_else(|| EventError::InvalidField {
            field: "event_type",
            reason: "must be a string".to_string(),
        })?;
    if !event_type.contains('.') {
        return Err(EventError::InvalidField {
            field: "event_type",
            reason: format!("`{event_type}` is not a dotted-path event type"),
        });
    }

    let tenant_raw = object
        .get("tenant_id")
        .ok_or(EventError::MissingField { field: "tenant_id" })?
        .as_str()
        .ok_or_else(|| EventError::InvalidField {
            field: "tenant_id",
            reason: "must be a string".to_string(),
        })?;
    let tenant_id = TenantId::parse(tenant_raw).ok_or_else(|| EventError::InvalidField {
        field: "tenant_id",
        reason: format!("`{tenant_raw}` is not a UUID"),
    })?;

    let timestamp_raw = object
        .get("timestamp")
        .ok_or(EventError::MissingField { field: "timestamp" })?
        .as_str()
        .ok_or_else(|| EventError::InvalidField {
            field: "timestamp",
            reason: "must be a string".to_string(),
        })?;
    let timestamp = DateTime::parse_from_rfc3339(timestamp_raw)
        .map_err(|e| EventError::InvalidField {
            field: "timestamp",
            reason: e.to_string(),
        })?
        .with_timezone(&chrono::Utc);

    let payload: PayloadMap = match object.get("payload") {
        Some(serde_json::Value::Object(map)) => map.clone(),
        Some(_) => {
            return Err(EventError::InvalidField {
                field: "payload",
                reason: "must be an object".to_string(),
            });
        }
        None => return Err(EventError::MissingField { field: "payload" }),
    };

    let metadata: PayloadMap = match object.get("metadata") {
        Some(serde_json::Value::Object(map)) => map.clone(),
        _ => PayloadMap::new(),
    };

    Ok(Event {
        event_type: event_type.to_string(),
        tenant_id,
        timestamp,
        payload,
        metadata,
    })
}
