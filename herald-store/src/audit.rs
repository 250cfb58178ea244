//! Audit trail of delivery transitions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use herald_core::error::StoreError;
use herald_core::types::{RecordId, TenantId};

/// One audit row: a delivery transition observed by the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique id.
    pub id: String,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Related delivery record.
    pub record_id: RecordId,
    /// Event name: `sent`, `failed`, `retry`.
    pub event: String,
    /// Structured detail.
    #[serde(default)]
    pub details: serde_json::Map<String, serde_json::Value>,
    /// Observation time.
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// Creates an audit entry stamped now.
    #[must_use]
    pub fn new(
        tenant_id: TenantId,
        record_id: RecordId,
        event: impl Into<String>,
        details: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id,
            record_id,
            event: event.into(),
            details,
            timestamp: Utc::now(),
        }
    }
}

/// Storage seam for audit entries.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Appends an entry.
    ///
    /// # Errors
    ///
    /// Returns an error only on backend failure.
    async fn append(&self, entry: AuditEntry) -> Result<(), StoreError>;

    /// Lists entries for a record, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error only on backend failure.
    async fn for_record(&self, record_id: &RecordId) -> Result<Vec<AuditEntry>, StoreError>;
}

/// In-memory audit store.
#[derive(Default)]
pub struct InMemoryAuditStore {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if no entries have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, entry: AuditEntry) -> Result<(), StoreError> {
        self.entries.lock().push(entry);
        Ok(())
    }

    async fn for_record(&self, record_id: &RecordId) -> Result<Vec<AuditEntry>, StoreError> {
        let entries = self.entries.lock();
        let mut result: Vec<_> = entries
            .iter()
            .filter(|e| e.record_id == *record_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_and_list() {
        let store = InMemoryAuditStore::new();
        let tenant = TenantId::generate();
        let record_id = RecordId::generate();

        store
            .append(AuditEntry::new(
                tenant.clone(),
                record_id.clone(),
                "retry",
                serde_json::Map::new(),
            ))
            .await
            .unwrap();
        store
            .append(AuditEntry::new(
                tenant,
                record_id.clone(),
                "sent",
                serde_json::Map::new(),
            ))
            .await
            .unwrap();

        let entries = store.for_record(&record_id).await.unwrap();
        assert_eq!(entries.len(), 2);
        let events: Vec<_> = entries.iter().map(|e| e.event.as_str()).collect();
        assert!(events.contains(&"retry"));
        assert!(events.contains(&"sent"));
    }

    #[tokio::test]
    async fn test_unrelated_record_filtered() {
        let store = InMemoryAuditStore::new();
        store
            .append(AuditEntry::new(
                TenantId::generate(),
                RecordId::generate(),
                "sent",
                serde_json::Map::new(),
            ))
            .await
            .unwrap();

        let entries = store.for_record(&RecordId::generate()).await.unwrap();
        assert!(entries.is_empty());
    }
}
