//! Delivery record storage.
//!
//! The store owns the at-most-one-in-flight discipline: a record is claimed
//! by stamping a lease atomically under the store lock, and every state
//! transition validates the current state first. Terminal states are
//! immutable.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};

use herald_core::error::StoreError;
use herald_core::types::{
    ChannelType, DeliveryRecord, DeliveryState, FailureReason, RecordId, TenantId,
};

/// Storage seam for delivery records.
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    /// Inserts a new record.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if a record with the same `dedup_key` already
    /// exists (idempotent event handling).
    async fn insert(&self, record: DeliveryRecord) -> Result<(), StoreError>;

    /// Fetches a record by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the record does not exist.
    async fn get(&self, id: &RecordId) -> Result<DeliveryRecord, StoreError>;

    /// Claims up to `limit` due records, stamping a lease on each.
    ///
    /// A record is due when it is in-flight, not soft-deleted, its
    /// `next_attempt_at` has passed and it carries no unexpired lease.
    ///
    /// # Errors
    ///
    /// Returns an error only on backend failure.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
        limit: usize,
    ) -> Result<Vec<DeliveryRecord>, StoreError>;

    /// Transitions a claimed record to `Success`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the record is already terminal.
    async fn mark_success(
        &self,
        id: &RecordId,
        provider_response: Option<String>,
    ) -> Result<DeliveryRecord, StoreError>;

    /// Transitions a claimed record to `Failed`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the record is already terminal.
    async fn mark_failed(
        &self,
        id: &RecordId,
        reason: FailureReason,
        provider_response: Option<String>,
    ) -> Result<DeliveryRecord, StoreError>;

    /// Transitions a claimed record to `Retrying` with an incremented
    /// retry count and a new due time.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the record is already terminal.
    async fn reschedule(
        &self,
        id: &RecordId,
        reason: FailureReason,
        provider_response: Option<String>,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<DeliveryRecord, StoreError>;

    /// Reverts records with expired leases to `Retrying`, counting the
    /// interrupted attempt. Returns the number of reclaimed records.
    ///
    /// # Errors
    ///
    /// Returns an error only on backend failure.
    async fn reclaim_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Lists records for a tenant in a given state.
    ///
    /// # Errors
    ///
    /// Returns an error only on backend failure.
    async fn list_by_state(
        &self,
        tenant_id: &TenantId,
        state: DeliveryState,
    ) -> Result<Vec<DeliveryRecord>, StoreError>;

    /// Counts unread in-app records for a recipient.
    ///
    /// # Errors
    ///
    /// Returns an error only on backend failure.
    async fn count_unread_inapp(
        &self,
        tenant_id: &TenantId,
        recipient: &str,
    ) -> Result<usize, StoreError>;

    /// Marks an in-app record as read by its recipient.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the record does not exist in the tenant.
    async fn mark_read(&self, tenant_id: &TenantId, id: &RecordId) -> Result<(), StoreError>;

    /// Soft-deletes a record. Records are never physically removed.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the record does not exist.
    async fn soft_delete(&self, id: &RecordId) -> Result<(), StoreError>;
}

#[derive(Default)]
struct DeliveryInner {
    records: HashMap<RecordId, DeliveryRecord>,
    dedup_keys: HashMap<String, RecordId>,
}

/// In-memory delivery store.
#[derive(Default)]
pub struct InMemoryDeliveryStore {
    inner: Mutex<DeliveryInner>,
}

impl InMemoryDeliveryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records, for tests and diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Returns true if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().records.is_empty()
    }

    fn transition(
        inner: &mut DeliveryInner,
        id: &RecordId,
        to: DeliveryState,
        apply: impl FnOnce(&mut DeliveryRecord),
    ) -> Result<DeliveryRecord, StoreError> {
        let record = inner
            .records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "delivery_record",
                id: id.to_string(),
            })?;

        if record.state.is_terminal() {
            return Err(StoreError::InvalidTransition {
                from: record.state,
                to,
            });
        }

        record.state = to;
        record.lease_expires_at = None;
        apply(record);
        Ok(record.clone())
    }
}

#[async_trait]
impl DeliveryStore for InMemoryDeliveryStore {
    async fn insert(&self, record: DeliveryRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if let Some(key) = &record.dedup_key {
            if inner.dedup_keys.contains_key(key) {
                return Err(StoreError::Conflict {
                    entity: "delivery_record",
                    reason: format!("duplicate dedup key {key}"),
                });
            }
            inner.dedup_keys.insert(key.clone(), record.id.clone());
        }
        debug!(record_id = %record.id, channel = %record.channel, "Delivery record inserted");
        inner.records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get(&self, id: &RecordId) -> Result<DeliveryRecord, StoreError> {
        self.inner
            .lock()
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                entity: "delivery_record",
                id: id.to_string(),
            })
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
        limit: usize,
    ) -> Result<Vec<DeliveryRecord>, StoreError> {
        let mut inner = self.inner.lock();
        let lease_until =
            now + chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::zero());

        let mut claimed = Vec::new();
        for record in inner.records.values_mut() {
            if claimed.len() >= limit {
                break;
            }
            let leased = record.lease_expires_at.is_some_and(|at| at > now);
            if record.is_due(now) && !leased {
                record.lease_expires_at = Some(lease_until);
                claimed.push(record.clone());
            }
        }
        claimed.sort_by_key(|r| r.next_attempt_at);
        Ok(claimed)
    }

    async fn mark_success(
        &self,
        id: &RecordId,
        provider_response: Option<String>,
    ) -> Result<DeliveryRecord, StoreError> {
        let mut inner = self.inner.lock();
        Self::transition(&mut inner, id, DeliveryState::Success, |record| {
            record.sent_at = Some(Utc::now());
            record.failure_reason = None;
            record.provider_response = provider_response;
        })
    }

    async fn mark_failed(
        &self,
        id: &RecordId,
        reason: FailureReason,
        provider_response: Option<String>,
    ) -> Result<DeliveryRecord, StoreError> {
        let mut inner = self.inner.lock();
        Self::transition(&mut inner, id, DeliveryState::Failed, |record| {
            record.failure_reason = Some(reason);
            record.provider_response = provider_response;
        })
    }

    async fn reschedule(
        &self,
        id: &RecordId,
        reason: FailureReason,
        provider_response: Option<String>,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<DeliveryRecord, StoreError> {
        let mut inner = self.inner.lock();
        Self::transition(&mut inner, id, DeliveryState::Retrying, |record| {
            record.retry_count += 1;
            record.failure_reason = Some(reason);
            record.provider_response = provider_response;
            record.next_attempt_at = next_attempt_at;
        })
    }

    async fn reclaim_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock();
        let mut reclaimed = 0;
        for record in inner.records.values_mut() {
            let expired = record.lease_expires_at.is_some_and(|at| at <= now);
            if expired && record.state.is_in_flight() {
                // The interrupted attempt counts, and the record always
                // returns to retrying; an exhausted budget terminates on
                // the next worker attempt, not here.
                record.lease_expires_at = None;
                record.retry_count += 1;
                record.state = DeliveryState::Retrying;
                warn!(record_id = %record.id, retry_count = record.retry_count, "Stale claim reclaimed");
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }

    async fn list_by_state(
        &self,
        tenant_id: &TenantId,
        state: DeliveryState,
    ) -> Result<Vec<DeliveryRecord>, StoreError> {
        let inner = self.inner.lock();
        let mut records: Vec<_> = inner
            .records
            .values()
            .filter(|r| r.tenant_id == *tenant_id && r.state == state && r.deleted_at.is_none())
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn count_unread_inapp(
        &self,
        tenant_id: &TenantId,
        recipient: &str,
    ) -> Result<usize, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .records
            .values()
            .filter(|r| {
                r.tenant_id == *tenant_id
                    && r.channel == ChannelType::InApp
                    && r.recipient == recipient
                    && r.read_at.is_none()
                    && r.deleted_at.is_none()
            })
            .count())
    }

    async fn mark_read(&self, tenant_id: &TenantId, id: &RecordId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let record = inner
            .records
            .get_mut(id)
            .filter(|r| r.tenant_id == *tenant_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "delivery_record",
                id: id.to_string(),
            })?;
        record.read_at = Some(Utc::now());
        Ok(())
    }

    async fn soft_delete(&self, id: &RecordId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let record = inner
            .records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "delivery_record",
                id: id.to_string(),
            })?;
        record.deleted_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::types::{PayloadMap, RenderedContent};

    fn create_test_record(tenant: &TenantId, channel: ChannelType) -> DeliveryRecord {
        DeliveryRecord::new(
            tenant.clone(),
            channel,
            "a@b.test",
            RenderedContent::body("hello"),
            PayloadMap::new(),
        )
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = InMemoryDeliveryStore::new();
        let record = create_test_record(&TenantId::generate(), ChannelType::Email);
        let id = record.id.clone();

        store.insert(record).await.unwrap();
        let fetched = store.get(&id).await.unwrap();
        assert_eq!(fetched.state, DeliveryState::Pending);
    }

    #[tokio::test]
    async fn test_insert_duplicate_dedup_key() {
        let store = InMemoryDeliveryStore::new();
        let tenant = TenantId::generate();

        let first = create_test_record(&tenant, ChannelType::Email).with_dedup_key("k");
        let second = create_test_record(&tenant, ChannelType::Email).with_dedup_key("k");

        store.insert(first).await.unwrap();
        let result = store.insert(second).await;
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_claim_stamps_lease_once() {
        let store = InMemoryDeliveryStore::new();
        let record = create_test_record(&TenantId::generate(), ChannelType::Sms);
        store.insert(record).await.unwrap();

        let now = Utc::now();
        let first = store
            .claim_due(now, Duration::from_secs(120), 10)
            .await
            .unwrap();
        assert_eq!(first.len(), 1);

        // The lease blocks a second claim.
        let second = store
            .claim_due(now, Duration::from_secs(120), 10)
            .await
            .unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_mark_success_is_terminal() {
        let store = InMemoryDeliveryStore::new();
        let record = create_test_record(&TenantId::generate(), ChannelType::Email);
        let id = record.id.clone();
        store.insert(record).await.unwrap();

        let updated = store.mark_success(&id, Some("250 OK".into())).await.unwrap();
        assert_eq!(updated.state, DeliveryState::Success);
        assert!(updated.sent_at.is_some());

        // Terminal states never change.
        let result = store
            .mark_failed(&id, FailureReason::NetworkError, None)
            .await;
        assert!(matches!(result, Err(StoreError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_reschedule_increments_retry_count() {
        let store = InMemoryDeliveryStore::new();
        let record = create_test_record(&TenantId::generate(), ChannelType::Sms);
        let id = record.id.clone();
        store.insert(record).await.unwrap();

        let due = Utc::now() + chrono::Duration::seconds(60);
        let updated = store
            .reschedule(&id, FailureReason::ProviderError, None, due)
            .await
            .unwrap();
        assert_eq!(updated.state, DeliveryState::Retrying);
        assert_eq!(updated.retry_count, 1);
        assert_eq!(updated.next_attempt_at, due);
        assert!(updated.lease_expires_at.is_none());
    }

    #[tokio::test]
    async fn test_rescheduled_record_not_due_until_backoff() {
        let store = InMemoryDeliveryStore::new();
        let record = create_test_record(&TenantId::generate(), ChannelType::Sms);
        let id = record.id.clone();
        store.insert(record).await.unwrap();

        let now = Utc::now();
        store
            .claim_due(now, Duration::from_secs(120), 10)
            .await
            .unwrap();
        store
            .reschedule(
                &id,
                FailureReason::ProviderError,
                None,
                now + chrono::Duration::seconds(60),
            )
            .await
            .unwrap();

        let claimed = store
            .claim_due(now, Duration::from_secs(120), 10)
            .await
            .unwrap();
        assert!(claimed.is_empty());

        let claimed = store
            .claim_due(
                now + chrono::Duration::seconds(61),
                Duration::from_secs(120),
                10,
            )
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);
    }

    #[tokio::test]
    async fn test_reclaim_expired_lease() {
        let store = InMemoryDeliveryStore::new();
        let record = create_test_record(&TenantId::generate(), ChannelType::Email);
        let id = record.id.clone();
        store.insert(record).await.unwrap();

        let now = Utc::now();
        store
            .claim_due(now, Duration::from_secs(120), 10)
            .await
            .unwrap();

        // Nothing to reclaim while the lease is fresh.
        assert_eq!(store.reclaim_expired(now).await.unwrap(), 0);

        let later = now + chrono::Duration::seconds(121);
        assert_eq!(store.reclaim_expired(later).await.unwrap(), 1);

        let record = store.get(&id).await.unwrap();
        assert_eq!(record.state, DeliveryState::Retrying);
        assert_eq!(record.retry_count, 1);
    }

    #[tokio::test]
    async fn test_reclaim_returns_to_retrying_even_at_budget() {
        let store = InMemoryDeliveryStore::new();
        let record =
            create_test_record(&TenantId::generate(), ChannelType::Email).with_max_retries(1);
        let id = record.id.clone();
        store.insert(record).await.unwrap();

        let now = Utc::now();
        store
            .claim_due(now, Duration::from_secs(1), 10)
            .await
            .unwrap();
        store
            .reclaim_expired(now + chrono::Duration::seconds(2))
            .await
            .unwrap();

        // Reclaim never terminates a record; exhausting the budget is the
        // worker's decision on the next attempt.
        let record = store.get(&id).await.unwrap();
        assert_eq!(record.state, DeliveryState::Retrying);
        assert_eq!(record.retry_count, 1);
        assert!(record.lease_expires_at.is_none());
        assert!(record.is_due(now + chrono::Duration::seconds(3)));
    }

    #[tokio::test]
    async fn test_unread_count_and_mark_read() {
        let store = InMemoryDeliveryStore::new();
        let tenant = TenantId::generate();

        let mut record = create_test_record(&tenant, ChannelType::InApp);
        record.recipient = "user-1".to_string();
        let id = record.id.clone();
        store.insert(record).await.unwrap();

        assert_eq!(store.count_unread_inapp(&tenant, "user-1").await.unwrap(), 1);
        store.mark_read(&tenant, &id).await.unwrap();
        assert_eq!(store.count_unread_inapp(&tenant, "user-1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_read_wrong_tenant() {
        let store = InMemoryDeliveryStore::new();
        let record = create_test_record(&TenantId::generate(), ChannelType::InApp);
        let id = record.id.clone();
        store.insert(record).await.unwrap();

        let result = store.mark_read(&TenantId::generate(), &id).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_soft_delete_hides_from_claim() {
        let store = InMemoryDeliveryStore::new();
        let record = create_test_record(&TenantId::generate(), ChannelType::Email);
        let id = record.id.clone();
        store.insert(record).await.unwrap();

        store.soft_delete(&id).await.unwrap();
        let claimed = store
            .claim_due(Utc::now(), Duration::from_secs(120), 10)
            .await
            .unwrap();
        assert!(claimed.is_empty());
        // Still present for audit.
        assert_eq!(store.len(), 1);
    }
}
