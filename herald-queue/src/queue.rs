//! Delivery queue and worker pool.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use herald_cache::CredentialCache;
use herald_core::config::QueueSettings;
use herald_core::error::{CacheError, QueueError};
use herald_core::types::{ChannelType, DeliveryRecord, FailureReason};
use herald_channel::{ChannelSender, SendOutcome};
use herald_store::{AuditEntry, AuditStore, DeliveryStore};

use crate::backoff::BackoffPolicy;

/// Registry mapping each channel to its sender.
#[derive(Default)]
pub struct SenderRegistry {
    senders: HashMap<ChannelType, Arc<dyn ChannelSender>>,
}

impl SenderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sender under its channel.
    #[must_use]
    pub fn with_sender(mut self, sender: Arc<dyn ChannelSender>) -> Self {
        self.senders.insert(sender.channel(), sender);
        self
    }

    /// Looks up the sender for a channel.
    #[must_use]
    pub fn get(&self, channel: ChannelType) -> Option<&Arc<dyn ChannelSender>> {
        self.senders.get(&channel)
    }
}

/// The delivery queue: accepts records and runs the worker pool.
pub struct DeliveryQueue {
    store: Arc<dyn DeliveryStore>,
    audit: Arc<dyn AuditStore>,
    credentials: Arc<CredentialCache>,
    senders: Arc<SenderRegistry>,
    settings: QueueSettings,
    backoff: BackoffPolicy,
    closed: AtomicBool,
    wakeup: Notify,
    processed: AtomicU64,
}

impl DeliveryQueue {
    /// Creates a queue over its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn DeliveryStore>,
        audit: Arc<dyn AuditStore>,
        credentials: Arc<CredentialCache>,
        senders: Arc<SenderRegistry>,
        settings: QueueSettings,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            store,
            audit,
            credentials,
            senders,
            settings,
            backoff,
            closed: AtomicBool::new(false),
            wakeup: Notify::new(),
            processed: AtomicU64::new(0),
        }
    }

    /// Persists a record and wakes the worker pool.
    ///
    /// A duplicate idempotency key is not an error: the record was already
    /// enqueued by an earlier delivery of the same event.
    ///
    /// # Errors
    ///
    /// Returns `Closed` after shutdown, or a store error.
    pub async fn enqueue(&self, record: DeliveryRecord) -> Result<(), QueueError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(QueueError::Closed);
        }
        match self.store.insert(record).await {
            Ok(()) => {
                self.wakeup.notify_waiters();
                Ok(())
            }
            Err(herald_core::error::StoreError::Conflict { reason, .. }) => {
                debug!(%reason, "Duplicate delivery record skipped");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Total records processed to a transition, for tests and metrics.
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Spawns the worker pool and the lease-reclaim task.
    ///
    /// Workers stop claiming when the shutdown signal fires but finish the
    /// record they are on.
    #[must_use]
    pub fn start(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(self.settings.workers + 1);
        for worker_id in 0..self.settings.workers {
            let queue = Arc::clone(self);
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                queue.worker_loop(worker_id, shutdown).await;
            }));
        }

        let queue = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            queue.reclaim_loop(shutdown).await;
        }));
        handles
    }

    /// Marks the queue closed; `enqueue` rejects from here on.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    async fn worker_loop(&self, worker_id: usize, mut shutdown: watch::Receiver<bool>) {
        debug!(worker_id, "Delivery worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let claimed = match self
                .store
                .claim_due(Utc::now(), self.settings.lease_timeout, 1)
                .await
            {
                Ok(claimed) => claimed,
                Err(e) => {
                    error!(worker_id, error = %e, "Claim failed");
                    Vec::new()
                }
            };

            if claimed.is_empty() {
                tokio::select! {
                    () = self.wakeup.notified() => {}
                    () = tokio::time::sleep(self.settings.poll_interval) => {}
                    _ = shutdown.changed() => {}
                }
                continue;
            }

            for record in claimed {
                self.process(record).await;
            }
        }
        debug!(worker_id, "Delivery worker stopped");
    }

    async fn reclaim_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.settings.lease_timeout / 2;
        loop {
            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {}
            }
            if *shutdown.borrow() {
                break;
            }
            match self.store.reclaim_expired(Utc::now()).await {
                Ok(0) => {}
                Ok(reclaimed) => info!(reclaimed, "Reclaimed stale delivery claims"),
                Err(e) => error!(error = %e, "Lease reclaim failed"),
            }
        }
    }

    async fn process(&self, record: DeliveryRecord) {
        let Some(sender) = self.senders.get(record.channel) else {
            error!(record_id = %record.id, channel = %record.channel, "No sender registered");
            self.apply_failure(
                &record,
                FailureReason::InternalError,
                false,
                Some("no sender registered for channel".to_string()),
            )
            .await;
            return;
        };

        let credentials = match self
            .credentials
            .resolve(&record.tenant_id, record.channel)
            .await
        {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!(record_id = %record.id, error = %e, "Credential resolution failed");
                let (reason, retriable) = match &e {
                    CacheError::Fetch { .. } => (FailureReason::InternalError, true),
                    CacheError::ChannelNotConfigured { .. } => (FailureReason::AuthError, false),
                    CacheError::Crypto { .. } => (FailureReason::AuthError, false),
                };
                self.apply_failure(&record, reason, retriable, Some(e.to_string()))
                    .await;
                return;
            }
        };

        let timeout = self.settings.timeout_for(record.channel);
        let outcome = match tokio::time::timeout(timeout, sender.send(&credentials, &record)).await
        {
            Ok(outcome) => outcome,
            Err(_) => SendOutcome::failure(
                FailureReason::InternalError,
                true,
                format!("send timed out after {}s", timeout.as_secs()),
            ),
        };

        match outcome {
            SendOutcome::Success { provider_response } => {
                match self.store.mark_success(&record.id, provider_response).await {
                    Ok(updated) => {
                        info!(record_id = %record.id, channel = %record.channel, "Delivery succeeded");
                        self.audit(&updated, "sent").await;
                    }
                    Err(e) => error!(record_id = %record.id, error = %e, "Success transition failed"),
                }
                self.processed.fetch_add(1, Ordering::Relaxed);
            }
            SendOutcome::Failure {
                reason,
                retriable,
                provider_response,
            } => {
                self.apply_failure(&record, reason, retriable, provider_response)
                    .await;
                self.processed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    async fn apply_failure(
        &self,
        record: &DeliveryRecord,
        reason: FailureReason,
        retriable: bool,
        provider_response: Option<String>,
    ) {
        let budget_exhausted = record.retry_count >= record.max_retries;
        if !retriable || budget_exhausted {
            match self
                .store
                .mark_failed(&record.id, reason, provider_response)
                .await
            {
                Ok(updated) => {
                    warn!(
                        record_id = %record.id,
                        reason = %reason,
                        retriable,
                        retry_count = updated.retry_count,
                        "Delivery failed terminally"
                    );
                    self.audit(&updated, "failed").await;
                }
                Err(e) => error!(record_id = %record.id, error = %e, "Failure transition failed"),
            }
            return;
        }

        let attempt = record.retry_count + 1;
        let delay = self.backoff.delay_for_attempt(attempt);
        let next_attempt_at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        match self
            .store
            .reschedule(&record.id, reason, provider_response, next_attempt_at)
            .await
        {
            Ok(updated) => {
                info!(
                    record_id = %record.id,
                    reason = %reason,
                    retry_count = updated.retry_count,
                    delay_secs = delay.as_secs(),
                    "Delivery rescheduled"
                );
                self.audit(&updated, "retry").await;
            }
            Err(e) => error!(record_id = %record.id, error = %e, "Reschedule failed"),
        }
    }

    async fn audit(&self, record: &DeliveryRecord, event: &str) {
        let mut details = serde_json::Map::new();
        if let Some(reason) = record.failure_reason {
            details.insert("failure_reason".into(), reason.as_str().into());
        }
        if let Some(response) = &record.provider_response {
            details.insert("provider_response".into(), response.clone().into());
        }
        details.insert("retry_count".into(), record.retry_count.into());

        let entry = AuditEntry::new(
            record.tenant_id.clone(),
            record.id.clone(),
            event,
            details,
        );
        if let Err(e) = self.audit.append(entry).await {
            error!(record_id = %record.id, error = %e, "Audit append failed");
        }
    }
}
