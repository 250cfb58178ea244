//! TTL cache with per-key single-flight fetch collapse.

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;

struct Entry<V> {
    /// `None` is a cached miss (negative entry).
    value: Option<Arc<V>>,
    inserted_at: Instant,
    ttl: Duration,
}

impl<V> Entry<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) < self.ttl
    }
}

/// Read-through cache with positive and negative TTLs.
///
/// Concurrent demand for the same key collapses to a single upstream fetch
/// through a per-key async lock; late arrivals observe the freshly cached
/// value instead of fetching again.
pub struct TtlCache<K, V> {
    entries: DashMap<K, Entry<V>>,
    flights: DashMap<K, Arc<Mutex<()>>>,
    positive_ttl: Duration,
    negative_ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Creates a cache with the given TTLs.
    #[must_use]
    pub fn new(positive_ttl: Duration, negative_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            flights: DashMap::new(),
            positive_ttl,
            negative_ttl,
        }
    }

    /// Returns the cached state for a key.
    ///
    /// `None` means absent or expired; `Some(None)` is a fresh negative
    /// entry; `Some(Some(v))` is a hit.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<Option<Arc<V>>> {
        let entry = self.entries.get(key)?;
        if entry.is_fresh(Instant::now()) {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    /// Caches a value under the positive TTL.
    pub fn insert(&self, key: K, value: V) -> Arc<V> {
        let value = Arc::new(value);
        self.entries.insert(
            key,
            Entry {
                value: Some(Arc::clone(&value)),
                inserted_at: Instant::now(),
                ttl: self.positive_ttl,
            },
        );
        value
    }

    /// Caches a miss under the negative TTL.
    pub fn insert_negative(&self, key: K) {
        self.entries.insert(
            key,
            Entry {
                value: None,
                inserted_at: Instant::now(),
                ttl: self.negative_ttl,
            },
        );
    }

    /// Drops a key, forcing the next read to fetch.
    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Number of live entries, for tests and diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reads through the cache, collapsing concurrent fetches per key.
    ///
    /// The fetcher returns `Ok(Some(v))` for a hit (cached positively),
    /// `Ok(None)` for a definitive miss (cached negatively), or `Err` for a
    /// transient failure (not cached).
    ///
    /// # Errors
    ///
    /// Propagates the fetcher error.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: K, fetch: F) -> Result<Option<Arc<V>>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<V>, E>>,
    {
        if let Some(cached) = self.get(&key) {
            return Ok(cached);
        }

        let flight = self
            .flights
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = flight.lock().await;

        // Double-check after acquiring the flight lock: another task may
        // have completed the fetch while this one waited.
        if let Some(cached) = self.get(&key) {
            return Ok(cached);
        }

        match fetch().await? {
            Some(value) => Ok(Some(self.insert(key, value))),
            None => {
                self.insert_negative(key);
                Ok(None)
            }
        }
    }
}
