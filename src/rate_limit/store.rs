use crate::clock::{duration_millis, Clock, SystemClock};
use crate::error::StoreError;
use crate::sweeper::{self, Sweep, SweeperHandle};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Abstract storage interface for limiter state.
///
/// The surface mirrors what a Redis-style store offers natively: an atomic
/// increment, a per-key TTL, and plain integer reads and writes. Both limiter
/// algorithms are built from these five calls, so any shared store that
/// provides them can back a multi-instance deployment.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment `key` (absent counts as 0) and return the new value.
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// Set the time-to-live of an existing key. No-op when the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn get_int(&self, key: &str) -> Result<Option<i64>, StoreError>;

    /// Overwrite `key` with `value`, expiring after `ttl`.
    async fn set_int(&self, key: &str, value: i64, ttl: Duration) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: CounterStore + ?Sized> CounterStore for Arc<T> {
    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        (**self).incr(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        (**self).expire(key, ttl).await
    }

    async fn get_int(&self, key: &str) -> Result<Option<i64>, StoreError> {
        (**self).get_int(key).await
    }

    async fn set_int(&self, key: &str, value: i64, ttl: Duration) -> Result<(), StoreError> {
        (**self).set_int(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key).await
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: i64,
    expires_at: Option<u64>,
}

impl Entry {
    fn is_live(&self, now: u64) -> bool {
        !matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// In-process counter store.
///
/// Expiry is evaluated lazily against the injected [`Clock`]: an expired entry
/// reads as absent and is replaced by the next write. Keys that are never
/// touched again are dropped by [`Sweep::purge_expired`], usually from
/// [`InMemoryCounterStore::spawn_sweeper`]. Increments hold the entry's shard
/// lock, so they are atomic per key.
#[derive(Clone, Debug)]
pub struct InMemoryCounterStore {
    data: Arc<DashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock<C: Clock + 'static>(clock: C) -> Self {
        Self { data: Arc::new(DashMap::new()), clock: Arc::new(clock) }
    }

    /// Number of keys held, including ones that expired but were not yet touched.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Purge expired keys every `interval` until the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> SweeperHandle {
        sweeper::spawn_sweeper(self, interval)
    }
}

impl Sweep for InMemoryCounterStore {
    const NAME: &'static str = "counters";

    fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let before = self.data.len();
        self.data.retain(|_, entry| entry.is_live(now));
        before.saturating_sub(self.data.len())
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let now = self.clock.now_millis();
        let mut entry =
            self.data.entry(key.to_string()).or_insert(Entry { value: 0, expires_at: None });
        if !entry.is_live(now) {
            *entry = Entry { value: 0, expires_at: None };
        }
        entry.value = entry.value.saturating_add(1);
        Ok(entry.value)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = self.clock.now_millis();
        if let Some(mut entry) = self.data.get_mut(key) {
            if entry.is_live(now) {
                entry.expires_at = Some(now.saturating_add(duration_millis(ttl)));
            }
        }
        Ok(())
    }

    async fn get_int(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let now = self.clock.now_millis();
        let current = self.data.get(key).map(|entry| *entry);
        match current {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value)),
            Some(_) => {
                self.data.remove_if(key, |_, entry| !entry.is_live(now));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_int(&self, key: &str, value: i64, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = self.clock.now_millis().saturating_add(duration_millis(ttl));
        self.data.insert(key.to_string(), Entry { value, expires_at: Some(expires_at) });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.data.remove(key);
        Ok(())
    }
}
