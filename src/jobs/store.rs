use super::Job;
use crate::clock::{duration_millis, Clock, SystemClock};
use crate::error::StoreError;
use crate::sweeper::{self, Sweep, SweeperHandle};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Key prefix for job records in shared stores.
pub const JOB_KEY_PREFIX: &str = "chat_job:";

/// Lifetime of a job record after its last write.
pub const DEFAULT_JOB_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub fn job_key(job_id: &str) -> String {
    format!("{JOB_KEY_PREFIX}{job_id}")
}

/// Serialized form used by remote stores.
pub fn encode_job(job: &Job) -> Result<String, StoreError> {
    Ok(serde_json::to_string(job)?)
}

pub fn decode_job(raw: &str) -> Result<Job, StoreError> {
    Ok(serde_json::from_str(raw)?)
}

/// Keyed job records with expiry.
///
/// Every `put` is a full replace that restarts the TTL. There is no
/// compare-and-set: the pipeline relies on only the claiming worker writing
/// past `PENDING`.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn put(&self, job: &Job, ttl: Duration) -> Result<(), StoreError>;

    /// `None` for unknown or expired ids.
    async fn get(&self, job_id: &str) -> Result<Option<Job>, StoreError>;

    async fn delete(&self, job_id: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: JobStore + ?Sized> JobStore for Arc<T> {
    async fn put(&self, job: &Job, ttl: Duration) -> Result<(), StoreError> {
        (**self).put(job, ttl).await
    }

    async fn get(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        (**self).get(job_id).await
    }

    async fn delete(&self, job_id: &str) -> Result<(), StoreError> {
        (**self).delete(job_id).await
    }
}

#[derive(Debug, Clone)]
struct Stored {
    job: Job,
    expires_at: u64,
}

/// In-process job store for single-instance deployments and tests.
#[derive(Clone, Debug)]
pub struct InMemoryJobStore {
    records: Arc<DashMap<String, Stored>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock<C: Clock + 'static>(clock: C) -> Self {
        Self { records: Arc::new(DashMap::new()), clock: Arc::new(clock) }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Purge expired records every `interval` until the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> SweeperHandle {
        sweeper::spawn_sweeper(self, interval)
    }
}

impl Sweep for InMemoryJobStore {
    const NAME: &'static str = "jobs";

    fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let before = self.records.len();
        self.records.retain(|_, stored| stored.expires_at > now);
        before.saturating_sub(self.records.len())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn put(&self, job: &Job, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = self.clock.now_millis().saturating_add(duration_millis(ttl));
        self.records.insert(job_key(&job.id), Stored { job: job.clone(), expires_at });
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        let key = job_key(job_id);
        let now = self.clock.now_millis();
        let found = self.records.get(&key).map(|stored| stored.clone());
        match found {
            Some(stored) if stored.expires_at > now => Ok(Some(stored.job)),
            Some(_) => {
                self.records.remove_if(&key, |_, stored| stored.expires_at <= now);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, job_id: &str) -> Result<(), StoreError> {
        self.records.remove(&job_key(job_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatRequest;
    use crate::clock::ManualClock;
    use crate::jobs::JobStatus;

    fn job(id: &str) -> Job {
        Job::new_pending(id, "alice", "session-1", ChatRequest::new("hello"), 0)
    }

    #[tokio::test]
    async fn writes_refresh_the_ttl() {
        let clock = ManualClock::new(0);
        let store = InMemoryJobStore::with_clock(clock.clone());
        let ttl = Duration::from_secs(10);
        let mut record = job("j1");

        store.put(&record, ttl).await.unwrap();
        clock.advance(Duration::from_secs(9));
        record.mark_processing(9_000).unwrap();
        store.put(&record, ttl).await.unwrap();

        clock.advance(Duration::from_secs(9));
        let fetched = store.get("j1").await.unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Processing);

        clock.advance(Duration::from_secs(1));
        assert!(store.get("j1").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn delete_and_unknown_ids() {
        let store = InMemoryJobStore::new();
        store.put(&job("j1"), DEFAULT_JOB_TTL).await.unwrap();
        store.delete("j1").await.unwrap();
        assert!(store.get("j1").await.unwrap().is_none());
        assert!(store.get("never").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_drops_records_nobody_reads_again() {
        let clock = ManualClock::new(0);
        let store = InMemoryJobStore::with_clock(clock.clone());
        for n in 0..100 {
            store.put(&job(&format!("old-{n}")), Duration::from_secs(1)).await.unwrap();
        }
        store.put(&job("fresh"), DEFAULT_JOB_TTL).await.unwrap();

        clock.advance(Duration::from_secs(60 * 60));
        assert_eq!(store.purge_expired(), 100);
        assert_eq!(store.len(), 1);
        assert!(store.get("fresh").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_purges_in_the_background() {
        let clock = ManualClock::new(0);
        let store = Arc::new(InMemoryJobStore::with_clock(clock.clone()));
        store.put(&job("j1"), Duration::from_secs(1)).await.unwrap();
        let handle = store.spawn_sweeper(Duration::from_secs(60));

        clock.advance(Duration::from_secs(2));
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(store.is_empty());
        handle.shutdown();
    }

    #[test]
    fn records_round_trip_through_json() {
        let record = job("j1");
        let raw = encode_job(&record).unwrap();
        assert!(raw.contains("\"PENDING\""));
        assert_eq!(decode_job(&raw).unwrap(), record);
        assert!(matches!(decode_job("{"), Err(StoreError::Serialization(_))));
    }

    #[test]
    fn keys_are_prefixed() {
        assert_eq!(job_key("abc"), "chat_job:abc");
    }
}
