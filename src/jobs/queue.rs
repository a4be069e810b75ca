use super::Job;
use crate::error::StoreError;
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use dashmap::DashSet;
use std::sync::Arc;
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    Mutex,
};
use tracing::debug;

/// Default buffer of the in-process queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Hands jobs from submitters to workers.
///
/// Delivery is at-least-once: a job may be received more than once (broker
/// redelivery, consumer restart), never silently dropped once `publish`
/// returned `Ok`. Consumers must tolerate duplicates.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue `job`. Must not wait for a consumer.
    async fn publish(&self, job: &Job) -> Result<(), StoreError>;

    /// Next job, waiting until one is available. `Ok(None)` once the queue is
    /// closed and drained.
    async fn receive(&self) -> Result<Option<Job>, StoreError>;

    /// Try to pull a not-yet-delivered job back out. `Ok(false)` when the
    /// queue cannot withdraw messages or the job already left it.
    async fn withdraw(&self, _job_id: &str) -> Result<bool, StoreError> {
        Ok(false)
    }
}

#[async_trait]
impl<T: JobQueue + ?Sized> JobQueue for Arc<T> {
    async fn publish(&self, job: &Job) -> Result<(), StoreError> {
        (**self).publish(job).await
    }

    async fn receive(&self) -> Result<Option<Job>, StoreError> {
        (**self).receive().await
    }

    async fn withdraw(&self, job_id: &str) -> Result<bool, StoreError> {
        (**self).withdraw(job_id).await
    }
}

/// In-process queue over a bounded tokio channel.
///
/// Any number of workers may call `receive` concurrently; each job goes to
/// exactly one of them. `publish` fails fast with
/// [`StoreError::Unavailable`] when the buffer is full or the queue closed.
///
/// Ids of buffered jobs are tracked next to the channel. `receive` and
/// `withdraw` both claim an id by removing it, so a job is either handed to
/// a worker or withdrawn, never both.
#[derive(Debug)]
pub struct ChannelJobQueue {
    tx: ArcSwapOption<mpsc::Sender<Job>>,
    rx: Mutex<mpsc::Receiver<Job>>,
    queued: DashSet<String>,
}

impl Default for ChannelJobQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl ChannelJobQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx: ArcSwapOption::from_pointee(tx),
            rx: Mutex::new(rx),
            queued: DashSet::new(),
        }
    }

    /// Stop accepting jobs. Workers drain what is buffered, then see `None`.
    pub fn close(&self) {
        self.tx.store(None);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.load().is_none()
    }
}

#[async_trait]
impl JobQueue for ChannelJobQueue {
    async fn publish(&self, job: &Job) -> Result<(), StoreError> {
        let Some(tx) = self.tx.load_full() else {
            return Err(StoreError::unavailable("job queue is closed"));
        };
        // A re-published id that is still buffered is delivered once.
        let fresh = self.queued.insert(job.id.clone());
        let err = match tx.try_send(job.clone()) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Full(_)) => StoreError::unavailable("job queue is full"),
            Err(TrySendError::Closed(_)) => StoreError::unavailable("job queue is closed"),
        };
        if fresh {
            self.queued.remove(&job.id);
        }
        Err(err)
    }

    async fn receive(&self) -> Result<Option<Job>, StoreError> {
        let mut rx = self.rx.lock().await;
        while let Some(job) = rx.recv().await {
            if self.queued.remove(&job.id).is_none() {
                debug!(target: "chatgate::jobs", job_id = %job.id, "skipping withdrawn job");
                continue;
            }
            return Ok(Some(job));
        }
        Ok(None)
    }

    async fn withdraw(&self, job_id: &str) -> Result<bool, StoreError> {
        // The message stays in the channel; `receive` drops it once the id is gone.
        Ok(self.queued.remove(job_id).is_some())
    }
}
