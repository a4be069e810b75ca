use super::pipeline::JobPipeline;
use crate::telemetry::TelemetrySink;
use rand::{rng, Rng};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const RECEIVE_BACKOFF_BASE: Duration = Duration::from_millis(100);
const RECEIVE_BACKOFF_MAX: Duration = Duration::from_secs(10);

/// Fixed set of tasks draining the pipeline's queue.
///
/// Each worker handles one job at a time, so `workers` bounds how many
/// backend calls run concurrently in this process.
#[derive(Debug)]
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` (at least one) consumers on the current runtime.
    pub fn spawn<T: TelemetrySink>(pipeline: Arc<JobPipeline<T>>, workers: usize) -> Self {
        let count = workers.max(1);
        let handles = (0..count)
            .map(|worker| tokio::spawn(run_worker(worker, pipeline.clone())))
            .collect();
        info!(target: "chatgate::jobs", workers = count, "job workers started");
        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stop all workers now. A job being processed is abandoned in
    /// `PROCESSING`; redelivery or its TTL takes care of it.
    pub fn shutdown(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }

    /// Wait for every worker to exit, which happens once the queue is closed
    /// and drained (or after [`shutdown`](Self::shutdown)).
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    error!(target: "chatgate::jobs", error = %err, "job worker panicked");
                }
            }
        }
    }
}

async fn run_worker<T: TelemetrySink>(worker: usize, pipeline: Arc<JobPipeline<T>>) {
    let queue = pipeline.queue().clone();
    let mut failures: u32 = 0;
    loop {
        match queue.receive().await {
            Ok(Some(job)) => {
                failures = 0;
                let job_id = job.id.clone();
                if let Err(err) = pipeline.process(job).await {
                    error!(target: "chatgate::jobs", worker, job_id = %job_id, error = %err, "job processing aborted");
                }
            }
            Ok(None) => {
                info!(target: "chatgate::jobs", worker, "job queue closed, worker exiting");
                return;
            }
            Err(err) => {
                failures = failures.saturating_add(1);
                let delay = receive_backoff(failures);
                warn!(target: "chatgate::jobs", worker, error = %err, ?delay, "receive failed, backing off");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Exponential backoff with equal jitter, capped at [`RECEIVE_BACKOFF_MAX`].
fn receive_backoff(failures: u32) -> Duration {
    let exp = failures.saturating_sub(1).min(16);
    let capped = RECEIVE_BACKOFF_BASE.saturating_mul(1u32 << exp).min(RECEIVE_BACKOFF_MAX);
    let millis = u64::try_from(capped.as_millis()).unwrap_or(u64::MAX);
    let half = millis / 2;
    Duration::from_millis(rng().random_range(half..=millis))
}
