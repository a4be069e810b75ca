use super::queue::JobQueue;
use super::store::{JobStore, DEFAULT_JOB_TTL};
use super::{Job, JobStatus, CANCELLED};
use crate::backend::{BackendError, ChatBackend, HistoryRecord, HistorySink, NoopHistory};
use crate::chat::{build_messages, ChatRequest, DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT};
use crate::clock::{duration_millis, Clock, SystemClock};
use crate::error::GateError;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::telemetry::{emit_best_effort, JobEvent, NullSink, TelemetrySink};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Tunables for [`JobPipeline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Lifetime of a job record after its last write.
    pub job_ttl: Duration,
    /// Gap between status checks while long polling.
    pub poll_interval: Duration,
    /// Poll timeout when the caller gives none.
    pub default_poll_timeout: Duration,
    pub system_prompt: String,
    /// Model name recorded with chat history.
    pub model: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            job_ttl: DEFAULT_JOB_TTL,
            poll_interval: Duration::from_secs(1),
            default_poll_timeout: Duration::from_secs(30),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The job reached `COMPLETED` or `FAILED`.
    Finished(Job),
    /// Still running (or unknown) when the timeout elapsed.
    TimedOut,
}

impl PollOutcome {
    pub const TIMEOUT_MESSAGE: &'static str = "Request timeout, please check status later";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Pulled from the queue before any worker saw it; recorded as failed.
    Withdrawn,
    /// Already delivered but not claimed. Flagged; its consumer will skip
    /// the backend.
    Requested,
    /// Already claimed by a worker or finished. Nothing changed.
    AlreadyStarted,
}

/// Accepts chat jobs, runs them against the backend, and answers status queries.
///
/// Any number of pipelines (one per process) may share a store and queue.
/// Only the worker that received a job writes it past `PENDING`.
pub struct JobPipeline<T = NullSink> {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn JobQueue>,
    backend: Arc<dyn ChatBackend>,
    history: Arc<dyn HistorySink>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    config: PipelineConfig,
    sink: T,
}

impl JobPipeline<NullSink> {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn JobQueue>,
        backend: Arc<dyn ChatBackend>,
    ) -> Self {
        Self {
            store,
            queue,
            backend,
            history: Arc::new(NoopHistory),
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(TokioSleeper),
            config: PipelineConfig::default(),
            sink: NullSink,
        }
    }
}

impl<T: TelemetrySink> JobPipeline<T> {
    pub fn with_history(mut self, history: Arc<dyn HistorySink>) -> Self {
        self.history = history;
        self
    }

    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_sleeper<S: Sleeper + 'static>(mut self, sleeper: S) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_sink<U: TelemetrySink>(self, sink: U) -> JobPipeline<U> {
        JobPipeline {
            store: self.store,
            queue: self.queue,
            backend: self.backend,
            history: self.history,
            clock: self.clock,
            sleeper: self.sleeper,
            config: self.config,
            sink,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    /// Accept `request` for `owner_id` and return the new job id.
    ///
    /// The `PENDING` record is written before the job is published, so a
    /// worker never receives a job it cannot find. If publishing fails the
    /// record stays behind until its TTL reclaims it.
    pub async fn submit(&self, owner_id: &str, request: ChatRequest) -> Result<String, GateError> {
        request.validate()?;
        let job_id = Uuid::new_v4().to_string();
        let job = Job::new_pending(
            job_id.clone(),
            owner_id,
            new_session_id(),
            request,
            self.clock.now_millis(),
        );

        self.store.put(&job, self.config.job_ttl).await?;
        if let Err(err) = self.queue.publish(&job).await {
            error!(target: "chatgate::jobs", job_id = %job_id, error = %err, "failed to publish job");
            self.emit(JobEvent::PublishFailed { job_id: job_id.clone() }).await;
            return Err(GateError::QueueUnavailable(err.to_string()));
        }

        info!(target: "chatgate::jobs", job_id = %job_id, owner_id, "job submitted");
        self.emit(JobEvent::Submitted { job_id: job_id.clone() }).await;
        Ok(job_id)
    }

    /// Run one delivered job to a terminal state.
    ///
    /// Safe under redelivery: the stored record is authoritative, and a job
    /// that already finished is left untouched. Returns the status the job
    /// ended in. `Err` only when the store could not be written.
    pub async fn process(&self, delivered: Job) -> Result<JobStatus, GateError> {
        let job_id = delivered.id.clone();
        let mut job = match self.store.get(&job_id).await? {
            Some(stored) => stored,
            None => {
                warn!(target: "chatgate::jobs", job_id = %job_id, "job record missing, processing delivered copy");
                delivered
            }
        };

        if job.status.is_terminal() {
            info!(target: "chatgate::jobs", job_id = %job_id, status = %job.status, "duplicate delivery of finished job, skipping");
            self.emit(JobEvent::Duplicate { job_id, status: job.status }).await;
            return Ok(job.status);
        }
        if job.status == JobStatus::Processing {
            warn!(target: "chatgate::jobs", job_id = %job_id, "re-claiming job left in PROCESSING by an earlier delivery");
        }

        job.mark_processing(self.clock.now_millis())?;
        self.store.put(&job, self.config.job_ttl).await?;
        self.emit(JobEvent::Started { job_id: job_id.clone() }).await;

        if job.cancel_requested {
            return self.finish_failed(job, CANCELLED.to_string()).await;
        }

        let messages =
            build_messages(&self.config.system_prompt, &job.payload.history, &job.payload.message);
        let reply = match self.backend.complete(&messages).await {
            Ok(reply) if reply.content.trim().is_empty() => Err(BackendError::EmptyReply),
            other => other,
        };

        match reply {
            Ok(reply) => {
                job.complete(reply.content.clone(), self.clock.now_millis())?;
                self.store.put(&job, self.config.job_ttl).await?;
                info!(target: "chatgate::jobs", job_id = %job_id, "job completed");
                self.emit(JobEvent::Completed { job_id: job_id.clone() }).await;
                self.save_history(&job, reply.content).await;
                Ok(JobStatus::Completed)
            }
            Err(err) => self.finish_failed(job, err.to_string()).await,
        }
    }

    async fn finish_failed(&self, mut job: Job, reason: String) -> Result<JobStatus, GateError> {
        job.fail(reason.clone(), self.clock.now_millis())?;
        self.store.put(&job, self.config.job_ttl).await?;
        warn!(target: "chatgate::jobs", job_id = %job.id, error = %reason, "job failed");
        self.emit(JobEvent::Failed { job_id: job.id, error: reason }).await;
        Ok(JobStatus::Failed)
    }

    async fn save_history(&self, job: &Job, reply: String) {
        let record = HistoryRecord {
            owner_id: job.owner_id.clone(),
            session_id: job.session_id.clone(),
            user_message: job.payload.message.clone(),
            assistant_message: reply,
            model: self.config.model.clone(),
        };
        if let Err(err) = self.history.record(record).await {
            warn!(target: "chatgate::jobs", job_id = %job.id, error = %err, "failed to save chat history");
        }
    }

    pub async fn status(&self, job_id: &str) -> Result<JobStatus, GateError> {
        Ok(self.result(job_id).await?.status)
    }

    /// Full job record, including `result` or `error` once finished.
    pub async fn result(&self, job_id: &str) -> Result<Job, GateError> {
        self.store.get(job_id).await?.ok_or_else(|| GateError::not_found(job_id))
    }

    /// Wait until `job_id` finishes or `timeout` (default from config) elapses.
    ///
    /// Checks once immediately, then every `poll_interval`. Unknown ids are
    /// polled like running ones since the record may not be visible yet.
    /// Dropping the returned future stops polling.
    pub async fn poll(&self, job_id: &str, timeout: Option<Duration>) -> Result<PollOutcome, GateError> {
        let timeout = timeout.unwrap_or(self.config.default_poll_timeout);
        let deadline = self.clock.now_millis().saturating_add(duration_millis(timeout));

        loop {
            if let Some(job) = self.store.get(job_id).await? {
                if job.status.is_terminal() {
                    return Ok(PollOutcome::Finished(job));
                }
            }
            let now = self.clock.now_millis();
            if now >= deadline {
                debug!(target: "chatgate::jobs", job_id, ?timeout, "poll timed out");
                return Ok(PollOutcome::TimedOut);
            }
            let wait = self.config.poll_interval.min(Duration::from_millis(deadline - now));
            self.sleeper.sleep(wait).await;
        }
    }

    /// Best-effort cancellation.
    ///
    /// A `PENDING` job the queue can still withdraw is claimed by this call
    /// and moved through `PROCESSING` to `FAILED` with error `"cancelled"`.
    /// A `PENDING` job that was already delivered is flagged so its consumer
    /// skips the backend. A job a worker already claimed runs to completion.
    pub async fn cancel(&self, job_id: &str) -> Result<CancelOutcome, GateError> {
        let job = self.result(job_id).await?;
        if job.status != JobStatus::Pending {
            debug!(target: "chatgate::jobs", job_id, status = %job.status, "cancel ignored, job already started");
            return Ok(CancelOutcome::AlreadyStarted);
        }

        let withdrawn = match self.queue.withdraw(job_id).await {
            Ok(withdrawn) => withdrawn,
            Err(err) => {
                warn!(target: "chatgate::jobs", job_id, error = %err, "queue withdraw failed");
                false
            }
        };
        info!(target: "chatgate::jobs", job_id, withdrawn, "job cancellation requested");
        self.emit(JobEvent::CancelRequested { job_id: job_id.to_string(), withdrawn }).await;

        if withdrawn {
            // No worker will receive it; this call is its consumer.
            let mut job = job;
            job.cancel_requested = true;
            job.mark_processing(self.clock.now_millis())?;
            self.store.put(&job, self.config.job_ttl).await?;
            self.finish_failed(job, CANCELLED.to_string()).await?;
            return Ok(CancelOutcome::Withdrawn);
        }

        // Delivered: only flag it while its consumer has not claimed it yet.
        let mut job = match self.store.get(job_id).await? {
            Some(job) if job.status == JobStatus::Pending => job,
            Some(_) => return Ok(CancelOutcome::AlreadyStarted),
            None => return Err(GateError::not_found(job_id)),
        };
        job.cancel_requested = true;
        job.updated_at = self.clock.now_millis();
        self.store.put(&job, self.config.job_ttl).await?;
        Ok(CancelOutcome::Requested)
    }

    async fn emit(&self, event: JobEvent) {
        emit_best_effort(self.sink.clone(), event.into()).await;
    }
}

/// `session-` followed by eight hex digits.
fn new_session_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("session-{}", &id[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_short_hex() {
        let id = new_session_id();
        assert_eq!(id.len(), "session-".len() + 8);
        assert!(id["session-".len()..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn default_config_matches_documented_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.job_ttl, Duration::from_secs(86_400));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.default_poll_timeout, Duration::from_secs(30));
    }
}
