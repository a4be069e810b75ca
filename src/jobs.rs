//! Asynchronous chat jobs.
//!
//! A job is accepted as `PENDING`, claimed by exactly one worker
//! (`PROCESSING`), and finishes as `COMPLETED` with a result or `FAILED`
//! with an error:
//!
//! ```text
//! PENDING ──▶ PROCESSING ──▶ COMPLETED
//!                       └──▶ FAILED
//! ```
//!
//! Records live in a [`JobStore`] with a TTL refreshed on every write, and
//! are delivered to workers through a [`JobQueue`] with at-least-once
//! semantics. [`JobPipeline`] ties the two together.

pub mod pipeline;
pub mod queue;
pub mod store;
pub mod worker;

pub use pipeline::{CancelOutcome, JobPipeline, PipelineConfig, PollOutcome};
pub use queue::{ChannelJobQueue, JobQueue};
pub use store::{InMemoryJobStore, JobStore};
pub use worker::WorkerPool;

use crate::chat::ChatRequest;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error text recorded on jobs that were cancelled before they ran.
pub const CANCELLED: &str = "cancelled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// `PROCESSING -> PROCESSING` is a worker re-claiming a redelivered job
    /// whose previous consumer died mid-flight.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal job transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// One unit of deferred chat work.
///
/// `result` is set exactly when the job completed and `error` exactly when it
/// failed; the transition methods keep that true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub owner_id: String,
    pub session_id: String,
    pub payload: ChatRequest,
    pub status: JobStatus,
    pub result: Option<String>,
    pub error: Option<String>,
    /// Epoch millis.
    pub created_at: u64,
    pub updated_at: u64,
    #[serde(default)]
    pub cancel_requested: bool,
}

impl Job {
    pub fn new_pending(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        session_id: impl Into<String>,
        payload: ChatRequest,
        now: u64,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            session_id: session_id.into(),
            payload,
            status: JobStatus::Pending,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            cancel_requested: false,
        }
    }

    pub fn mark_processing(&mut self, now: u64) -> Result<(), InvalidTransition> {
        self.transition(JobStatus::Processing, now)
    }

    pub fn complete(&mut self, result: impl Into<String>, now: u64) -> Result<(), InvalidTransition> {
        self.transition(JobStatus::Completed, now)?;
        self.result = Some(result.into());
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>, now: u64) -> Result<(), InvalidTransition> {
        self.transition(JobStatus::Failed, now)?;
        self.error = Some(error.into());
        Ok(())
    }

    fn transition(&mut self, next: JobStatus, now: u64) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition { from: self.status, to: next });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new_pending("j1", "alice", "session-0000aaaa", ChatRequest::new("hello"), 10)
    }

    #[test]
    fn happy_path_sets_result_only_on_completion() {
        let mut job = job();
        job.mark_processing(11).unwrap();
        assert!(job.result.is_none());
        job.complete("hi there", 12).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result.as_deref(), Some("hi there"));
        assert!(job.error.is_none());
        assert_eq!((job.created_at, job.updated_at), (10, 12));
    }

    #[test]
    fn cannot_skip_processing() {
        let mut job = job();
        let err = job.complete("too early", 11).unwrap_err();
        assert_eq!(err, InvalidTransition { from: JobStatus::Pending, to: JobStatus::Completed });
        assert!(job.fail("also too early", 11).is_err());
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.result.is_none() && job.error.is_none());
    }

    #[test]
    fn terminal_states_are_sticky() {
        let mut job = job();
        job.mark_processing(11).unwrap();
        job.fail("backend down", 12).unwrap();
        assert!(job.mark_processing(13).is_err());
        assert!(job.complete("late", 13).is_err());
        assert_eq!(job.error.as_deref(), Some("backend down"));
        assert!(job.result.is_none());
    }

    #[test]
    fn status_serializes_in_upper_case() {
        assert_eq!(serde_json::to_string(&JobStatus::Processing).unwrap(), "\"PROCESSING\"");
        assert_eq!(JobStatus::Failed.to_string(), "FAILED");
    }
}
