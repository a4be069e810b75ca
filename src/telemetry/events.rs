use crate::jobs::JobStatus;
use std::fmt;

/// Events emitted by the admission gate and the job pipeline.
///
/// Sinks receive these alongside the `tracing` output; they are meant for
/// counters and audit trails rather than human-readable logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateEvent {
    Admission(AdmissionEvent),
    Job(JobEvent),
}

/// Outcome of one admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionEvent {
    Admitted { operation: String, key: String, remaining: u64 },
    Rejected { operation: String, key: String },
    /// The counter store failed; `admitted` tells which way the failure mode went.
    StoreFailure { operation: String, key: String, admitted: bool },
}

/// Lifecycle events of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Submitted { job_id: String },
    /// The record was written but the queue refused the message.
    PublishFailed { job_id: String },
    Started { job_id: String },
    Completed { job_id: String },
    Failed { job_id: String, error: String },
    /// A redelivered message for a job that already reached `status`.
    Duplicate { job_id: String, status: JobStatus },
    CancelRequested { job_id: String, withdrawn: bool },
}

impl fmt::Display for AdmissionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admitted { operation, key, remaining } => {
                write!(f, "Admission::Admitted(op={}, key={}, remaining={})", operation, key, remaining)
            }
            Self::Rejected { operation, key } => {
                write!(f, "Admission::Rejected(op={}, key={})", operation, key)
            }
            Self::StoreFailure { operation, key, admitted } => {
                write!(f, "Admission::StoreFailure(op={}, key={}, admitted={})", operation, key, admitted)
            }
        }
    }
}

impl fmt::Display for JobEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submitted { job_id } => write!(f, "Job::Submitted(id={})", job_id),
            Self::PublishFailed { job_id } => write!(f, "Job::PublishFailed(id={})", job_id),
            Self::Started { job_id } => write!(f, "Job::Started(id={})", job_id),
            Self::Completed { job_id } => write!(f, "Job::Completed(id={})", job_id),
            Self::Failed { job_id, error } => write!(f, "Job::Failed(id={}, error={})", job_id, error),
            Self::Duplicate { job_id, status } => {
                write!(f, "Job::Duplicate(id={}, status={})", job_id, status)
            }
            Self::CancelRequested { job_id, withdrawn } => {
                write!(f, "Job::CancelRequested(id={}, withdrawn={})", job_id, withdrawn)
            }
        }
    }
}

impl fmt::Display for GateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admission(e) => e.fmt(f),
            Self::Job(e) => e.fmt(f),
        }
    }
}

impl From<AdmissionEvent> for GateEvent {
    fn from(event: AdmissionEvent) -> Self {
        Self::Admission(event)
    }
}

impl From<JobEvent> for GateEvent {
    fn from(event: JobEvent) -> Self {
        Self::Job(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_event() {
        let event = GateEvent::from(AdmissionEvent::Rejected {
            operation: "chat.completions".into(),
            key: "user:alice".into(),
        });
        assert_eq!(event.to_string(), "Admission::Rejected(op=chat.completions, key=user:alice)");

        let job = GateEvent::from(JobEvent::Duplicate { job_id: "j1".into(), status: JobStatus::Completed });
        assert_eq!(job.to_string(), "Job::Duplicate(id=j1, status=COMPLETED)");
    }
}
