//! Error types for admission, stores and the job pipeline
use crate::jobs::InvalidTransition;
use std::fmt;

/// Failure talking to a counter store, job store or job queue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backing store or broker could not be reached or refused the command.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A record could not be encoded or decoded.
    #[error("record serialization failed: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Everything a gated chat operation can fail with.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GateError {
    /// The caller exceeded the operation's admission policy.
    #[error("admission rejected for {key}: {message}")]
    AdmissionRejected { key: String, message: String },
    /// The chat backend failed and no fallback applied.
    #[error("chat backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),
    #[error("job {job_id} not found")]
    NotFound { job_id: String },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The job record was written but could not be handed to the queue.
    #[error("job queue unavailable: {0}")]
    QueueUnavailable(String),
    #[error(transparent)]
    IllegalTransition(#[from] InvalidTransition),
}

impl GateError {
    pub fn not_found(job_id: impl Into<String>) -> Self {
        Self::NotFound { job_id: job_id.into() }
    }

    /// HTTP status an outer surface should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::AdmissionRejected { .. } => 429,
            Self::InvalidRequest(_) => 400,
            Self::NotFound { .. } => 404,
            Self::BackendUnavailable(_) => 502,
            Self::StoreUnavailable(_) | Self::QueueUnavailable(_) | Self::IllegalTransition(_) => 500,
        }
    }

    /// Text safe to show to callers.
    ///
    /// Rejections carry only the configured policy message; server-side
    /// failures never expose store or broker details.
    pub fn public_message(&self) -> String {
        match self {
            Self::AdmissionRejected { message, .. } => message.clone(),
            Self::InvalidRequest(reason) => reason.clone(),
            Self::NotFound { .. } => "Job not found".to_string(),
            Self::BackendUnavailable(_) => "The chat service is temporarily unavailable".to_string(),
            Self::StoreUnavailable(_) | Self::QueueUnavailable(_) | Self::IllegalTransition(_) => {
                "Internal server error".to_string()
            }
        }
    }

    pub fn is_admission_rejected(&self) -> bool {
        matches!(self, Self::AdmissionRejected { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

/// Error produced by [`AdmissionService`](crate::rate_limit::AdmissionService).
#[derive(Debug, Clone)]
pub enum AdmissionError<E> {
    /// Admission policy denied the request; `message` is caller-facing.
    Rejected { key: String, message: String },
    /// The gate could not decide (store outage under a fail-closed policy).
    Gate(GateError),
    /// The wrapped service failed.
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for AdmissionError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { key, message } => {
                write!(f, "request rejected by admission policy ({}): {}", key, message)
            }
            Self::Gate(e) => write!(f, "admission check failed: {}", e),
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for AdmissionError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Gate(e) => Some(e),
            Self::Rejected { .. } => None,
        }
    }
}

impl<E> From<GateError> for AdmissionError<E> {
    fn from(err: GateError) -> Self {
        match err {
            GateError::AdmissionRejected { key, message } => Self::Rejected { key, message },
            other => Self::Gate(other),
        }
    }
}

impl<E> AdmissionError<E> {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// 429 for rejections, the gate's own mapping otherwise; `None` for inner errors.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Rejected { .. } => Some(429),
            Self::Gate(e) => Some(e.status_code()),
            Self::Inner(_) => None,
        }
    }
}
