//! Deployment configuration.
//!
//! One JSON document covers admission policies and the job pipeline. Every
//! field is optional; missing ones take the defaults below.
//!
//! ```json
//! {
//!   "admission": {
//!     "chat.completions": { "scope": "USER", "maxRequests": 5, "windowSeconds": 60,
//!                           "message": "Chat requests are too frequent, please try again later" }
//!   },
//!   "workers": 4,
//!   "job_ttl_secs": 86400,
//!   "poll_interval_ms": 1000
//! }
//! ```

use crate::admission::PolicyTable;
use crate::chat::{DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT};
use crate::jobs::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {reason}")]
    Io { path: String, reason: String },
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    pub(crate) fn io(path: &Path, err: std::io::Error) -> Self {
        Self::Io { path: path.display().to_string(), reason: err.to_string() }
    }

    pub(crate) fn parse(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }

    fn invalid(field: &str, reason: &str) -> Self {
        Self::Invalid { field: field.to_string(), reason: reason.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub admission: PolicyTable,
    /// Concurrent job workers per process.
    pub workers: usize,
    pub job_ttl_secs: u64,
    pub poll_interval_ms: u64,
    pub default_poll_timeout_secs: u64,
    pub revocation_sweep_secs: u64,
    pub stream_idle_timeout_secs: u64,
    pub system_prompt: String,
    pub model: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            admission: PolicyTable::with_defaults(),
            workers: 4,
            job_ttl_secs: 24 * 60 * 60,
            poll_interval_ms: 1_000,
            default_poll_timeout_secs: 30,
            revocation_sweep_secs: 60 * 60,
            stream_idle_timeout_secs: 60,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

impl GateConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(ConfigError::parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::invalid("workers", "must be at least 1"));
        }
        if self.job_ttl_secs == 0 {
            return Err(ConfigError::invalid("job_ttl_secs", "must be positive"));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("poll_interval_ms", "must be positive"));
        }
        if self.revocation_sweep_secs == 0 {
            return Err(ConfigError::invalid("revocation_sweep_secs", "must be positive"));
        }
        if self.stream_idle_timeout_secs == 0 {
            return Err(ConfigError::invalid("stream_idle_timeout_secs", "must be positive"));
        }
        self.admission.validate()
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            job_ttl: Duration::from_secs(self.job_ttl_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            default_poll_timeout: Duration::from_secs(self.default_poll_timeout_secs),
            system_prompt: self.system_prompt.clone(),
            model: self.model.clone(),
        }
    }

    pub fn revocation_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.revocation_sweep_secs)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }
}
