//! Per-operation admission policies and the table that holds them.

use crate::config::ConfigError;
use crate::rate_limit::{Algorithm, Scope};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_MESSAGE: &str = "Too many requests, please try again later";

/// Operation name of the synchronous chat endpoint.
pub const CHAT_COMPLETIONS: &str = "chat.completions";

/// What the gate does when the counter store cannot answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Reject with a server error.
    #[default]
    Closed,
    /// Admit and log a warning.
    Open,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyAlgorithm {
    /// `maxRequests` per `windowSeconds`.
    #[default]
    FixedWindow,
    #[serde(rename_all = "camelCase")]
    TokenBucket { capacity: u64, refill_rate: u64, per_seconds: u64 },
}

/// Limits for one gated operation.
///
/// ```
/// use chatgate::admission::AdmissionPolicy;
///
/// let policy: AdmissionPolicy = serde_json::from_str(
///     r#"{"scope":"USER","maxRequests":5,"windowSeconds":60,"message":"slow down"}"#,
/// ).unwrap();
/// assert_eq!(policy.max_requests, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdmissionPolicy {
    pub scope: Scope,
    pub max_requests: u64,
    pub window_seconds: u64,
    /// Shown to rejected callers verbatim.
    pub message: String,
    pub algorithm: PolicyAlgorithm,
    pub failure_mode: FailureMode,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            scope: Scope::Ip,
            max_requests: 10,
            window_seconds: 60,
            message: DEFAULT_MESSAGE.to_string(),
            algorithm: PolicyAlgorithm::FixedWindow,
            failure_mode: FailureMode::Closed,
        }
    }
}

impl AdmissionPolicy {
    pub fn new(scope: Scope, max_requests: u64, window_seconds: u64) -> Self {
        Self { scope, max_requests, window_seconds, ..Self::default() }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_algorithm(mut self, algorithm: PolicyAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// Limiter parameters for this policy.
    pub fn algorithm(&self) -> Algorithm {
        match self.algorithm {
            PolicyAlgorithm::FixedWindow => Algorithm::FixedWindow {
                max_requests: self.max_requests,
                window: Duration::from_secs(self.window_seconds),
            },
            PolicyAlgorithm::TokenBucket { capacity, refill_rate, per_seconds } => {
                Algorithm::TokenBucket {
                    capacity,
                    refill_rate,
                    per: Duration::from_secs(per_seconds),
                }
            }
        }
    }

    pub fn validate(&self, operation: &str) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::Invalid {
            field: format!("admission.{operation}"),
            reason: reason.to_string(),
        };
        match self.algorithm {
            PolicyAlgorithm::FixedWindow if self.window_seconds == 0 => {
                Err(invalid("windowSeconds must be positive"))
            }
            PolicyAlgorithm::TokenBucket { capacity: 0, .. } => {
                Err(invalid("token bucket capacity must be positive"))
            }
            PolicyAlgorithm::TokenBucket { per_seconds: 0, .. } => {
                Err(invalid("token bucket perSeconds must be positive"))
            }
            _ if self.message.trim().is_empty() => Err(invalid("message must not be empty")),
            _ => Ok(()),
        }
    }
}

/// Admission policies keyed by operation name.
///
/// Operations without an entry are not gated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyTable {
    policies: HashMap<String, AdmissionPolicy>,
}

impl PolicyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The table a fresh deployment starts with: chat completions limited to
    /// five per user per minute.
    pub fn with_defaults() -> Self {
        Self::new().with(
            CHAT_COMPLETIONS,
            AdmissionPolicy::new(Scope::User, 5, 60)
                .with_message("Chat requests are too frequent, please try again later"),
        )
    }

    pub fn with(mut self, operation: impl Into<String>, policy: AdmissionPolicy) -> Self {
        self.insert(operation, policy);
        self
    }

    pub fn insert(
        &mut self,
        operation: impl Into<String>,
        policy: AdmissionPolicy,
    ) -> Option<AdmissionPolicy> {
        self.policies.insert(operation.into(), policy)
    }

    pub fn get(&self, operation: &str) -> Option<&AdmissionPolicy> {
        self.policies.get(operation)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AdmissionPolicy)> {
        self.policies.iter().map(|(op, policy)| (op.as_str(), policy))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.iter().try_for_each(|(operation, policy)| policy.validate(operation))
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let table: Self = serde_json::from_str(json).map_err(ConfigError::parse)?;
        table.validate()?;
        Ok(table)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        Self::from_json_str(&raw)
    }
}
