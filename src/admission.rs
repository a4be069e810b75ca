//! Admission control in front of gated operations.
//!
//! An [`AdmissionGate`] looks up the policy for an operation name, derives the
//! caller's bucket key from the [`RequestContext`], and asks the
//! [`RateLimiter`] for a decision. Only admitted requests reach the wrapped
//! operation.
//!
//! ```no_run
//! use chatgate::admission::{AdmissionGate, PolicyTable, RequestContext, CHAT_COMPLETIONS};
//! use chatgate::rate_limit::{InMemoryCounterStore, RateLimiter};
//!
//! # async fn run() -> Result<(), chatgate::GateError> {
//! let gate = AdmissionGate::new(
//!     RateLimiter::new(InMemoryCounterStore::new()),
//!     PolicyTable::with_defaults(),
//! );
//! let ctx = RequestContext::new().with_principal("alice");
//! let reply = gate
//!     .guard(CHAT_COMPLETIONS, &ctx, || async { Ok("hello back".to_string()) })
//!     .await?;
//! # let _ = reply;
//! # Ok(())
//! # }
//! ```

pub mod key;
pub mod policy;

pub use key::{client_ip, derive_key, user_identity, RequestContext, ANONYMOUS};
pub use policy::{
    AdmissionPolicy, FailureMode, PolicyAlgorithm, PolicyTable, CHAT_COMPLETIONS, DEFAULT_MESSAGE,
};

use crate::adaptive::DynamicConfig;
use crate::error::GateError;
use crate::rate_limit::{CounterStore, Decision, RateLimitKey, RateLimiter, Scope};
use crate::revocation::RevocationStore;
use crate::telemetry::{emit_best_effort, AdmissionEvent, NullSink, TelemetrySink};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Decides whether requests for named operations may proceed.
pub struct AdmissionGate<S, T = NullSink> {
    limiter: RateLimiter<S>,
    policies: DynamicConfig<PolicyTable>,
    revocations: Option<Arc<RevocationStore>>,
    sink: T,
}

impl<S: CounterStore> AdmissionGate<S, NullSink> {
    pub fn new(limiter: RateLimiter<S>, policies: PolicyTable) -> Self {
        Self { limiter, policies: DynamicConfig::new(policies), revocations: None, sink: NullSink }
    }
}

impl<S, T> AdmissionGate<S, T>
where
    S: CounterStore,
    T: TelemetrySink,
{
    pub fn with_sink<U: TelemetrySink>(self, sink: U) -> AdmissionGate<S, U> {
        AdmissionGate {
            limiter: self.limiter,
            policies: self.policies,
            revocations: self.revocations,
            sink,
        }
    }

    /// Consult `store` when deriving USER keys.
    pub fn with_revocations(mut self, store: Arc<RevocationStore>) -> Self {
        self.revocations = Some(store);
        self
    }

    /// Share the policy table with an external updater.
    pub fn with_dynamic_policies(mut self, policies: DynamicConfig<PolicyTable>) -> Self {
        self.policies = policies;
        self
    }

    /// Live handle to the policy table; updates apply to the next check.
    pub fn policies(&self) -> &DynamicConfig<PolicyTable> {
        &self.policies
    }

    pub fn policy(&self, operation: &str) -> Option<AdmissionPolicy> {
        self.policies.get().get(operation).cloned()
    }

    pub fn limiter(&self) -> &RateLimiter<S> {
        &self.limiter
    }

    pub fn derive_key(&self, scope: Scope, ctx: &RequestContext) -> RateLimitKey {
        derive_key(scope, ctx, self.revocations.as_deref())
    }

    /// Run the admission check for `operation`.
    ///
    /// Operations without a policy are admitted. Counters are kept per
    /// operation, so one caller's chat budget does not consume their
    /// submission budget.
    pub async fn check(&self, operation: &str, ctx: &RequestContext) -> Result<(), GateError> {
        let Some(policy) = self.policy(operation) else {
            debug!(target: "chatgate::admission", operation, "no admission policy, admitting");
            return Ok(());
        };
        let key = self.derive_key(policy.scope, ctx);
        let bucket = bucket_key(operation, &key);

        match self.limiter.check(&bucket, &policy.algorithm()).await {
            Ok(Decision::Allowed { remaining }) => {
                debug!(target: "chatgate::admission", operation, key = %key, remaining, "admitted");
                self.emit(AdmissionEvent::Admitted {
                    operation: operation.to_string(),
                    key: key.to_string(),
                    remaining,
                })
                .await;
                Ok(())
            }
            Ok(Decision::Denied { reason }) => {
                warn!(target: "chatgate::admission", operation, key = %key, reason = %reason, "admission rejected");
                self.emit(AdmissionEvent::Rejected {
                    operation: operation.to_string(),
                    key: key.to_string(),
                })
                .await;
                Err(GateError::AdmissionRejected { key: key.to_string(), message: policy.message })
            }
            Err(err) => {
                let admitted = policy.failure_mode == FailureMode::Open;
                self.emit(AdmissionEvent::StoreFailure {
                    operation: operation.to_string(),
                    key: key.to_string(),
                    admitted,
                })
                .await;
                if admitted {
                    warn!(target: "chatgate::admission", operation, key = %key, error = %err, "counter store unavailable, admitting (fail-open)");
                    Ok(())
                } else {
                    error!(target: "chatgate::admission", operation, key = %key, error = %err, "counter store unavailable, rejecting (fail-closed)");
                    Err(GateError::StoreUnavailable(err))
                }
            }
        }
    }

    /// Check admission, then run `operation_fn`.
    ///
    /// The closure is only invoked after admission, so a rejected request has
    /// no side effects.
    pub async fn guard<F, Fut, R>(
        &self,
        operation: &str,
        ctx: &RequestContext,
        operation_fn: F,
    ) -> Result<R, GateError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R, GateError>>,
    {
        self.check(operation, ctx).await?;
        operation_fn().await
    }

    /// Admissions left for the caller in the current fixed window.
    ///
    /// `None` when the operation is ungated or uses a token bucket.
    pub async fn remaining(
        &self,
        operation: &str,
        ctx: &RequestContext,
    ) -> Result<Option<u64>, GateError> {
        let Some(policy) = self.policy(operation) else {
            return Ok(None);
        };
        if policy.algorithm != PolicyAlgorithm::FixedWindow {
            return Ok(None);
        }
        let key = self.derive_key(policy.scope, ctx);
        let remaining =
            self.limiter.remaining(&bucket_key(operation, &key), policy.max_requests).await?;
        Ok(Some(remaining))
    }

    async fn emit(&self, event: AdmissionEvent) {
        emit_best_effort(self.sink.clone(), event.into()).await;
    }
}

fn bucket_key(operation: &str, key: &RateLimitKey) -> String {
    format!("{operation}:{key}")
}
