//! Rate limiting primitives.
//!
//! - [`RateLimiter`]: fixed-window and token-bucket decisions over a shared store.
//! - [`CounterStore`]: the atomic counter/TTL surface the limiter needs, with an
//!   in-memory implementation here and a Redis one in `chatgate-redis`.
//! - [`AdmissionLayer`]: Tower middleware that runs an
//!   [`AdmissionGate`](crate::admission::AdmissionGate) check before the inner service.
//!
//! # Keys
//!
//! Callers identify a bucket with a [`RateLimitKey`]. The limiter namespaces
//! the rendered key per algorithm, so the same key can be limited by both a
//! fixed window and a token bucket without the two interfering.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod middleware;
pub mod store;
pub mod strategies;
pub use middleware::{AdmissionLayer, AdmissionService};
pub use store::{CounterStore, InMemoryCounterStore};
pub use strategies::{Algorithm, RateLimiter};

/// Literal identifier used for the single process-wide bucket.
pub const GLOBAL_IDENTIFIER: &str = "global";

/// What a limiter key is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Scope {
    /// Client address.
    #[default]
    Ip,
    /// Authenticated principal.
    User,
    /// One bucket for everyone.
    Global,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Ip => "ip",
            Scope::User => "user",
            Scope::Global => "global",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one rate-limit bucket, e.g. `user:alice`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub scope: Scope,
    pub identifier: String,
}

impl RateLimitKey {
    pub fn new(scope: Scope, identifier: impl Into<String>) -> Self {
        Self { scope, identifier: identifier.into() }
    }

    pub fn ip(addr: impl Into<String>) -> Self {
        Self::new(Scope::Ip, addr)
    }

    pub fn user(principal: impl Into<String>) -> Self {
        Self::new(Scope::User, principal)
    }

    pub fn global() -> Self {
        Self::new(Scope::Global, GLOBAL_IDENTIFIER)
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.identifier)
    }
}

/// The decision returned by [`RateLimiter::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The request is allowed to proceed.
    Allowed {
        /// Permits left in the current window or bucket.
        /// Useful for `X-RateLimit-Remaining` headers.
        remaining: u64,
    },
    /// The request is denied.
    Denied {
        /// Which algorithm ran dry, e.g. `fixed_window` or `token_bucket`.
        reason: String,
    },
}

impl Decision {
    /// Helper to check if allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}
