//! Redis stores for `chatgate` (optional companion crate).
//!
//! Enable the `client` feature to get [`RedisCounterStore`] (limiter
//! counters and buckets) and [`RedisJobStore`] (job records). Both share one
//! multiplexed connection per store; clones are cheap.
//!
//! ```toml
//! chatgate-redis = { version = "0.1", features = ["client"] }
//! ```
//!
//! ```rust,ignore
//! use chatgate::rate_limit::RateLimiter;
//! use chatgate_redis::RedisCounterStore;
//! # async fn demo() -> Result<(), chatgate::StoreError> {
//! let limiter = RateLimiter::new(RedisCounterStore::connect("redis://127.0.0.1:6379").await?);
//! # Ok(()) }
//! ```

#[cfg(feature = "client")]
mod counter;
#[cfg(feature = "client")]
mod jobs;

#[cfg(feature = "client")]
pub use counter::RedisCounterStore;
#[cfg(feature = "client")]
pub use jobs::RedisJobStore;

use std::time::Duration;

/// Whole seconds for `EXPIRE`/`SETEX`, rounded up and never zero.
pub fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

#[cfg(feature = "client")]
pub(crate) fn unavailable(op: &str, err: redis::RedisError) -> chatgate::StoreError {
    chatgate::StoreError::unavailable(format!("redis {op} failed: {err}"))
}
