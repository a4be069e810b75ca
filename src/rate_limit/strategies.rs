use crate::clock::{duration_millis, Clock, SystemClock};
use crate::error::StoreError;
use crate::rate_limit::store::CounterStore;
use crate::rate_limit::Decision;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

const COUNTER_PREFIX: &str = "rate_limit:counter:";
const TOKEN_PREFIX: &str = "rate_limit:token:";
const TIMESTAMP_PREFIX: &str = "rate_limit:timestamp:";

/// Idle buckets are reclaimed by the store after this long.
pub const BUCKET_STATE_TTL: Duration = Duration::from_secs(60 * 60);

/// Which limiting algorithm to run for a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Algorithm {
    /// At most `max_requests` per `window`, counted from the first request.
    FixedWindow { max_requests: u64, window: Duration },
    /// Bucket of `capacity` tokens, refilled by `refill_rate` tokens every `per`.
    TokenBucket { capacity: u64, refill_rate: u64, per: Duration },
}

/// Fixed-window and token-bucket limiting over a [`CounterStore`].
///
/// Both algorithms read then write without compare-and-swap. Two concurrent
/// callers on one key can therefore both observe the same state, so a bucket
/// may briefly over-admit and a window's TTL may be set by a late caller.
/// That approximate fairness is accepted; exact enforcement would need an
/// atomic script on the store side.
#[derive(Debug)]
pub struct RateLimiter<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for RateLimiter<S> {
    fn clone(&self) -> Self {
        Self { store: self.store.clone(), clock: self.clock.clone() }
    }
}

impl<S> RateLimiter<S>
where
    S: CounterStore,
{
    pub fn new(store: S) -> Self {
        Self::from_shared(Arc::new(store))
    }

    pub fn from_shared(store: Arc<S>) -> Self {
        Self { store, clock: Arc::new(SystemClock) }
    }

    /// Clock used for token-bucket refill timestamps.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Admit at most `max_requests` calls per `window` for `key`.
    ///
    /// The window starts at the first call: the TTL is set only when the
    /// increment returns 1 and is never extended afterwards.
    pub async fn allow_fixed_window(
        &self,
        key: &str,
        max_requests: u64,
        window: Duration,
    ) -> Result<bool, StoreError> {
        let counter_key = format!("{COUNTER_PREFIX}{key}");
        let count = self.store.incr(&counter_key).await?;
        if count == 1 {
            self.store.expire(&counter_key, window).await?;
        }
        trace!(key, count, max_requests, "fixed window increment");
        Ok(u64::try_from(count).is_ok_and(|count| count <= max_requests))
    }

    /// Take one token from `key`'s bucket if one is available.
    pub async fn allow_token_bucket(
        &self,
        key: &str,
        capacity: u64,
        refill_rate: u64,
        per: Duration,
    ) -> Result<bool, StoreError> {
        Ok(self.take_token(key, capacity, refill_rate, per).await?.is_some())
    }

    /// Returns the tokens left after a successful take, `None` when empty.
    async fn take_token(
        &self,
        key: &str,
        capacity: u64,
        refill_rate: u64,
        per: Duration,
    ) -> Result<Option<u64>, StoreError> {
        let token_key = format!("{TOKEN_PREFIX}{key}");
        let timestamp_key = format!("{TIMESTAMP_PREFIX}{key}");
        let now = self.clock.now_millis();

        let stored_tokens = self.store.get_int(&token_key).await?;
        let stored_refill = self.store.get_int(&timestamp_key).await?;

        let mut tokens = stored_tokens.map_or(capacity, non_negative).min(capacity);
        let last_refill = stored_refill.map_or(now, non_negative);

        let elapsed = now.saturating_sub(last_refill);
        let unit = duration_millis(per).max(1);
        let to_add = u64::try_from(u128::from(elapsed) * u128::from(refill_rate) / u128::from(unit))
            .unwrap_or(u64::MAX);

        if to_add > 0 {
            tokens = capacity.min(tokens.saturating_add(to_add));
        }
        // Fractional refill is dropped when the timestamp moves forward.
        if to_add > 0 || stored_refill.is_none() {
            self.store.set_int(&timestamp_key, to_i64(now), BUCKET_STATE_TTL).await?;
        }

        if tokens == 0 {
            trace!(key, "token bucket empty");
            return Ok(None);
        }
        let left = tokens - 1;
        self.store.set_int(&token_key, to_i64(left), BUCKET_STATE_TTL).await?;
        Ok(Some(left))
    }

    /// Admissions left in `key`'s current fixed window. Informational only.
    pub async fn remaining(&self, key: &str, max_requests: u64) -> Result<u64, StoreError> {
        let counter_key = format!("{COUNTER_PREFIX}{key}");
        let used = self.store.get_int(&counter_key).await?.map_or(0, non_negative);
        Ok(max_requests.saturating_sub(used))
    }

    /// Run `algorithm` for `key`.
    pub async fn check(&self, key: &str, algorithm: &Algorithm) -> Result<Decision, StoreError> {
        match *algorithm {
            Algorithm::FixedWindow { max_requests, window } => {
                if self.allow_fixed_window(key, max_requests, window).await? {
                    let remaining = self.remaining(key, max_requests).await?;
                    Ok(Decision::Allowed { remaining })
                } else {
                    Ok(Decision::Denied { reason: "fixed_window".into() })
                }
            }
            Algorithm::TokenBucket { capacity, refill_rate, per } => {
                match self.take_token(key, capacity, refill_rate, per).await? {
                    Some(remaining) => Ok(Decision::Allowed { remaining }),
                    None => Ok(Decision::Denied { reason: "token_bucket".into() }),
                }
            }
        }
    }
}

fn non_negative(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
