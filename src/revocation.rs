//! Process-wide registry of revoked bearer tokens.
//!
//! A token stays revoked until the expiry it carries itself: once the token
//! would be rejected for being expired anyway, the entry is useless and is
//! dropped. Lookups evict expired entries lazily, so correctness never
//! depends on the sweeper; [`RevocationStore::spawn_sweeper`] only reclaims
//! memory for tokens nobody asks about again.
//!
//! ```
//! use chatgate::revocation::RevocationStore;
//!
//! let store = RevocationStore::new();
//! store.revoke("opaque-session-token");
//! assert!(store.is_revoked("opaque-session-token"));
//! assert!(!store.is_revoked("some-other-token"));
//! ```

use crate::clock::{duration_millis, Clock, SystemClock};
use crate::sweeper::{self, Sweep, SweeperHandle};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Lifetime given to tokens whose expiry cannot be read.
pub const DEFAULT_REVOCATION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug)]
pub struct RevocationStore {
    entries: DashMap<String, u64>,
    clock: Arc<dyn Clock>,
}

impl Default for RevocationStore {
    fn default() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl RevocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock<C: Clock + 'static>(clock: C) -> Self {
        Self { entries: DashMap::new(), clock: Arc::new(clock) }
    }

    /// Revoke `token` until its natural expiry.
    ///
    /// JWTs are revoked until their `exp` claim; anything else for
    /// [`DEFAULT_REVOCATION_TTL`]. A JWT that has already expired is not
    /// recorded since it can no longer authenticate. Revoking again
    /// overwrites the previous expiry.
    pub fn revoke(&self, token: &str) {
        let now = self.clock.now_millis();
        let expires_at = match token_expiry_millis(token) {
            Some(expiry) if expiry <= now => {
                debug!(target: "chatgate::revocation", "token already expired, not recorded");
                return;
            }
            Some(expiry) => expiry,
            None => now.saturating_add(duration_millis(DEFAULT_REVOCATION_TTL)),
        };
        self.entries.insert(token.to_string(), expires_at);
        info!(target: "chatgate::revocation", expires_at, "token revoked");
    }

    pub fn is_revoked(&self, token: &str) -> bool {
        let now = self.clock.now_millis();
        let expires_at = match self.entries.get(token) {
            Some(entry) => *entry,
            None => return false,
        };
        if expires_at > now {
            return true;
        }
        // Only drop the entry if it was not re-revoked in the meantime.
        self.entries.remove_if(token, |_, expiry| *expiry <= now);
        false
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_millis();
        let mut removed = 0;
        self.entries.retain(|_, expiry| {
            let keep = *expiry > now;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sweep every `interval` on the current tokio runtime.
    ///
    /// The task exits once the store is dropped. Dropping the handle stops
    /// it as well.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> SweeperHandle {
        sweeper::spawn_sweeper(self, interval)
    }
}

impl Sweep for RevocationStore {
    const NAME: &'static str = "revocations";

    fn purge_expired(&self) -> usize {
        self.sweep()
    }
}

#[derive(Deserialize)]
struct ExpiryClaim {
    exp: Option<u64>,
}

/// Expiry of a JWT in epoch millis, read from the unverified payload.
///
/// Only the `exp` claim is consulted; the signature is irrelevant for
/// deciding how long to remember a revocation.
pub fn token_expiry_millis(token: &str) -> Option<u64> {
    let mut segments = token.split('.');
    let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claim: ExpiryClaim = serde_json::from_slice(&bytes).ok()?;
    claim.exp?.checked_mul(1_000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn jwt_with_exp(exp_secs: u64) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"alice","exp":{exp_secs}}}"#));
        format!("{header}.{payload}.c2lnbmF0dXJl")
    }

    #[test]
    fn reads_exp_claim() {
        assert_eq!(token_expiry_millis(&jwt_with_exp(1_700_000_000)), Some(1_700_000_000_000));
        assert_eq!(token_expiry_millis("not-a-jwt"), None);
        assert_eq!(token_expiry_millis("a.%%%.c"), None);
    }

    #[test]
    fn opaque_tokens_get_default_lifetime() {
        let clock = ManualClock::new(0);
        let store = RevocationStore::with_clock(clock.clone());
        store.revoke("tok-A");

        clock.advance(DEFAULT_REVOCATION_TTL - Duration::from_millis(1));
        assert!(store.is_revoked("tok-A"));
        clock.advance(Duration::from_millis(1));
        assert!(!store.is_revoked("tok-A"));
        assert!(store.is_empty());
    }

    #[test]
    fn jwt_revocation_ends_at_exp() {
        let clock = ManualClock::new(1_000_000);
        let store = RevocationStore::with_clock(clock.clone());
        let token = jwt_with_exp(1_060);
        store.revoke(&token);

        assert!(store.is_revoked(&token));
        clock.set(1_060_000);
        assert!(!store.is_revoked(&token));
    }

    #[test]
    fn already_expired_jwt_is_not_recorded() {
        let clock = ManualClock::new(5_000_000);
        let store = RevocationStore::with_clock(clock);
        store.revoke(&jwt_with_exp(10));
        assert!(store.is_empty());
    }

    #[test]
    fn sweep_drops_only_expired_entries() {
        let clock = ManualClock::new(0);
        let store = RevocationStore::with_clock(clock.clone());
        store.revoke(&jwt_with_exp(10));
        store.revoke(&jwt_with_exp(100));
        store.revoke("opaque");

        clock.set(50_000);
        assert_eq!(store.sweep(), 1);
        assert_eq!(store.len(), 2);
    }
}
