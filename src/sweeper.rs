//! Background reclamation of expired entries in the in-process stores.
//!
//! Reads already treat expired entries as absent, so sweeping never changes
//! an answer. It only bounds memory held by keys nobody touches again.

use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// A store whose expired entries can be dropped in bulk.
pub trait Sweep: Send + Sync + 'static {
    /// Name used in sweep logs.
    const NAME: &'static str;

    /// Remove every expired entry, returning how many were dropped.
    fn purge_expired(&self) -> usize;
}

/// Purge `store` every `interval` on the current tokio runtime.
///
/// The task holds only a weak reference and exits once `store` is dropped.
/// Dropping the handle stops it as well.
pub fn spawn_sweeper<S: Sweep>(store: &Arc<S>, interval: Duration) -> SweeperHandle {
    let task = tokio::spawn(sweep_loop(Arc::downgrade(store), interval));
    SweeperHandle { task }
}

async fn sweep_loop<S: Sweep>(weak: Weak<S>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(store) = weak.upgrade() else {
            break;
        };
        let removed = store.purge_expired();
        if removed > 0 {
            debug!(target: "chatgate::sweeper", store = S::NAME, removed, "swept expired entries");
        }
    }
}

/// Stops the background sweeper when shut down or dropped.
#[derive(Debug)]
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn shutdown(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
