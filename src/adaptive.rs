//! Live-updatable shared values.
//!
//! The admission policy table lives in a [`DynamicConfig`] so operators can
//! swap limits without rebuilding the gate. Reads are lock-free (`ArcSwap`);
//! a request that already loaded a snapshot keeps using it to the end.

use arc_swap::ArcSwap;
use std::sync::Arc;

/// `DynamicConfig<T>` gives cheap reads and controlled updates for shared config.
#[derive(Debug)]
pub struct DynamicConfig<T> {
    inner: Arc<ArcSwap<T>>,
}

impl<T> Clone for DynamicConfig<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T> DynamicConfig<T> {
    pub fn new(value: T) -> Self {
        Self { inner: Arc::new(ArcSwap::from_pointee(value)) }
    }

    /// Snapshot the current value.
    pub fn get(&self) -> Arc<T> {
        self.inner.load_full()
    }

    /// Replace the value, returning the one it displaced.
    pub fn replace(&self, value: T) -> Arc<T> {
        self.inner.swap(Arc::new(value))
    }

    /// Derive a new value from the current one.
    ///
    /// Concurrent updaters race; the last store wins.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.inner.load_full();
        self.inner.store(Arc::new(f(&current)));
    }
}

#[cfg(test)]
mod tests {
    use super::DynamicConfig;
    use std::collections::HashMap;

    #[test]
    fn snapshots_survive_replacement() {
        let limits = DynamicConfig::new(HashMap::from([("chat", 5u64)]));
        let before = limits.get();

        let displaced = limits.replace(HashMap::from([("chat", 50u64)]));
        assert_eq!(displaced["chat"], 5);
        assert_eq!(before["chat"], 5);
        assert_eq!(limits.get()["chat"], 50);
    }

    #[test]
    fn update_is_visible_through_clones() {
        let limits = DynamicConfig::new(10u64);
        let view = limits.clone();
        limits.update(|max| max * 2);
        assert_eq!(*view.get(), 20);
    }
}
