//! Concurrent once-per-key cache shared by the engine's lazy tables.
//!
//! Each key owns its own [`OnceLock`] cell: readers take a lock-free fast
//! path once the cell is filled, and initialization blocks only callers
//! racing on the same key. The map shard lock is released before the
//! initializer runs, so initializers may consult other keys.

use std::hash::Hash;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

#[derive(Debug)]
pub(crate) struct OnceMap<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, Arc<OnceLock<V>>>,
}

impl<K, V> OnceMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub(crate) fn new() -> Self {
        OnceMap {
            entries: DashMap::new(),
        }
    }

    /// Returns the cached value for `key`, running `init` at most once per key.
    pub(crate) fn get_or_init(&self, key: K, init: impl FnOnce() -> V) -> V {
        if let Some(value) = self.get(&key) {
            return value;
        }
        let cell = self.entries.entry(key).or_default().clone();
        cell.get_or_init(init).clone()
    }

    /// The cached value, if `key` has been initialized.
    pub(crate) fn get(&self, key: &K) -> Option<V> {
        self.entries
            .get(key)
            .and_then(|cell| cell.value().get().cloned())
    }

    /// Number of initialized entries.
    pub(crate) fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().get().is_some())
            .count()
    }
}

impl<K, V> Default for OnceMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
