//! Per-module, per-consumer state management.
//!
//! Provides [`ModuleConsumerStore`], a thread-safe concurrent store that
//! partitions state by module name and consumer key. Entries can carry their
//! own notion of liveness: a stale entry is replaced in place on the next
//! access, under the same shard lock that guards creation.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::types::{ConsumerKey, ModuleName};

/// Thread-safe store keyed by (module, consumer).
///
/// Construction of a value happens at most once per key at a time: the
/// creating closure runs while the key's shard is locked, so concurrent
/// callers for the same key all receive the same instance.
///
/// # Examples
///
/// ```
/// use tollgate_core::{ConsumerKey, ModuleConsumerStore, ModuleName};
///
/// let store = ModuleConsumerStore::<u32>::new();
/// let module = ModuleName::new("billing").unwrap();
/// let consumer = ConsumerKey::new("c1");
///
/// let value = store.get_or_create_with(&module, &consumer, |_| true, || 7);
/// assert_eq!(*value, 7);
/// assert_eq!(store.len(), 1);
/// ```
#[derive(Debug)]
pub struct ModuleConsumerStore<T: Send + Sync> {
    inner: DashMap<(ModuleName, ConsumerKey), Arc<T>>,
}

impl<T: Send + Sync> ModuleConsumerStore<T> {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    /// Get the live state for the given module and consumer, creating it if
    /// it is missing or if `is_live` rejects the existing instance.
    pub fn get_or_create_with(
        &self,
        module: &ModuleName,
        consumer: &ConsumerKey,
        is_live: impl Fn(&T) -> bool,
        create: impl FnOnce() -> T,
    ) -> Arc<T> {
        match self.inner.entry((module.clone(), consumer.clone())) {
            Entry::Occupied(mut entry) => {
                if is_live(entry.get()) {
                    Arc::clone(entry.get())
                } else {
                    let fresh = Arc::new(create());
                    entry.insert(Arc::clone(&fresh));
                    fresh
                }
            }
            Entry::Vacant(entry) => Arc::clone(entry.insert(Arc::new(create())).value()),
        }
    }

    /// Remove every entry that belongs to `module`. Returns the number removed.
    pub fn remove_module(&self, module: &ModuleName) -> usize {
        self.retain(|m, _, _| m != module)
    }

    /// Keep only the entries for which `keep` returns `true`. Returns the
    /// number of entries removed.
    pub fn retain(&self, mut keep: impl FnMut(&ModuleName, &ConsumerKey, &T) -> bool) -> usize {
        let mut removed = 0;
        self.inner.retain(|(module, consumer), value| {
            let kept = keep(module, consumer, &**value);
            if !kept {
                removed += 1;
            }
            kept
        });
        removed
    }

    /// Reset all state in the store.
    pub fn reset(&self) {
        self.inner.clear();
    }

    /// Number of (module, consumer) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<T: Send + Sync> Default for ModuleConsumerStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
