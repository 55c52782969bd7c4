//! Single-flight memo for fallible lookups.
//!
//! Every key owns a slot. The map lock is only held to find or insert a
//! slot; a miss is resolved while holding the slot lock alone, so concurrent
//! misses on one key load once while other keys proceed independently.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

type Slot<V> = Arc<Mutex<Option<V>>>;

/// Memoized values keyed by `K`. Failed loads are not stored.
#[derive(Debug)]
pub(crate) struct Memo<K, V> {
    slots: Mutex<HashMap<K, Slot<V>>>,
}

impl<K: Eq + Hash, V: Clone> Memo<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// The value of `key`, loading it with `load` on a miss.
    ///
    /// A caller that cannot take the slot before `deadline`, because another
    /// caller is still loading it, gets `busy()` instead.
    pub(crate) fn get_or_load<Q, E>(
        &self,
        key: &Q,
        deadline: Instant,
        busy: impl FnOnce() -> E,
        load: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        let slot = self.slot(key);
        let Some(mut value) = slot.try_lock_until(deadline) else {
            return Err(busy());
        };
        if let Some(value) = value.as_ref() {
            return Ok(value.clone());
        }

        let loaded = load()?;
        *value = Some(loaded.clone());
        Ok(loaded)
    }

    fn slot<Q>(&self, key: &Q) -> Slot<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get(key) {
            return Arc::clone(slot);
        }
        Arc::clone(slots.entry(key.to_owned()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    fn soon() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[test]
    fn test_should_load_once_and_keep_value() {
        let memo = Memo::<&str, u32>::new();
        let loads = AtomicUsize::new(0);
        for _ in 0..3 {
            let value = memo.get_or_load(
                &"a",
                soon(),
                || "busy",
                || {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                },
            );
            assert_eq!(value, Ok(7));
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_should_not_store_failed_load() {
        let memo = Memo::<&str, u32>::new();
        assert_eq!(memo.get_or_load(&"a", soon(), || "busy", || Err("down")), Err("down"));
        assert_eq!(memo.get_or_load(&"a", soon(), || "busy", || Ok(1)), Ok(1));
    }

    #[test]
    fn test_should_give_up_waiting_for_a_slow_loader() {
        let memo = Arc::new(Memo::<&str, u32>::new());

        let loader = {
            let memo = Arc::clone(&memo);
            std::thread::spawn(move || {
                memo.get_or_load(&"a", soon(), || "busy", || {
                    std::thread::sleep(Duration::from_millis(200));
                    Ok(1)
                })
            })
        };
        std::thread::sleep(Duration::from_millis(20));

        let deadline = Instant::now() + Duration::from_millis(20);
        assert_eq!(memo.get_or_load(&"a", deadline, || "busy", || Ok(2)), Err("busy"));

        let started = Instant::now();
        assert_eq!(memo.get_or_load(&"b", soon(), || "busy", || Ok(3)), Ok(3));
        assert!(started.elapsed() < Duration::from_millis(100));

        assert_eq!(loader.join().unwrap(), Ok(1));
    }
}
