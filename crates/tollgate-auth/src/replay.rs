//! OAuth nonce replay protection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Number of recorded nonces between two sweeps of expired entries.
pub const DEFAULT_PURGE_INTERVAL: usize = 1024;

/// Remembers (consumer, nonce, timestamp) triples until their timestamp
/// falls out of the accepted window.
///
/// Expired entries are swept every [`DEFAULT_PURGE_INTERVAL`] recorded
/// nonces, or on demand through [`ReplayGuard::purge_expired`].
#[derive(Debug)]
pub struct ReplayGuard {
    window_secs: i64,
    purge_interval: usize,
    recorded: AtomicUsize,
    seen: DashMap<(String, String, i64), i64>,
}

impl ReplayGuard {
    /// Create a guard for timestamps accepted within `window` of now.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window_secs: i64::try_from(window.as_secs()).unwrap_or(i64::MAX),
            purge_interval: DEFAULT_PURGE_INTERVAL,
            recorded: AtomicUsize::new(0),
            seen: DashMap::new(),
        }
    }

    /// Sweep expired entries every `interval` recorded nonces instead.
    #[must_use]
    pub fn with_purge_interval(mut self, interval: usize) -> Self {
        self.purge_interval = interval.max(1);
        self
    }

    /// Record a nonce. Returns `false` if it was already used.
    ///
    /// A remembered entry that has already expired does not count as a
    /// replay.
    pub fn check_and_record(
        &self,
        consumer_key: &str,
        nonce: &str,
        timestamp: i64,
        now_secs: i64,
    ) -> bool {
        let expires_at = timestamp.saturating_add(self.window_secs);
        let key = (consumer_key.to_owned(), nonce.to_owned(), timestamp);
        let fresh = match self.seen.entry(key) {
            Entry::Occupied(mut entry) => {
                if *entry.get() > now_secs {
                    return false;
                }
                entry.insert(expires_at);
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(expires_at);
                true
            }
        };

        let recorded = self.recorded.fetch_add(1, Ordering::Relaxed) + 1;
        if recorded % self.purge_interval == 0 {
            self.purge_expired(now_secs);
        }
        fresh
    }

    /// Forget every entry whose timestamp has left the window. Returns the
    /// number forgotten.
    pub fn purge_expired(&self, now_secs: i64) -> usize {
        let before = self.seen.len();
        self.seen.retain(|_, expires_at| *expires_at > now_secs);
        before.saturating_sub(self.seen.len())
    }

    /// Number of remembered nonces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether no nonce is remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
