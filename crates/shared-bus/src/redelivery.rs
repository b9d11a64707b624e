//! # Redelivery Filter
//!
//! The bus delivers at least once. Consumers that must act once per message
//! remember the keys they have processed for a bounded window and drop
//! repeats.
//!
//! - Keys are remembered for `window` after first sight
//! - Expired keys are garbage-collected on insert, at most once per `gc_interval`
//! - A key seen again after its window has lapsed counts as fresh

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Time-bounded set of processed keys.
pub struct RedeliveryFilter<K> {
    state: Mutex<FilterState<K>>,

    /// How long a key is remembered.
    window: Duration,

    /// Minimum time between garbage collections.
    gc_interval: Duration,
}

struct FilterState<K> {
    /// Key -> instant it was first seen.
    seen: HashMap<K, Instant>,
    last_gc: Instant,
}

impl<K: Hash + Eq> RedeliveryFilter<K> {
    /// Default window: two minutes.
    pub const DEFAULT_WINDOW: Duration = Duration::from_secs(120);

    /// Default garbage collection interval.
    pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(10);

    /// Create a filter with the default window.
    #[must_use]
    pub fn new() -> Self {
        Self::with_window(Self::DEFAULT_WINDOW)
    }

    /// Create a filter remembering keys for `window`.
    #[must_use]
    pub fn with_window(window: Duration) -> Self {
        Self::with_config(window, Self::DEFAULT_GC_INTERVAL.min(window))
    }

    /// Create a filter with custom settings.
    #[must_use]
    pub fn with_config(window: Duration, gc_interval: Duration) -> Self {
        Self {
            state: Mutex::new(FilterState {
                seen: HashMap::new(),
                last_gc: Instant::now(),
            }),
            window,
            gc_interval,
        }
    }

    /// Record `key` as processed.
    ///
    /// # Returns
    ///
    /// - `true` if the key is fresh and should be processed
    /// - `false` if it was already processed within the window
    pub fn check_and_insert(&self, key: K) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock();

        if now.duration_since(state.last_gc) >= self.gc_interval {
            let window = self.window;
            state.seen.retain(|_, first_seen| now.duration_since(*first_seen) < window);
            state.last_gc = now;
        }

        if let Some(first_seen) = state.seen.get(&key) {
            if now.duration_since(*first_seen) < self.window {
                return false;
            }
        }

        state.seen.insert(key, now);
        true
    }

    /// Check if a key is remembered without recording it.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        let now = Instant::now();
        self.state
            .lock()
            .seen
            .get(key)
            .is_some_and(|first_seen| now.duration_since(*first_seen) < self.window)
    }

    /// Forget `key` so its next sighting counts as fresh.
    ///
    /// Used when processing failed after the key was recorded.
    pub fn forget(&self, key: &K) -> bool {
        self.state.lock().seen.remove(key).is_some()
    }

    /// Get the number of remembered keys (including expired ones not yet collected).
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().seen.len()
    }

    /// Check if the filter is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The configured window.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }
}

impl<K: Hash + Eq> Default for RedeliveryFilter<K> {
    fn default() -> Self {
        Self::new()
    }
}
