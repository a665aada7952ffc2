//! Per-key cooldown bookkeeping.
//!
//! Used by the dispatcher (one key per alert type) and by local alerts (one
//! key per cue). Timestamps are passed in rather than read from the clock so
//! tests can move time forward explicitly.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};

/// Last-fired timestamps keyed by `K`. Lives in memory only.
#[derive(Debug, Default)]
pub struct CooldownTracker<K> {
    last_fired: Mutex<HashMap<K, DateTime<Utc>>>,
}

impl<K: Eq + Hash + Copy> CooldownTracker<K> {
    pub fn new() -> Self {
        Self {
            last_fired: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<K, DateTime<Utc>>> {
        self.last_fired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Time left before `key` may fire again, or `None` if it may fire now.
    pub fn remaining(&self, key: K, window: Duration, now: DateTime<Utc>) -> Option<Duration> {
        let last = *self.entries().get(&key)?;
        let elapsed = now - last;
        (elapsed < window).then(|| window - elapsed)
    }

    pub fn is_cooling(&self, key: K, window: Duration, now: DateTime<Utc>) -> bool {
        self.remaining(key, window, now).is_some()
    }

    /// Record that `key` fired at `now`.
    pub fn record(&self, key: K, now: DateTime<Utc>) {
        self.entries().insert(key, now);
    }

    /// Check and record in one step. Returns `false` while cooling down.
    pub fn try_fire(&self, key: K, window: Duration, now: DateTime<Utc>) -> bool {
        let mut entries = self.entries();
        if let Some(last) = entries.get(&key) {
            if now - *last < window {
                return false;
            }
        }
        entries.insert(key, now);
        true
    }
}
