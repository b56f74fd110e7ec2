//! Non-blocking per-key mutual exclusion.
//!
//! A reconciliation pass claims its key before touching the platform;
//! a second trigger for the same key is dropped, never queued. The
//! guard releases the key on drop, covering early returns and error
//! paths alike.

use dashmap::DashSet;
use std::hash::Hash;

/// Set of currently-busy keys with acquire-or-skip semantics.
pub struct InFlight<K: Eq + Hash> {
    active: DashSet<K>,
}

impl<K: Eq + Hash + Clone> InFlight<K> {
    pub fn new() -> Self {
        Self {
            active: DashSet::new(),
        }
    }

    /// Claim `key` for one pass. Returns `None` when a pass for the
    /// same key is already running.
    pub fn try_acquire(&self, key: K) -> Option<InFlightGuard<'_, K>> {
        if self.active.insert(key.clone()) {
            Some(InFlightGuard { owner: self, key })
        } else {
            None
        }
    }

    /// Whether a pass currently holds `key`.
    pub fn is_active(&self, key: &K) -> bool {
        self.active.contains(key)
    }
}

impl<K: Eq + Hash + Clone> Default for InFlight<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds a claimed key; dropping it releases the key.
pub struct InFlightGuard<'a, K: Eq + Hash> {
    owner: &'a InFlight<K>,
    key: K,
}

impl<K: Eq + Hash> Drop for InFlightGuard<'_, K> {
    fn drop(&mut self) {
        self.owner.active.remove(&self.key);
    }
}
