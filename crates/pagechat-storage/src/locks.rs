//! Keyed async locks.
//!
//! `SessionLocks` serializes chat turns per session; `DocumentLocks` lets
//! document deletion wait out in-flight chat commits on the same document.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use pagechat_core::types::{DocumentId, SessionId};

/// Idle entries are swept once the map grows past this many keys.
const PRUNE_THRESHOLD: usize = 256;

/// A map from key to a shared lock of type `L`, created on first use.
pub struct KeyedLocks<K, L> {
    inner: Mutex<HashMap<K, Arc<L>>>,
}

/// Per-session FIFO mutexes.
pub type SessionLocks = KeyedLocks<SessionId, tokio::sync::Mutex<()>>;

/// Per-document reader/writer locks: chat commits read, deletion writes.
pub type DocumentLocks = KeyedLocks<DocumentId, tokio::sync::RwLock<()>>;

impl<K, L> Default for KeyedLocks<K, L> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, L> KeyedLocks<K, L>
where
    K: Eq + Hash + Clone,
    L: Default,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for `key`, created if absent.
    ///
    /// Callers lock the returned handle with the `*_owned` tokio methods so
    /// the guard keeps the lock alive even if the entry is swept.
    pub fn handle(&self, key: &K) -> Arc<L> {
        // The map holds no invariant a panicking holder could break.
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if map.len() >= PRUNE_THRESHOLD {
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        Arc::clone(map.entry(key.clone()).or_default())
    }

    /// Drop the entry for `key` unless a handle to it is still outstanding.
    ///
    /// A queued waiter keeps its handle, so removing a shared entry would let
    /// the next caller for the same key run beside it.
    pub fn forget(&self, key: &K) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if map.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            map.remove(key);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
