//! Per-post operation locks.
//!
//! [`OpLocks`] is a registry of exclusive locks keyed by [`PostKey`]. Blocking
//! callers (draft save, publish, author change) park in a FIFO wait queue
//! until the holder releases; autosave uses [`OpLocks::try_acquire`] and skips
//! its tick when the post is busy.
//!
//! A held lock is represented by an [`OpGuard`]. Dropping the guard releases
//! the lock, so every exit path of an operation (including `?` and panics)
//! releases exactly once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as KeyMutex, OwnedMutexGuard};

use crate::types::PostKey;

type Table = HashMap<PostKey, Arc<KeyMutex<()>>>;

/// Registry of per-post exclusive locks.
///
/// Cloning is cheap and clones share the same table. Entries are removed
/// when the last holder or waiter goes away, so idle posts cost nothing.
#[derive(Clone, Default)]
pub struct OpLocks {
    table: Arc<Mutex<Table>>,
}

impl OpLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether some operation currently holds the lock for `key`.
    pub fn is_locked(&self, key: &PostKey) -> bool {
        self.table()
            .get(key)
            .is_some_and(|entry| entry.try_lock().is_err())
    }

    /// Wait until the lock for `key` is free and take it.
    ///
    /// Waiters are served in arrival order.
    pub async fn acquire(&self, key: &PostKey) -> OpGuard {
        let entry = self.entry(key);
        if entry.try_lock().is_err() {
            log::debug!("waiting for op lock on {}", key);
        }
        let guard = entry.lock_owned().await;
        log::debug!("acquired op lock on {}", key);
        OpGuard::new(self.clone(), key.clone(), guard)
    }

    /// Take the lock for `key` only if nobody holds it.
    pub fn try_acquire(&self, key: &PostKey) -> Option<OpGuard> {
        let guard = self.entry(key).try_lock_owned().ok()?;
        Some(OpGuard::new(self.clone(), key.clone(), guard))
    }

    /// Number of posts with a holder or waiter.
    pub fn active(&self) -> usize {
        self.table().len()
    }

    fn entry(&self, key: &PostKey) -> Arc<KeyMutex<()>> {
        self.table()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(KeyMutex::new(())))
            .clone()
    }

    /// Drop the table entry for `key` if only the table still references it.
    fn prune(&self, key: &PostKey) {
        let mut table = self.table();
        if table
            .get(key)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            table.remove(key);
        }
    }
}

impl std::fmt::Debug for OpLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpLocks")
            .field("active", &self.active())
            .finish()
    }
}

/// Proof of holding the op lock for one post.
#[must_use = "the op lock is released as soon as the guard is dropped"]
pub struct OpGuard {
    locks: OpLocks,
    key: PostKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl OpGuard {
    fn new(locks: OpLocks, key: PostKey, guard: OwnedMutexGuard<()>) -> Self {
        Self {
            locks,
            key,
            guard: Some(guard),
        }
    }

    /// The post this guard locks.
    pub fn key(&self) -> &PostKey {
        &self.key
    }

    /// Release the lock now. Equivalent to dropping the guard.
    pub fn release(self) {}
}

impl Drop for OpGuard {
    fn drop(&mut self) {
        if self.guard.take().is_some() {
            log::debug!("released op lock on {}", self.key);
        }
        self.locks.prune(&self.key);
    }
}

impl std::fmt::Debug for OpGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpGuard").field("key", &self.key).finish()
    }
}
