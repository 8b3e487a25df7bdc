//! Per-entry concurrency control.
//!
//! Only one execution runs per entry at a time.  A second request while one
//! is in flight is rejected, never queued.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::CanvasError;

/// Each key maps to a `Semaphore(1)`.  Holding the permit marks the key as
/// busy; dropping it releases.
pub struct RunLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for RunLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Take the lock for `key` without waiting.
    ///
    /// The permit is taken under the map lock so `prune_idle` never sees the
    /// semaphore idle between lookup and acquisition.
    pub fn try_acquire(&self, key: &str) -> Result<OwnedSemaphorePermit, CanvasError> {
        let mut locks = self.locks.lock();
        let sem = locks
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone();
        let permit = sem
            .try_acquire_owned()
            .map_err(|_| CanvasError::EntryBusy(key.to_owned()));
        drop(locks);
        permit
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.locks
            .lock()
            .get(key)
            .is_some_and(|sem| sem.available_permits() == 0)
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }

    /// Forget locks nobody holds.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0);
    }
}
