//! Per-group exclusive locks.
//!
//! One async mutex per group id, created on first use. The map only keeps a
//! `Weak` handle, so a group's lock is dropped as soon as no task holds or
//! waits on it; dead entries are pruned once the map grows past a threshold.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::core::GroupId;

pub struct GroupLocks {
    locks: StdMutex<HashMap<GroupId, Weak<Mutex<()>>>>,
    prune_threshold: usize,
}

impl GroupLocks {
    pub fn new(prune_threshold: usize) -> Self {
        Self {
            locks: StdMutex::new(HashMap::new()),
            prune_threshold,
        }
    }

    /// Wait for exclusive access to `group_id`.
    pub async fn acquire(&self, group_id: &GroupId) -> OwnedMutexGuard<()> {
        self.handle(group_id).lock_owned().await
    }

    /// Whether some task currently holds `group_id`'s lock.
    pub fn is_locked(&self, group_id: &GroupId) -> bool {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(group_id)
            .and_then(Weak::upgrade)
            .is_some_and(|lock| {
                let held = lock.try_lock().is_err();
                held
            })
    }

    /// Number of groups with a live lock.
    pub fn live(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|lock| lock.strong_count() > 0)
            .count()
    }

    fn handle(&self, group_id: &GroupId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = locks.get(group_id).and_then(Weak::upgrade) {
            return lock;
        }

        if locks.len() >= self.prune_threshold {
            locks.retain(|_, lock| lock.strong_count() > 0);
        }

        let lock = Arc::new(Mutex::new(()));
        locks.insert(group_id.clone(), Arc::downgrade(&lock));
        lock
    }
}

impl Default for GroupLocks {
    fn default() -> Self {
        Self::new(1024)
    }
}
