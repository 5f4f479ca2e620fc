//! Per-discussion synchronization locks.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Keeps at most one synchronization pass per discussion in flight.
///
/// A second caller for the same discussion waits for the first to finish;
/// different discussions never block each other. Entries only live while a
/// pass holds or waits for them, once [`DiscussionLocks::release`] is called.
#[derive(Debug, Default)]
pub struct DiscussionLocks {
    locks: RwLock<HashMap<i64, Arc<Mutex<()>>>>,
}

impl DiscussionLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to the discussion. Released when the guard drops.
    pub async fn acquire(&self, discussion_id: i64) -> OwnedMutexGuard<()> {
        self.get_or_create(discussion_id).await.lock_owned().await
    }

    /// Forget the discussion's lock if no pass holds or waits for it.
    ///
    /// Call after dropping the guard from [`DiscussionLocks::acquire`].
    pub async fn release(&self, discussion_id: i64) {
        let mut locks = self.locks.write().await;
        // The map's own reference is the only one left.
        if locks
            .get(&discussion_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&discussion_id);
        }
    }

    async fn get_or_create(&self, discussion_id: i64) -> Arc<Mutex<()>> {
        // Fast path: check if lock exists
        {
            let read_guard = self.locks.read().await;
            if let Some(lock) = read_guard.get(&discussion_id) {
                return Arc::clone(lock);
            }
        }

        let mut write_guard = self.locks.write().await;
        // Another task may have created it while we waited for the write lock
        if let Some(lock) = write_guard.get(&discussion_id) {
            return Arc::clone(lock);
        }

        let lock = Arc::new(Mutex::new(()));
        write_guard.insert(discussion_id, Arc::clone(&lock));
        lock
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.locks.read().await.len()
    }
}
