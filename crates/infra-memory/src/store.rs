// In-Memory Store
// One shared store, many cloneable views (one per simulated process)

use crate::distributed_lock::{InMemoryDistributedLock, LockTable};
use crate::message_queue::{InMemoryMessageQueue, QueueTable};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared state standing in for the external queue/lock service.
///
/// Every view handed out by one store sees the same queues and locks, so two
/// coordinators or two supervisors built from one store behave like two
/// processes talking to the same server.
///
/// # Example
/// ```text
/// let store = InMemoryStore::new();
/// let queue = Arc::new(store.message_queue());
/// let lock = Arc::new(store.distributed_lock());
/// ```
#[derive(Clone, Default)]
pub struct InMemoryStore {
    queues: Arc<QueueTable>,
    locks: Arc<LockTable>,
}

impl InMemoryStore {
    /// Store with unbounded queues
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose blocking queues refuse pushes beyond `capacity` items
    pub fn with_queue_capacity(capacity: usize) -> Self {
        Self {
            queues: Arc::new(QueueTable::with_capacity(Some(capacity))),
            locks: Arc::default(),
        }
    }

    pub fn message_queue(&self) -> InMemoryMessageQueue {
        InMemoryMessageQueue::new(Arc::clone(&self.queues))
    }

    pub fn distributed_lock(&self) -> InMemoryDistributedLock {
        InMemoryDistributedLock::new(Arc::clone(&self.locks))
    }
}

/// Lock a std mutex, ignoring poisoning (no critical section here can panic)
pub(crate) fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use redq_core::domain::{Destination, LockOwner};
    use redq_core::port::{DistributedLock, MessageQueue};
    use serde_json::json;

    #[tokio::test]
    async fn test_views_share_state() {
        let store = InMemoryStore::new();
        let (queue_a, queue_b) = (store.message_queue(), store.message_queue());
        let dest = Destination::new("shared");

        queue_a.push(&dest, json!(1)).await.unwrap();
        assert_eq!(queue_b.blocking_pop(&dest).await.unwrap(), json!(1));

        let (lock_a, lock_b) = (store.distributed_lock(), store.distributed_lock());
        let owner = LockOwner::new("a");
        assert!(lock_a.try_acquire("k", &owner, None).await.unwrap());
        assert!(lock_b.is_held_by("k", &owner).await.unwrap());
    }

    #[tokio::test]
    async fn test_separate_stores_are_isolated() {
        let dest = Destination::new("q");
        let first = InMemoryStore::new().message_queue();
        let second = InMemoryStore::new().message_queue();

        first.push(&dest, json!("x")).await.unwrap();
        assert_eq!(first.len(&dest), 1);
        assert_eq!(second.len(&dest), 0);
    }
}
