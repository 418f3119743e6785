// In-Memory DistributedLock Implementation

use crate::store::locked;
use async_trait::async_trait;
use redq_core::domain::LockOwner;
use redq_core::error::{AppError, Result};
use redq_core::port::DistributedLock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Default)]
pub(crate) struct LockTable {
    holders: Mutex<HashMap<String, LockOwner>>,
    released: Notify,
}

impl LockTable {
    /// Take `name` for `owner` if free. An owner asking again keeps it.
    fn try_take(&self, name: &str, owner: &LockOwner) -> bool {
        let mut holders = locked(&self.holders);
        match holders.get(name) {
            Some(holder) => holder == owner,
            None => {
                holders.insert(name.to_string(), owner.clone());
                true
            }
        }
    }
}

/// [`DistributedLock`] view over an [`InMemoryStore`](crate::InMemoryStore)
#[derive(Clone)]
pub struct InMemoryDistributedLock {
    table: Arc<LockTable>,
}

impl InMemoryDistributedLock {
    pub(crate) fn new(table: Arc<LockTable>) -> Self {
        Self { table }
    }

    /// Number of names currently held
    pub fn held_count(&self) -> usize {
        locked(&self.table.holders).len()
    }
}

#[async_trait]
impl DistributedLock for InMemoryDistributedLock {
    async fn try_acquire(
        &self,
        name: &str,
        owner: &LockOwner,
        wait: Option<Duration>,
    ) -> Result<bool> {
        let Some(wait) = wait else {
            return Ok(self.table.try_take(name, owner));
        };
        // None past the clock's range: wait without a deadline
        let deadline = Instant::now().checked_add(wait);
        loop {
            let released = self.table.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            if self.table.try_take(name, owner) {
                return Ok(true);
            }
            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return Ok(false);
                    }
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => {}
                        _ = &mut released => {}
                    }
                }
                None => released.await,
            }
        }
    }

    async fn release(&self, name: &str, owner: &LockOwner) -> Result<()> {
        {
            let mut holders = locked(&self.table.holders);
            match holders.get(name) {
                Some(holder) if holder == owner => {
                    holders.remove(name);
                }
                Some(_) => {
                    return Err(AppError::LockBackend(format!(
                        "lock '{}' is held by another owner, {} cannot release it",
                        name, owner
                    )));
                }
                None => {
                    return Err(AppError::LockBackend(format!(
                        "lock '{}' is not held",
                        name
                    )));
                }
            }
        }
        self.table.released.notify_waiters();
        Ok(())
    }

    async fn is_held_by(&self, name: &str, owner: &LockOwner) -> Result<bool> {
        Ok(locked(&self.table.holders).get(name) == Some(owner))
    }
}
