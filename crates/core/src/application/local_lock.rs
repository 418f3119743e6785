// Process-local lock table
// One async mutex per lock name, created on first use and dropped when idle

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Entry = Arc<Mutex<()>>;

/// Lock-name -> mutex table shared by every caller in the process.
///
/// Entries are fetched-or-created and removed under the map's shard lock, and
/// an entry is only removed while the table holds the last reference to it.
/// A caller that already cloned the entry (waiting or holding) keeps it alive,
/// so no caller can end up locking an orphaned mutex.
#[derive(Default)]
pub struct LocalLockRegistry {
    entries: DashMap<String, Entry>,
}

/// Held local lock. Dropping it unlocks and removes the entry if nobody else
/// is using it.
pub struct LocalLockGuard<'a> {
    registry: &'a LocalLockRegistry,
    name: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for LocalLockGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.registry.remove_if_idle(&self.name);
    }
}

impl LocalLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single non-blocking attempt
    pub fn try_lock(&self, name: &str) -> Option<LocalLockGuard<'_>> {
        let entry = self.entry(name);
        let attempt = Arc::clone(&entry).try_lock_owned();
        drop(entry);
        match attempt {
            Ok(guard) => Some(self.guard(name, guard)),
            Err(_) => {
                self.remove_if_idle(name);
                None
            }
        }
    }

    /// Wait up to `wait` for the lock
    pub async fn lock_timeout(&self, name: &str, wait: Duration) -> Option<LocalLockGuard<'_>> {
        let entry = self.entry(name);
        let attempt = tokio::time::timeout(wait, Arc::clone(&entry).lock_owned()).await;
        drop(entry);
        match attempt {
            Ok(guard) => Some(self.guard(name, guard)),
            Err(_) => {
                self.remove_if_idle(name);
                None
            }
        }
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, name: &str) -> Entry {
        Arc::clone(
            self.entries
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    fn guard(&self, name: &str, guard: OwnedMutexGuard<()>) -> LocalLockGuard<'_> {
        LocalLockGuard {
            registry: self,
            name: name.to_string(),
            guard: Some(guard),
        }
    }

    fn remove_if_idle(&self, name: &str) {
        self.entries
            .remove_if(name, |_, entry| Arc::strong_count(entry) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_lock_excludes_second_holder() {
        let registry = LocalLockRegistry::new();

        let first = registry.try_lock("orders").expect("free lock");
        assert!(registry.try_lock("orders").is_none());
        assert!(registry.try_lock("invoices").is_some());

        drop(first);
        assert!(registry.try_lock("orders").is_some());
    }

    #[test]
    fn test_entries_removed_when_idle() {
        let registry = LocalLockRegistry::new();

        for i in 0..100 {
            let guard = registry.try_lock(&format!("key-{}", i % 5)).unwrap();
            assert_eq!(registry.len(), 1);
            drop(guard);
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_failed_attempt_keeps_holders_entry() {
        let registry = LocalLockRegistry::new();
        let held = registry.try_lock("orders").unwrap();

        assert!(registry.try_lock("orders").is_none());
        assert_eq!(registry.len(), 1, "holder's entry must survive a failed attempt");

        drop(held);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_lock_timeout_waits_for_release() {
        let registry = Arc::new(LocalLockRegistry::new());
        let held = registry.try_lock("orders").unwrap();

        let waiter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                registry
                    .lock_timeout("orders", Duration::from_secs(2))
                    .await
                    .is_some()
            })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        // the waiter holds a reference, so releasing must not drop the entry
        drop(held);
        assert!(waiter.await.unwrap());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_lock_timeout_gives_up() {
        let registry = LocalLockRegistry::new();
        let _held = registry.try_lock("orders").unwrap();

        let started = std::time::Instant::now();
        assert!(registry
            .lock_timeout("orders", Duration::from_millis(50))
            .await
            .is_none());
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(registry.len(), 1);
    }
}
