// Distributed Lock Port (Interface)

use crate::domain::LockOwner;
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Cluster-wide exclusive lock, addressed by name.
///
/// Ownership is proven with a [`LockOwner`] token instead of the calling
/// thread, since protected work may hop threads between await points.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Try to take the lock for `owner`.
    ///
    /// `wait = None` makes a single non-blocking attempt; `Some(d)` waits up
    /// to `d` for the current holder to let go.
    async fn try_acquire(
        &self,
        name: &str,
        owner: &LockOwner,
        wait: Option<Duration>,
    ) -> Result<bool>;

    /// Release a lock held by `owner`
    async fn release(&self, name: &str, owner: &LockOwner) -> Result<()>;

    /// Check whether `owner` currently holds the lock
    async fn is_held_by(&self, name: &str, owner: &LockOwner) -> Result<bool>;
}
