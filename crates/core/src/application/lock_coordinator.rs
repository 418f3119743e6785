// Lock Coordinator
// Local mutex in front of the cluster-wide lock of the same name

use crate::application::local_lock::LocalLockRegistry;
use crate::application::panic_guard::catch_panic;
use crate::domain::{ConfigurationError, LockGate, LockOwner};
use crate::error::{AppError, Result};
use crate::port::{DistributedLock, IdProvider};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Runs work while holding an exclusive lock identified by name.
///
/// Callers in the same process first contend on a local mutex, so only one of
/// them at a time goes to the network for the distributed lock. When a wait
/// budget is given it is shared by both gates: whatever the local wait used
/// is no longer available to the distributed one.
///
/// Work is never invoked unless both gates were obtained. The distributed
/// lock is released before the local one.
pub struct LockCoordinator {
    local: LocalLockRegistry,
    distributed: Arc<dyn DistributedLock>,
    ids: Arc<dyn IdProvider>,
}

impl LockCoordinator {
    pub fn new(distributed: Arc<dyn DistributedLock>, ids: Arc<dyn IdProvider>) -> Self {
        Self {
            local: LocalLockRegistry::new(),
            distributed,
            ids,
        }
    }

    /// Run value-producing work, failing at once if either gate is busy
    ///
    /// # Errors
    /// - `AppError::LockAcquisitionFailed` if a gate is held elsewhere
    pub async fn run<T, F, Fut>(&self, name: &str, work: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.protect(name, None, work).await
    }

    /// Run value-producing work, waiting at most `budget` in total for both gates
    ///
    /// # Example
    /// ```text
    /// let total = coordinator
    ///     .run_with_timeout("inventory:42", Duration::from_secs(3), || reserve(42))
    ///     .await?;
    /// ```
    pub async fn run_with_timeout<T, F, Fut>(
        &self,
        name: &str,
        budget: Duration,
        work: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.protect(name, Some(budget), work).await
    }

    /// Side-effecting variant of [`run`](Self::run)
    pub async fn execute<F, Fut>(&self, name: &str, work: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        self.protect(name, None, work).await
    }

    /// Side-effecting variant of [`run_with_timeout`](Self::run_with_timeout)
    pub async fn execute_with_timeout<F, Fut>(
        &self,
        name: &str,
        budget: Duration,
        work: F,
    ) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        self.protect(name, Some(budget), work).await
    }

    /// Live entries in the process-local lock table
    pub fn local_entry_count(&self) -> usize {
        self.local.len()
    }

    async fn protect<T, F, Fut>(&self, name: &str, budget: Option<Duration>, work: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if name.is_empty() {
            return Err(ConfigurationError::EmptyLockName.into());
        }
        let started = Instant::now();

        let local = match budget {
            None => self.local.try_lock(name),
            Some(budget) => self.local.lock_timeout(name, budget).await,
        };
        let Some(local_guard) = local else {
            debug!(lock = name, "Local lock busy");
            return Err(AppError::lock_failed(name, LockGate::Local));
        };

        let owner = self.ids.next_owner();
        // armed before the attempt so a cancelled caller still releases
        let mut hold = DistributedHold::new(Arc::clone(&self.distributed), name, owner);
        // a spent budget still gets one non-blocking attempt
        let remaining = budget.map(|budget| budget.saturating_sub(started.elapsed()));
        let acquired = match self
            .distributed
            .try_acquire(name, &hold.owner, remaining)
            .await
        {
            Ok(acquired) => acquired,
            Err(e) => {
                warn!(lock = name, error = %e, "Distributed lock acquisition errored");
                hold.release().await;
                return Err(e);
            }
        };
        if !acquired {
            debug!(lock = name, "Distributed lock busy");
            hold.disarm();
            drop(local_guard);
            return Err(AppError::lock_failed(name, LockGate::Distributed));
        }

        let outcome = catch_panic(work()).await;

        hold.release().await;
        drop(local_guard);

        match outcome {
            Ok(value) => Ok(value),
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }
}

/// Distributed acquisition owned by one protected call.
///
/// Released by `release` on the normal path. If the call is dropped before
/// that (timeout, aborted task), `Drop` hands the release to the runtime so
/// the cluster-wide lock does not outlive its caller.
struct DistributedHold {
    distributed: Arc<dyn DistributedLock>,
    name: String,
    owner: LockOwner,
    armed: bool,
}

impl DistributedHold {
    fn new(distributed: Arc<dyn DistributedLock>, name: &str, owner: LockOwner) -> Self {
        Self {
            distributed,
            name: name.to_string(),
            owner,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }

    async fn release(&mut self) {
        self.armed = false;
        release_if_held(self.distributed.as_ref(), &self.name, &self.owner).await;
    }
}

impl Drop for DistributedHold {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let (distributed, name, owner) = (
            Arc::clone(&self.distributed),
            std::mem::take(&mut self.name),
            self.owner.clone(),
        );
        match Handle::try_current() {
            Ok(runtime) => {
                debug!(lock = %name, "Protected call dropped, releasing distributed lock");
                runtime.spawn(async move {
                    release_if_held(distributed.as_ref(), &name, &owner).await;
                });
            }
            Err(_) => {
                warn!(lock = %name, "No runtime to release distributed lock of a dropped call");
            }
        }
    }
}

async fn release_if_held(distributed: &dyn DistributedLock, name: &str, owner: &LockOwner) {
    match distributed.is_held_by(name, owner).await {
        Ok(true) => {
            if let Err(e) = distributed.release(name, owner).await {
                warn!(lock = name, error = %e, "Failed to release distributed lock");
            }
        }
        Ok(false) => {}
        Err(e) => {
            warn!(lock = name, error = %e, "Could not check distributed lock ownership");
        }
    }
}
