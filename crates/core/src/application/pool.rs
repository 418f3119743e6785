// Worker Pool
// Named execution target for handler invocations

use crate::domain::ConfigurationError;
use crate::error::{AppError, Result};
use std::future::Future;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Name of the pool used by registrations that do not pick one
pub const DEFAULT_POOL_NAME: &str = "default";

/// Default pool size = this factor x available parallelism
pub const DEFAULT_POOL_PARALLELISM_FACTOR: usize = 2;

/// Concurrency of the default pool on this machine
pub fn default_concurrency() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cores * DEFAULT_POOL_PARALLELISM_FACTOR
}

/// A named pool with a fixed concurrency ceiling.
///
/// The pool itself only decides *where* tasks run (a tokio runtime); the
/// ceiling is enforced by the [`BoundedDispatcher`](super::BoundedDispatcher)
/// wrapped around it.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    name: String,
    concurrency: usize,
    runtime: Handle,
}

impl WorkerPool {
    /// Create a pool on the current tokio runtime
    ///
    /// # Errors
    /// - `AppError::Configuration` if `concurrency` is 0
    /// - `AppError::Internal` when called outside a tokio runtime
    pub fn new(name: impl Into<String>, concurrency: usize) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| AppError::Internal(format!("worker pool needs a tokio runtime: {}", e)))?;
        Self::with_runtime(name, concurrency, runtime)
    }

    /// Create a pool that spawns onto a specific runtime
    pub fn with_runtime(
        name: impl Into<String>,
        concurrency: usize,
        runtime: Handle,
    ) -> Result<Self> {
        let name = name.into();
        if concurrency < 1 {
            return Err(ConfigurationError::InvalidPoolConcurrency {
                pool: name,
                concurrency,
            }
            .into());
        }
        Ok(Self {
            name,
            concurrency,
            runtime,
        })
    }

    /// The default pool: 2 x available parallelism, on the current runtime
    pub fn default_sized() -> Result<Self> {
        Self::new(DEFAULT_POOL_NAME, default_concurrency())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Start a task on the pool's runtime
    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.runtime.spawn(task)
    }
}
