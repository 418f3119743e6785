// Configuration Error Types

use thiserror::Error;

/// Invalid registration or settings, detected before anything starts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("replica count must be at least 1, got {0}")]
    InvalidReplicaCount(usize),

    #[error("queue name must not be empty")]
    EmptyQueueName,

    #[error("lock name must not be empty")]
    EmptyLockName,

    #[error("worker pool '{pool}' must have concurrency of at least 1, got {concurrency}")]
    InvalidPoolConcurrency { pool: String, concurrency: usize },
}
