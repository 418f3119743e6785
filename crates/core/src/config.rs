// Settings
// Deserialized by the composition root (environment, files); validated here

use crate::domain::{ConfigurationError, QueueNameResolver};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Default bound on how long shutdown waits for listener loops (5 seconds)
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5000;

/// Runtime settings for redq
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Prefix prepended to every queue name ("" = none), used to separate environments
    pub queue_prefix: String,

    /// Concurrency of the default worker pool (None = 2 x available parallelism)
    pub default_pool_concurrency: Option<usize>,

    /// Named worker pools and their concurrency
    pub pools: HashMap<String, usize>,

    /// How long shutdown waits for listener loops to return
    pub shutdown_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            queue_prefix: String::new(),
            default_pool_concurrency: None,
            pools: HashMap::new(),
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl Settings {
    /// Reject pool sizes that could never admit a task
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if let Some(0) = self.default_pool_concurrency {
            return Err(ConfigurationError::InvalidPoolConcurrency {
                pool: crate::application::pool::DEFAULT_POOL_NAME.to_string(),
                concurrency: 0,
            });
        }
        for (pool, concurrency) in &self.pools {
            if *concurrency < 1 {
                return Err(ConfigurationError::InvalidPoolConcurrency {
                    pool: pool.clone(),
                    concurrency: *concurrency,
                });
            }
        }
        Ok(())
    }

    /// Resolver for `queue_prefix`; producers and consumers must share it
    pub fn resolver(&self) -> QueueNameResolver {
        QueueNameResolver::new(self.queue_prefix.clone())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
