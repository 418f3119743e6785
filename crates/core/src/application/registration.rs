// Listener Registration
// Explicit replacement for annotation scanning: startup code builds one per consumer

use crate::domain::{ConfigurationError, ListenerKind, PoolSelector, DEFAULT_REPLICAS};
use crate::port::MessageHandler;
use std::fmt;
use std::sync::Arc;

/// {queue name, replica count, handler, pool, kind}; immutable once registered
#[derive(Clone)]
pub struct ListenerRegistration {
    queue_name: String,
    replicas: usize,
    handler: Arc<dyn MessageHandler>,
    pool: PoolSelector,
    kind: ListenerKind,
}

impl ListenerRegistration {
    /// Plain listener, one replica, default pool
    pub fn new(queue_name: impl Into<String>, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            queue_name: queue_name.into(),
            replicas: DEFAULT_REPLICAS,
            handler,
            pool: PoolSelector::Default,
            kind: ListenerKind::Plain,
        }
    }

    /// Delayed listener, one replica, default pool
    pub fn delayed(queue_name: impl Into<String>, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            kind: ListenerKind::Delayed,
            ..Self::new(queue_name, handler)
        }
    }

    pub fn with_replicas(mut self, replicas: usize) -> Self {
        self.replicas = replicas;
        self
    }

    pub fn with_pool(mut self, pool: PoolSelector) -> Self {
        self.pool = pool;
        self
    }

    /// Logical (unprefixed) queue name
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    pub fn handler(&self) -> &Arc<dyn MessageHandler> {
        &self.handler
    }

    pub fn pool(&self) -> &PoolSelector {
        &self.pool
    }

    pub fn kind(&self) -> ListenerKind {
        self.kind
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.replicas < 1 {
            return Err(ConfigurationError::InvalidReplicaCount(self.replicas));
        }
        if self.queue_name.is_empty() {
            return Err(ConfigurationError::EmptyQueueName);
        }
        Ok(())
    }
}

impl fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("queue_name", &self.queue_name)
            .field("replicas", &self.replicas)
            .field("pool", &self.pool)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::handler_fn;

    fn noop() -> Arc<dyn MessageHandler> {
        handler_fn(|_| async { Ok(()) })
    }

    #[test]
    fn test_defaults() {
        let reg = ListenerRegistration::new("orders", noop());
        assert_eq!(reg.replicas(), 1);
        assert_eq!(reg.pool(), &PoolSelector::Default);
        assert_eq!(reg.kind(), ListenerKind::Plain);
        assert!(reg.validate().is_ok());

        let delayed = ListenerRegistration::delayed("orders", noop()).with_replicas(3);
        assert_eq!(delayed.kind(), ListenerKind::Delayed);
        assert_eq!(delayed.replicas(), 3);
    }

    #[test]
    fn test_zero_replicas_rejected() {
        let reg = ListenerRegistration::new("orders", noop()).with_replicas(0);
        assert_eq!(
            reg.validate(),
            Err(ConfigurationError::InvalidReplicaCount(0))
        );
    }

    #[test]
    fn test_empty_queue_name_rejected() {
        let reg = ListenerRegistration::new("", noop());
        assert_eq!(reg.validate(), Err(ConfigurationError::EmptyQueueName));
    }
}
