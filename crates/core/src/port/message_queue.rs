// Message Queue Port (Interface)
// The shared blocking queue and its delayed-activation companion

use crate::domain::Destination;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// How a delayed-activation handle is going to be used.
///
/// The distinction matters for disposal: a producer-only handle gives up
/// transfer duty right away, a consumer handle keeps expired items flowing into
/// the blocking queue for as long as it is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelayedRole {
    /// Only schedules items; never transfers them
    Producer,
    /// Keeps the transfer of due items into the blocking queue running
    Consumer,
}

/// Shared blocking queue, addressed by destination
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Enqueue a message. Returns false when the queue refused it (e.g. full).
    async fn push(&self, destination: &Destination, message: Value) -> Result<bool>;

    /// Wait until a message is available and take it.
    ///
    /// Must be cancellation safe: dropping the future before it resolves
    /// leaves the queue untouched.
    async fn blocking_pop(&self, destination: &Destination) -> Result<Value>;

    /// Attach the delayed-activation companion of `destination`.
    ///
    /// Consumer attachments for one destination share a single transfer
    /// process; attaching twice is harmless.
    async fn attach_delayed(
        &self,
        destination: &Destination,
        role: DelayedRole,
    ) -> Result<Arc<dyn DelayedQueue>>;
}

/// Handle on a delayed-activation companion
#[async_trait]
pub trait DelayedQueue: Send + Sync {
    fn destination(&self) -> &Destination;

    fn role(&self) -> DelayedRole;

    /// Schedule `message` to become visible on the blocking queue after `delay`
    async fn schedule(&self, message: Value, delay: Duration) -> Result<()>;

    /// Give up this handle's share of transfer duty. Idempotent.
    async fn destroy(&self) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct Channel {
        tx: mpsc::UnboundedSender<Value>,
        rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Value>>>,
    }

    /// Channel-backed queue for service tests.
    ///
    /// Delayed items are handed to a sleeping task that pushes them once due,
    /// regardless of role.
    #[derive(Default)]
    pub struct MockMessageQueue {
        channels: Mutex<HashMap<Destination, Channel>>,
        failing_pops: AtomicUsize,
        attachments: Mutex<Vec<(Destination, DelayedRole)>>,
    }

    impl MockMessageQueue {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Make the next `n` pops fail with a queue error
        pub fn fail_next_pops(&self, n: usize) {
            self.failing_pops.store(n, Ordering::SeqCst);
        }

        /// Every `attach_delayed` call seen so far
        pub fn attachments(&self) -> Vec<(Destination, DelayedRole)> {
            self.attachments.lock().unwrap().clone()
        }

        fn channel(
            &self,
            destination: &Destination,
        ) -> (
            mpsc::UnboundedSender<Value>,
            Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Value>>>,
        ) {
            let mut channels = self.channels.lock().unwrap();
            let channel = channels.entry(destination.clone()).or_insert_with(|| {
                let (tx, rx) = mpsc::unbounded_channel();
                Channel {
                    tx,
                    rx: Arc::new(tokio::sync::Mutex::new(rx)),
                }
            });
            (channel.tx.clone(), Arc::clone(&channel.rx))
        }
    }

    #[async_trait]
    impl MessageQueue for MockMessageQueue {
        async fn push(&self, destination: &Destination, message: Value) -> Result<bool> {
            let (tx, _) = self.channel(destination);
            Ok(tx.send(message).is_ok())
        }

        async fn blocking_pop(&self, destination: &Destination) -> Result<Value> {
            let failing = self
                .failing_pops
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            if failing.is_ok() {
                return Err(AppError::Queue("injected pop failure".to_string()));
            }

            let (_, rx) = self.channel(destination);
            let mut rx = rx.lock().await;
            rx.recv()
                .await
                .ok_or_else(|| AppError::Queue("channel closed".to_string()))
        }

        async fn attach_delayed(
            &self,
            destination: &Destination,
            role: DelayedRole,
        ) -> Result<Arc<dyn DelayedQueue>> {
            self.attachments
                .lock()
                .unwrap()
                .push((destination.clone(), role));
            let (tx, _) = self.channel(destination);
            Ok(Arc::new(MockDelayedQueue {
                destination: destination.clone(),
                role,
                tx,
            }))
        }
    }

    struct MockDelayedQueue {
        destination: Destination,
        role: DelayedRole,
        tx: mpsc::UnboundedSender<Value>,
    }

    #[async_trait]
    impl DelayedQueue for MockDelayedQueue {
        fn destination(&self) -> &Destination {
            &self.destination
        }

        fn role(&self) -> DelayedRole {
            self.role
        }

        async fn schedule(&self, message: Value, delay: Duration) -> Result<()> {
            let tx = self.tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(message);
            });
            Ok(())
        }

        async fn destroy(&self) -> Result<()> {
            Ok(())
        }
    }
}
