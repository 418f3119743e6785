// Bounded Dispatcher
// Admission-bounded handoff from listener loops to a worker pool

use crate::application::panic_guard::guard_handler;
use crate::application::pool::WorkerPool;
use crate::application::shutdown::ShutdownToken;
use crate::domain::Destination;
use crate::port::{HandlerError, MessageHandler};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// One admission slot, held from before the queue pop until the handler returns.
///
/// Dropping the permit releases the slot, so a permit moved into a dispatched
/// task is released exactly once however that task ends.
#[derive(Debug)]
pub struct DispatchPermit {
    _permit: OwnedSemaphorePermit,
}

/// Point-in-time view of a dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    pub pool: String,
    pub concurrency: usize,
    pub available_permits: usize,
    pub in_flight: usize,
    pub completed: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    in_flight: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Decrements `in_flight` even if the task is aborted mid-handler
struct InFlightGuard {
    counters: Arc<Counters>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Worker pool plus a counting semaphore sized to the pool's concurrency.
///
/// Listener loops take a permit *before* popping the next message, so a
/// fast-draining queue blocks in the loop instead of piling work up in the
/// pool. Shared by every loop that dispatches into the same pool.
pub struct BoundedDispatcher {
    pool: WorkerPool,
    permits: Arc<Semaphore>,
    counters: Arc<Counters>,
}

impl BoundedDispatcher {
    pub fn new(pool: WorkerPool) -> Self {
        let permits = Arc::new(Semaphore::new(pool.concurrency()));
        Self {
            pool,
            permits,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Wait for a free slot.
    ///
    /// Returns `None` if shutdown fires first; no permit is held in that case.
    pub async fn acquire(&self, shutdown: &mut ShutdownToken) -> Option<DispatchPermit> {
        tokio::select! {
            biased;
            _ = shutdown.wait() => None,
            permit = Arc::clone(&self.permits).acquire_owned() => {
                permit.ok().map(|permit| DispatchPermit { _permit: permit })
            }
        }
    }

    /// Hand `message` to the pool. Returns immediately; the permit is released
    /// when the handler finishes, fails or panics.
    pub fn dispatch(
        &self,
        permit: DispatchPermit,
        destination: Destination,
        message: Value,
        handler: Arc<dyn MessageHandler>,
    ) -> JoinHandle<()> {
        self.counters.in_flight.fetch_add(1, Ordering::SeqCst);
        let counters = Arc::clone(&self.counters);

        self.pool.spawn(async move {
            let _permit = permit;
            let _in_flight = InFlightGuard {
                counters: Arc::clone(&counters),
            };

            match guard_handler(handler.handle(message)).await {
                Ok(()) => {
                    counters.completed.fetch_add(1, Ordering::SeqCst);
                    debug!(destination = %destination, "Message handled");
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::SeqCst);
                    log_handler_failure(&destination, &e);
                }
            }
        })
    }

    /// Acquire a slot (waiting as long as needed) and dispatch.
    ///
    /// Returns `None` without dispatching if shutdown fires while waiting.
    pub async fn submit(
        &self,
        shutdown: &mut ShutdownToken,
        destination: Destination,
        message: Value,
        handler: Arc<dyn MessageHandler>,
    ) -> Option<JoinHandle<()>> {
        let permit = self.acquire(shutdown).await?;
        Some(self.dispatch(permit, destination, message, handler))
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            pool: self.pool.name().to_string(),
            concurrency: self.pool.concurrency(),
            available_permits: self.permits.available_permits(),
            in_flight: self.counters.in_flight.load(Ordering::SeqCst),
            completed: self.counters.completed.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
        }
    }
}

fn log_handler_failure(destination: &Destination, err: &HandlerError) {
    match err {
        HandlerError::Panicked(msg) => {
            error!(destination = %destination, panic_msg = %msg, "Message handler panicked")
        }
        _ => error!(destination = %destination, error = %err, "Message handler failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::shutdown::shutdown_channel;
    use crate::port::message_handler::mocks::RecordingHandler;
    use serde_json::json;
    use std::time::Duration;

    fn dispatcher(concurrency: usize) -> BoundedDispatcher {
        BoundedDispatcher::new(WorkerPool::new("test", concurrency).unwrap())
    }

    fn dest() -> Destination {
        crate::domain::QueueNameResolver::identity().resolve("Q")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_never_exceeds_pool_size() {
        let dispatcher = dispatcher(2);
        let handler =
            Arc::new(RecordingHandler::new_success().with_delay(Duration::from_millis(20)));
        let (_tx, mut token) = shutdown_channel();

        let mut joins = Vec::new();
        for i in 0..10 {
            let join = dispatcher
                .submit(&mut token, dest(), json!({ "n": i }), handler.clone())
                .await
                .unwrap();
            joins.push(join);
            assert!(dispatcher.stats().in_flight <= 2);
        }
        for join in joins {
            join.await.unwrap();
        }

        assert_eq!(handler.completed(), 10);
        assert!(handler.max_in_flight() <= 2);
        let stats = dispatcher.stats();
        assert_eq!(stats.available_permits, 2);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.completed, 10);
    }

    #[tokio::test]
    async fn test_failing_handlers_do_not_leak_permits() {
        let dispatcher = dispatcher(1);
        let handler = Arc::new(RecordingHandler::new_fail("bad message"));
        let (_tx, mut token) = shutdown_channel();

        // with one permit, any leak would hang the second submit
        for i in 0..20 {
            let join = tokio::time::timeout(
                Duration::from_secs(1),
                dispatcher.submit(&mut token, dest(), json!(i), handler.clone()),
            )
            .await
            .expect("permit leaked")
            .unwrap();
            join.await.unwrap();
        }

        let stats = dispatcher.stats();
        assert_eq!(stats.failed, 20);
        assert_eq!(stats.completed, 0);
        assert_eq!(stats.available_permits, 1);
    }

    #[tokio::test]
    async fn test_panicking_handler_releases_permit() {
        let dispatcher = dispatcher(1);
        let handler = Arc::new(RecordingHandler::new_panic_inducing("poisoned"));
        let (_tx, mut token) = shutdown_channel();

        for i in 0..3 {
            let join = dispatcher
                .submit(&mut token, dest(), json!(i), handler.clone())
                .await
                .unwrap();
            // the panic is caught inside the task, so the join succeeds
            join.await.unwrap();
        }

        let stats = dispatcher.stats();
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.available_permits, 1);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test]
    async fn test_acquire_yields_none_on_shutdown() {
        let dispatcher = dispatcher(1);
        let (tx, mut token) = shutdown_channel();

        let held = dispatcher.acquire(&mut token).await.unwrap();
        assert_eq!(dispatcher.stats().available_permits, 0);

        let waiter = {
            let mut token = token.clone();
            async move { dispatcher.acquire(&mut token).await.is_none() }
        };
        tx.shutdown();
        assert!(waiter.await);
        drop(held);
    }

    #[tokio::test]
    async fn test_dropped_permit_is_released() {
        let dispatcher = dispatcher(2);
        let (_tx, mut token) = shutdown_channel();

        let permit = dispatcher.acquire(&mut token).await.unwrap();
        assert_eq!(dispatcher.stats().available_permits, 1);
        drop(permit);
        assert_eq!(dispatcher.stats().available_permits, 2);
    }
}
