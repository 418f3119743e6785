// Listener Loop - block on a destination, admit, dispatch

pub mod constants;

use constants::ERROR_RECOVERY_SLEEP_DURATION;

use crate::application::dispatcher::BoundedDispatcher;
use crate::application::shutdown::ShutdownToken;
use crate::domain::{Destination, ListenerKind};
use crate::port::{DelayedQueue, MessageHandler, MessageQueue};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info};

/// One replica polling one destination.
///
/// Each iteration takes an admission permit, then blocks on the queue, then
/// hands the message and the permit to the dispatcher. Both waits race the
/// shutdown token, so a stopped loop never sits on a permit or a pop.
pub struct ListenerLoop {
    destination: Destination,
    replica: usize,
    kind: ListenerKind,
    queue: Arc<dyn MessageQueue>,
    dispatcher: Arc<BoundedDispatcher>,
    handler: Arc<dyn MessageHandler>,
    // Held for the loop's lifetime so due items keep flowing into the blocking queue
    delayed: Option<Arc<dyn DelayedQueue>>,
    error_backoff: Duration,
}

impl ListenerLoop {
    /// Plain listener on `destination`
    pub fn new(
        destination: Destination,
        replica: usize,
        queue: Arc<dyn MessageQueue>,
        dispatcher: Arc<BoundedDispatcher>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            destination,
            replica,
            kind: ListenerKind::Plain,
            queue,
            dispatcher,
            handler,
            delayed: None,
            error_backoff: ERROR_RECOVERY_SLEEP_DURATION,
        }
    }

    /// Turn this into a delayed listener sharing an attached companion.
    ///
    /// Replicas of one destination must all receive the same handle.
    pub fn with_delayed(mut self, companion: Arc<dyn DelayedQueue>) -> Self {
        self.kind = ListenerKind::Delayed;
        self.delayed = Some(companion);
        self
    }

    /// Override the pause after a queue backend error
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    pub fn kind(&self) -> ListenerKind {
        self.kind
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Companion kept alive by a delayed listener
    pub fn delayed_companion(&self) -> Option<&Arc<dyn DelayedQueue>> {
        self.delayed.as_ref()
    }

    /// Stable name, e.g. `delayed-listener-env_orders-0`
    pub fn name(&self) -> String {
        format!("{}-listener-{}-{}", self.kind, self.destination, self.replica)
    }

    /// Run until the shutdown token fires.
    ///
    /// In-flight handler executions are not interrupted; only new admission stops.
    pub async fn run(self, mut shutdown: ShutdownToken) {
        let name = self.name();
        info!(listener = %name, destination = %self.destination, "Listener started");

        loop {
            if shutdown.is_shutdown() {
                break;
            }

            let Some(permit) = self.dispatcher.acquire(&mut shutdown).await else {
                debug!(listener = %name, "Interrupted while waiting for a dispatch permit");
                break;
            };

            // the permit is dropped (released) if shutdown wins this race
            let popped = tokio::select! {
                biased;
                _ = shutdown.wait() => {
                    debug!(listener = %name, "Interrupted while waiting for a message");
                    break;
                }
                popped = self.queue.blocking_pop(&self.destination) => popped,
            };

            match popped {
                Ok(message) => {
                    self.dispatcher.dispatch(
                        permit,
                        self.destination.clone(),
                        message,
                        Arc::clone(&self.handler),
                    );
                }
                Err(e) => {
                    drop(permit);
                    error!(listener = %name, error = %e, "Failed to take message from queue");
                    tokio::select! {
                        _ = sleep(self.error_backoff) => {},
                        _ = shutdown.wait() => break,
                    }
                }
            }
        }

        info!(listener = %name, "Listener stopped");
    }
}
