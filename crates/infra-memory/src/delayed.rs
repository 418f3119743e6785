// In-Memory DelayedQueue Implementation
// Ordered schedule plus a transfer task kept alive by consumer attachments

use crate::message_queue::BlockingQueue;
use crate::store::locked;
use async_trait::async_trait;
use redq_core::domain::Destination;
use redq_core::error::Result;
use redq_core::port::{DelayedQueue, DelayedRole};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Retry interval when the target queue refuses a due item
const TRANSFER_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Upper bound for deadlines that would overflow `Instant`
const MAX_DELAY: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

#[derive(Default)]
struct Transfer {
    consumers: usize,
    task: Option<JoinHandle<()>>,
}

/// Delayed-activation state of one destination
pub(crate) struct DelayedState {
    destination: Destination,
    target: Arc<BlockingQueue>,
    entries: Mutex<BTreeMap<(Instant, u64), Value>>,
    seq: AtomicU64,
    changed: Notify,
    transfer: Mutex<Transfer>,
}

impl DelayedState {
    pub(crate) fn new(destination: Destination, target: Arc<BlockingQueue>) -> Self {
        Self {
            destination,
            target,
            entries: Mutex::new(BTreeMap::new()),
            seq: AtomicU64::new(0),
            changed: Notify::new(),
            transfer: Mutex::new(Transfer::default()),
        }
    }

    pub(crate) fn pending(&self) -> usize {
        locked(&self.entries).len()
    }

    pub(crate) fn is_transferring(&self) -> bool {
        locked(&self.transfer).task.is_some()
    }

    fn schedule(&self, message: Value, delay: Duration) {
        let deadline = Instant::now() + delay.min(MAX_DELAY);
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        locked(&self.entries).insert((deadline, seq), message);
        self.changed.notify_waiters();
    }

    fn attach_consumer(self: &Arc<Self>) {
        let mut transfer = locked(&self.transfer);
        transfer.consumers += 1;
        if transfer.task.is_none() {
            debug!(destination = %self.destination, "Delayed transfer started");
            transfer.task = Some(tokio::spawn(run_transfer(Arc::clone(self))));
        }
    }

    fn detach_consumer(&self) {
        let mut transfer = locked(&self.transfer);
        transfer.consumers = transfer.consumers.saturating_sub(1);
        if transfer.consumers == 0 {
            if let Some(task) = transfer.task.take() {
                task.abort();
                debug!(destination = %self.destination, "Delayed transfer stopped");
            }
        }
    }

    /// Move every due item to the target queue. Returns when to look again,
    /// or `None` if nothing is scheduled.
    fn transfer_due(&self, now: Instant) -> Option<Instant> {
        let mut entries = locked(&self.entries);
        while let Some(entry) = entries.first_entry() {
            let key = *entry.key();
            if key.0 > now {
                return Some(key.0);
            }
            let message = entry.remove();
            if let Err(message) = self.target.offer(message) {
                entries.insert(key, message);
                return Some(now + TRANSFER_RETRY_INTERVAL);
            }
        }
        None
    }
}

async fn run_transfer(state: Arc<DelayedState>) {
    loop {
        let changed = state.changed.notified();
        tokio::pin!(changed);
        changed.as_mut().enable();

        match state.transfer_due(Instant::now()) {
            Some(deadline) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {}
                    _ = &mut changed => {}
                }
            }
            None => changed.await,
        }
    }
}

/// Handle on a destination's delayed-activation companion.
///
/// Consumer handles keep the transfer task alive until destroyed (or
/// dropped). Producer handles only schedule.
pub struct InMemoryDelayedQueue {
    state: Arc<DelayedState>,
    role: DelayedRole,
    destroyed: AtomicBool,
}

impl InMemoryDelayedQueue {
    pub(crate) fn attach(state: Arc<DelayedState>, role: DelayedRole) -> Self {
        if role == DelayedRole::Consumer {
            state.attach_consumer();
        }
        Self {
            state,
            role,
            destroyed: AtomicBool::new(false),
        }
    }

    fn release(&self) {
        if !self.destroyed.swap(true, Ordering::SeqCst) && self.role == DelayedRole::Consumer {
            self.state.detach_consumer();
        }
    }
}

#[async_trait]
impl DelayedQueue for InMemoryDelayedQueue {
    fn destination(&self) -> &Destination {
        &self.state.destination
    }

    fn role(&self) -> DelayedRole {
        self.role
    }

    async fn schedule(&self, message: Value, delay: Duration) -> Result<()> {
        self.state.schedule(message, delay);
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        self.release();
        Ok(())
    }
}

impl Drop for InMemoryDelayedQueue {
    fn drop(&mut self) {
        self.release();
    }
}
