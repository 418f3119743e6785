// In-Memory MessageQueue Implementation

use crate::delayed::{DelayedState, InMemoryDelayedQueue};
use crate::store::locked;
use async_trait::async_trait;
use redq_core::domain::Destination;
use redq_core::error::Result;
use redq_core::port::{DelayedQueue, DelayedRole, MessageQueue};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::debug;

/// FIFO of one destination
pub(crate) struct BlockingQueue {
    items: Mutex<VecDeque<Value>>,
    capacity: Option<usize>,
    available: Notify,
}

impl BlockingQueue {
    fn new(capacity: Option<usize>) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            capacity,
            available: Notify::new(),
        }
    }

    /// Append unless full; a refused message is handed back
    pub(crate) fn offer(&self, message: Value) -> std::result::Result<(), Value> {
        {
            let mut items = locked(&self.items);
            if self.capacity.is_some_and(|capacity| items.len() >= capacity) {
                return Err(message);
            }
            items.push_back(message);
        }
        self.available.notify_waiters();
        Ok(())
    }

    fn try_pop(&self) -> Option<Value> {
        locked(&self.items).pop_front()
    }

    /// Items only leave the deque inside `try_pop`, which never awaits, so a
    /// dropped pop cannot lose one.
    async fn pop(&self) -> Value {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.try_pop() {
                return message;
            }
            notified.await;
        }
    }

    fn len(&self) -> usize {
        locked(&self.items).len()
    }
}

#[derive(Default)]
pub(crate) struct QueueTable {
    capacity: Option<usize>,
    queues: Mutex<HashMap<Destination, Arc<BlockingQueue>>>,
    delayed: Mutex<HashMap<Destination, Arc<DelayedState>>>,
}

impl QueueTable {
    pub(crate) fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    fn queue(&self, destination: &Destination) -> Arc<BlockingQueue> {
        let mut queues = locked(&self.queues);
        Arc::clone(
            queues
                .entry(destination.clone())
                .or_insert_with(|| Arc::new(BlockingQueue::new(self.capacity))),
        )
    }

    fn delayed(&self, destination: &Destination) -> Arc<DelayedState> {
        let target = self.queue(destination);
        let mut delayed = locked(&self.delayed);
        Arc::clone(
            delayed
                .entry(destination.clone())
                .or_insert_with(|| Arc::new(DelayedState::new(destination.clone(), target))),
        )
    }
}

/// [`MessageQueue`] view over an [`InMemoryStore`](crate::InMemoryStore)
#[derive(Clone)]
pub struct InMemoryMessageQueue {
    table: Arc<QueueTable>,
}

impl InMemoryMessageQueue {
    pub(crate) fn new(table: Arc<QueueTable>) -> Self {
        Self { table }
    }

    /// Messages currently visible on `destination`
    pub fn len(&self, destination: &Destination) -> usize {
        self.table.queue(destination).len()
    }

    pub fn is_empty(&self, destination: &Destination) -> bool {
        self.len(destination) == 0
    }

    /// Messages scheduled on `destination` that have not been transferred yet
    pub fn pending_delayed(&self, destination: &Destination) -> usize {
        self.table.delayed(destination).pending()
    }

    /// Whether a transfer task is running for `destination`
    pub fn is_transferring(&self, destination: &Destination) -> bool {
        self.table.delayed(destination).is_transferring()
    }
}

#[async_trait]
impl MessageQueue for InMemoryMessageQueue {
    async fn push(&self, destination: &Destination, message: Value) -> Result<bool> {
        let accepted = self.table.queue(destination).offer(message).is_ok();
        if !accepted {
            debug!(destination = %destination, "Queue full, message refused");
        }
        Ok(accepted)
    }

    async fn blocking_pop(&self, destination: &Destination) -> Result<Value> {
        let queue = self.table.queue(destination);
        Ok(queue.pop().await)
    }

    async fn attach_delayed(
        &self,
        destination: &Destination,
        role: DelayedRole,
    ) -> Result<Arc<dyn DelayedQueue>> {
        let state = self.table.delayed(destination);
        Ok(Arc::new(InMemoryDelayedQueue::attach(state, role)))
    }
}
