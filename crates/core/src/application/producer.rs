// Producer - immediate and delayed sends

use crate::domain::{ConfigurationError, Destination, QueueNameResolver};
use crate::error::Result;
use crate::port::{DelayedQueue, DelayedRole, MessageQueue};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Sends messages to destinations resolved through the shared resolver.
///
/// Delayed sends go through producer-only companion handles: created once per
/// destination, stripped of transfer duty right away, then reused. Consumer
/// handles are never touched here, so producing on a process that also
/// consumes the same destination cannot stop its transfers.
pub struct Producer {
    queue: Arc<dyn MessageQueue>,
    resolver: QueueNameResolver,
    delayed: Mutex<HashMap<Destination, Arc<dyn DelayedQueue>>>,
}

impl Producer {
    pub fn new(queue: Arc<dyn MessageQueue>, resolver: QueueNameResolver) -> Self {
        Self {
            queue,
            resolver,
            delayed: Mutex::new(HashMap::new()),
        }
    }

    pub fn resolver(&self) -> &QueueNameResolver {
        &self.resolver
    }

    /// Send `message` now. Returns whether the queue accepted it.
    ///
    /// # Example
    /// ```text
    /// let accepted = producer.send("general_msg_queue", &Order { id: 1 }).await?;
    /// ```
    pub async fn send<T>(&self, queue_name: &str, message: &T) -> Result<bool>
    where
        T: Serialize + ?Sized,
    {
        let destination = self.destination(queue_name)?;
        let payload = serde_json::to_value(message)?;
        let accepted = self.queue.push(&destination, payload).await?;
        debug!(destination = %destination, accepted, "Message sent");
        Ok(accepted)
    }

    /// Schedule `message` to become visible on the queue after `delay`.
    ///
    /// A consumer with a delayed listener on the destination must be running
    /// somewhere for the item to be transferred once due.
    pub async fn send_delayed<T>(
        &self,
        queue_name: &str,
        message: &T,
        delay: Duration,
    ) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let destination = self.destination(queue_name)?;
        let payload = serde_json::to_value(message)?;
        let companion = self.producer_companion(&destination).await?;
        companion.schedule(payload, delay).await?;
        debug!(destination = %destination, ?delay, "Delayed message scheduled");
        Ok(())
    }

    fn destination(&self, queue_name: &str) -> Result<Destination> {
        if queue_name.is_empty() {
            return Err(ConfigurationError::EmptyQueueName.into());
        }
        Ok(self.resolver.resolve(queue_name))
    }

    async fn producer_companion(&self, destination: &Destination) -> Result<Arc<dyn DelayedQueue>> {
        let mut cache = self.delayed.lock().await;
        if let Some(companion) = cache.get(destination) {
            return Ok(Arc::clone(companion));
        }

        let companion = self
            .queue
            .attach_delayed(destination, DelayedRole::Producer)
            .await?;
        // producers never transfer due items
        companion.destroy().await?;
        cache.insert(destination.clone(), Arc::clone(&companion));
        Ok(companion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::port::message_queue::mocks::MockMessageQueue;
    use serde::Serialize;
    use serde_json::json;

    #[derive(Serialize)]
    struct Order {
        id: u64,
    }

    #[tokio::test]
    async fn test_send_resolves_destination() {
        let queue = MockMessageQueue::new();
        let producer = Producer::new(queue.clone(), QueueNameResolver::new("env"));

        assert!(producer.send("orders", &Order { id: 1 }).await.unwrap());

        let dest = QueueNameResolver::new("env").resolve("orders");
        assert_eq!(queue.blocking_pop(&dest).await.unwrap(), json!({"id": 1}));
    }

    #[tokio::test]
    async fn test_send_delayed_uses_one_producer_handle() {
        let queue = MockMessageQueue::new();
        let producer = Producer::new(queue.clone(), QueueNameResolver::identity());

        for i in 0..3 {
            producer
                .send_delayed("later", &json!(i), Duration::from_millis(10))
                .await
                .unwrap();
        }

        let attachments = queue.attachments();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].1, DelayedRole::Producer);
    }

    #[tokio::test]
    async fn test_delayed_message_not_visible_before_delay() {
        let queue = MockMessageQueue::new();
        let producer = Producer::new(queue.clone(), QueueNameResolver::identity());
        let dest = producer.resolver().resolve("later");

        producer
            .send_delayed("later", "ping", Duration::from_millis(150))
            .await
            .unwrap();

        let early =
            tokio::time::timeout(Duration::from_millis(50), queue.blocking_pop(&dest)).await;
        assert!(early.is_err(), "message visible before its delay elapsed");

        let late = tokio::time::timeout(Duration::from_secs(2), queue.blocking_pop(&dest))
            .await
            .expect("message should arrive after its delay")
            .unwrap();
        assert_eq!(late, json!("ping"));
    }

    #[tokio::test]
    async fn test_empty_queue_name_rejected() {
        let producer = Producer::new(MockMessageQueue::new(), QueueNameResolver::identity());
        let err = producer.send("", &1).await.unwrap_err();
        assert!(matches!(err, AppError::Configuration(ConfigurationError::EmptyQueueName)));
    }
}
