// Demo listeners and traffic

use redq_core::application::{ListenerRegistration, LockCoordinator, Producer};
use redq_core::domain::PoolSelector;
use redq_core::port::{handler_fn, typed_handler, HandlerError};
use redq_core::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

pub const GENERAL_QUEUE: &str = "general_msg_queue";
pub const REMINDER_QUEUE: &str = "reminder_queue";
pub const DEMO_LOCK: &str = "demo:publish";

#[derive(Debug, Serialize, Deserialize)]
pub struct Reminder {
    pub id: u64,
    pub text: String,
}

/// Plain listener logging every message, two replicas on the default pool
pub fn general_listener() -> ListenerRegistration {
    ListenerRegistration::new(
        GENERAL_QUEUE,
        handler_fn(|message| async move {
            info!(%message, "General message handled");
            Ok(())
        }),
    )
    .with_replicas(2)
}

/// Delayed listener decoding [`Reminder`]s, on the `reminders` pool if configured
pub fn reminder_listener() -> ListenerRegistration {
    ListenerRegistration::delayed(
        REMINDER_QUEUE,
        typed_handler(|reminder: Reminder| async move {
            if reminder.text.is_empty() {
                return Err(HandlerError::failed("empty reminder"));
            }
            info!(id = reminder.id, text = %reminder.text, "Reminder fired");
            Ok(())
        }),
    )
    .with_pool(PoolSelector::named("reminders"))
}

/// Publish a handful of messages while holding the demo lock
pub async fn publish(producer: &Producer, locks: &LockCoordinator) -> Result<()> {
    locks
        .run_with_timeout(DEMO_LOCK, Duration::from_secs(3), || send_batch(producer))
        .await?
}

async fn send_batch(producer: &Producer) -> Result<()> {
    for i in 0..3 {
        producer
            .send(GENERAL_QUEUE, &serde_json::json!({ "seq": i, "body": "hello" }))
            .await?;
    }
    let reminder = Reminder {
        id: 1,
        text: "stand up and stretch".to_string(),
    };
    producer
        .send_delayed(REMINDER_QUEUE, &reminder, Duration::from_secs(2))
        .await?;
    info!(sent = 4, "Demo messages published");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use redq_core::domain::QueueNameResolver;
    use redq_core::port::{MessageQueue, UuidProvider};
    use redq_infra_memory::InMemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_publish_sends_batch_and_frees_lock() {
        let store = InMemoryStore::new();
        let queue = store.message_queue();
        let resolver = QueueNameResolver::new("demo");
        let producer = Producer::new(Arc::new(queue.clone()), resolver.clone());
        let lock = store.distributed_lock();
        let locks = LockCoordinator::new(Arc::new(lock.clone()), Arc::new(UuidProvider));

        publish(&producer, &locks).await.unwrap();

        let general = resolver.resolve(GENERAL_QUEUE);
        assert_eq!(queue.len(&general), 3);
        assert_eq!(queue.pending_delayed(&resolver.resolve(REMINDER_QUEUE)), 1);
        assert_eq!(lock.held_count(), 0);
        assert_eq!(locks.local_entry_count(), 0);

        let first = queue.blocking_pop(&general).await.unwrap();
        assert_eq!(first["seq"], serde_json::json!(0));
    }

    #[test]
    fn test_registrations() {
        let general = general_listener();
        assert_eq!(general.replicas(), 2);
        assert!(general.validate().is_ok());

        let reminders = reminder_listener();
        assert_eq!(reminders.pool(), &PoolSelector::named("reminders"));
    }
}
