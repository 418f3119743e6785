//! Listener engine integration tests
//!
//! Supervisor, dispatcher, listener loops and producer running against the
//! shared in-memory store.

use std::sync::Arc;
use std::time::Duration;

use redq_core::application::{ListenerRegistration, ListenerSupervisor, Producer, WorkerPool};
use redq_core::domain::{PoolSelector, QueueNameResolver};
use redq_core::port::message_handler::mocks::RecordingHandler;
use redq_core::port::{MessageHandler, MessageQueue};
use redq_infra_memory::InMemoryStore;
use serde_json::json;

fn as_handler(handler: &Arc<RecordingHandler>) -> Arc<dyn MessageHandler> {
    Arc::clone(handler) as Arc<dyn MessageHandler>
}

/// Two replicas on a pool of two: every message handled once, never more than two at a time
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bounded_consumption_end_to_end() {
    let store = InMemoryStore::new();
    let queue = store.message_queue();
    let resolver = QueueNameResolver::new("env");
    let supervisor = ListenerSupervisor::new(Arc::new(queue.clone()), resolver.clone());
    supervisor.add_pool(WorkerPool::new("bounded", 2).unwrap());

    let handler = Arc::new(RecordingHandler::new_success().with_delay(Duration::from_millis(100)));
    let handle = supervisor
        .register(
            ListenerRegistration::new("Q", as_handler(&handler))
                .with_replicas(2)
                .with_pool(PoolSelector::named("bounded")),
        )
        .await
        .unwrap();
    assert_eq!(handle.destination.as_str(), "env_Q");
    assert_eq!(handle.pool, "bounded");

    let producer = Producer::new(Arc::new(queue.clone()), resolver);
    for i in 0..10 {
        assert!(producer.send("Q", &json!(i)).await.unwrap());
    }

    // admission is bounded: polling stops while both permits are taken
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(
        queue.len(&handle.destination) >= 6,
        "listeners drained the queue past the pool bound"
    );

    assert!(handler.wait_for_calls(10, Duration::from_secs(5)).await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut received: Vec<i64> = handler
        .received()
        .iter()
        .filter_map(|v| v.as_i64())
        .collect();
    received.sort_unstable();
    assert_eq!(received, (0..10).collect::<Vec<_>>());
    assert!(handler.max_in_flight() <= 2, "max in flight {}", handler.max_in_flight());
    assert!(queue.is_empty(&handle.destination));

    assert!(supervisor.shutdown_and_join(Duration::from_secs(1)).await);
    assert_eq!(supervisor.listener_count(), 0);

    println!("✅ 10 messages handled once with at most 2 in flight");
}

/// Delayed messages become visible only once due, then reach the delayed listener
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_delayed_delivery_end_to_end() {
    let store = InMemoryStore::new();
    let queue = store.message_queue();
    let resolver = QueueNameResolver::identity();
    let supervisor = ListenerSupervisor::new(Arc::new(queue.clone()), resolver.clone());

    let handler = Arc::new(RecordingHandler::new_success());
    let handle = supervisor
        .register(ListenerRegistration::delayed("reminders", as_handler(&handler)).with_replicas(2))
        .await
        .unwrap();

    // producer in a separate "process" sharing the store
    let producer = Producer::new(Arc::new(store.message_queue()), resolver);
    producer
        .send_delayed("reminders", &json!({"id": 1}), Duration::from_millis(200))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(handler.completed(), 0, "delayed message delivered early");
    // the producer giving up its handle must not stop the consumer's transfer
    assert!(queue.is_transferring(&handle.destination));

    assert!(handler.wait_for_calls(1, Duration::from_secs(3)).await);
    assert_eq!(handler.received(), vec![json!({"id": 1})]);

    assert!(supervisor.shutdown_and_join(Duration::from_secs(1)).await);
    assert!(!queue.is_transferring(&handle.destination));

    println!("✅ Delayed message delivered after its delay");
}

/// Failing and panicking handlers neither stop the loop nor leak permits
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_handler_failures_are_contained() {
    let store = InMemoryStore::new();
    let queue = store.message_queue();
    let supervisor =
        ListenerSupervisor::new(Arc::new(queue.clone()), QueueNameResolver::identity());
    supervisor.add_pool(WorkerPool::new("fragile", 2).unwrap());

    let panicking = Arc::new(RecordingHandler::new_panic_inducing("handler exploded"));
    let failing = Arc::new(RecordingHandler::new_fail("rejected"));
    supervisor
        .register(
            ListenerRegistration::new("panics", as_handler(&panicking))
                .with_pool(PoolSelector::named("fragile")),
        )
        .await
        .unwrap();
    supervisor
        .register(
            ListenerRegistration::new("fails", as_handler(&failing))
                .with_pool(PoolSelector::named("fragile")),
        )
        .await
        .unwrap();

    let producer = Producer::new(Arc::new(queue.clone()), QueueNameResolver::identity());
    for i in 0..5 {
        producer.send("panics", &i).await.unwrap();
        producer.send("fails", &i).await.unwrap();
    }

    assert!(panicking.wait_for_calls(5, Duration::from_secs(3)).await);
    assert!(failing.wait_for_calls(5, Duration::from_secs(3)).await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stats = supervisor
        .dispatcher_stats()
        .into_iter()
        .find(|s| s.pool == "fragile")
        .unwrap();
    assert_eq!(stats.failed, 10);
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.available_permits, 2);

    // loops are still alive
    producer.send("fails", &99).await.unwrap();
    assert!(failing.wait_for_calls(6, Duration::from_secs(3)).await);

    assert!(supervisor.shutdown_and_join(Duration::from_secs(1)).await);
}

/// Shutdown interrupts loops blocked on an empty queue without consuming anything
#[tokio::test]
async fn test_shutdown_leaves_later_messages_queued() {
    let store = InMemoryStore::new();
    let queue = store.message_queue();
    let supervisor =
        ListenerSupervisor::new(Arc::new(queue.clone()), QueueNameResolver::identity());

    let handler = Arc::new(RecordingHandler::new_success());
    let handle = supervisor
        .register(ListenerRegistration::new("idle", as_handler(&handler)).with_replicas(3))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(supervisor.listener_count(), 3);

    assert!(supervisor.shutdown_and_join(Duration::from_secs(1)).await);

    queue.push(&handle.destination, json!("after")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(queue.len(&handle.destination), 1);
    assert_eq!(handler.completed(), 0);
}
