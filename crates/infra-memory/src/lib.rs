// redq Infrastructure - In-Memory Store Adapter
// Implements: MessageQueue, DelayedQueue, DistributedLock

mod delayed;
mod distributed_lock;
mod message_queue;
mod store;

pub use delayed::InMemoryDelayedQueue;
pub use distributed_lock::InMemoryDistributedLock;
pub use message_queue::InMemoryMessageQueue;
pub use store::InMemoryStore;
