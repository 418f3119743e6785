// Port Layer - Interfaces for the external store and application code

pub mod distributed_lock;
pub mod id_provider;
pub mod message_handler;
pub mod message_queue;

// Re-exports
pub use distributed_lock::DistributedLock;
pub use id_provider::{IdProvider, UuidProvider};
pub use message_handler::{handler_fn, typed_handler, HandlerError, MessageHandler};
pub use message_queue::{DelayedQueue, DelayedRole, MessageQueue};
