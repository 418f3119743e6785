// Domain Layer - Pure types shared by ports and services

pub mod destination;
pub mod error;
pub mod lock;
pub mod registration;

// Re-exports
pub use destination::{Destination, QueueNameResolver, PREFIX_SEPARATOR};
pub use error::ConfigurationError;
pub use lock::{LockGate, LockOwner};
pub use registration::{ListenerKind, PoolSelector, DEFAULT_REPLICAS};
