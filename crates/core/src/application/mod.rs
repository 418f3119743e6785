// Application Layer - Listener engine, producer and lock coordination

pub mod dispatcher;
pub mod listener;
pub mod local_lock;
pub mod lock_coordinator;
pub mod panic_guard;
pub mod pool;
pub mod producer;
pub mod registration;
pub mod shutdown;
pub mod supervisor;

// Re-exports
pub use dispatcher::{BoundedDispatcher, DispatchPermit, DispatcherStats};
pub use listener::ListenerLoop;
pub use local_lock::{LocalLockGuard, LocalLockRegistry};
pub use lock_coordinator::LockCoordinator;
pub use pool::{WorkerPool, DEFAULT_POOL_NAME};
pub use producer::Producer;
pub use registration::ListenerRegistration;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
pub use supervisor::{ListenerSupervisor, RegistrationHandle};
