// Listener Supervisor
// Turns registrations into running listener replicas and owns their shutdown

use crate::application::dispatcher::{BoundedDispatcher, DispatcherStats};
use crate::application::listener::ListenerLoop;
use crate::application::pool::{default_concurrency, WorkerPool, DEFAULT_POOL_NAME};
use crate::application::registration::ListenerRegistration;
use crate::application::shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
use crate::config::Settings;
use crate::domain::{Destination, ListenerKind, PoolSelector, QueueNameResolver};
use crate::error::{AppError, Result};
use crate::port::{DelayedQueue, DelayedRole, MessageQueue};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn, Instrument};

/// What a successful registration started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationHandle {
    pub destination: Destination,
    pub replicas: usize,
    pub kind: ListenerKind,
    pub pool: String,
}

/// Starts listener replicas and shares one dispatcher per worker pool.
///
/// The default pool is created lazily on the first registration that needs
/// it and then reused; it belongs to this supervisor, not to the process.
pub struct ListenerSupervisor {
    queue: Arc<dyn MessageQueue>,
    resolver: QueueNameResolver,
    default_concurrency: usize,
    default_dispatcher: OnceCell<Arc<BoundedDispatcher>>,
    dispatchers: Mutex<HashMap<String, Arc<BoundedDispatcher>>>,
    shutdown_tx: ShutdownSender,
    listeners: Mutex<Vec<JoinHandle<()>>>,
    companions: Mutex<Vec<Arc<dyn DelayedQueue>>>,
}

impl ListenerSupervisor {
    /// Create a supervisor with no named pools and a default pool of
    /// 2 x available parallelism
    pub fn new(queue: Arc<dyn MessageQueue>, resolver: QueueNameResolver) -> Self {
        let (shutdown_tx, _) = shutdown_channel();
        Self {
            queue,
            resolver,
            default_concurrency: default_concurrency(),
            default_dispatcher: OnceCell::new(),
            dispatchers: Mutex::new(HashMap::new()),
            shutdown_tx,
            listeners: Mutex::new(Vec::new()),
            companions: Mutex::new(Vec::new()),
        }
    }

    /// Build from settings: prefix, default pool size and named pools.
    ///
    /// Must be called inside a tokio runtime (named pools bind to it).
    pub fn from_settings(queue: Arc<dyn MessageQueue>, settings: &Settings) -> Result<Self> {
        settings.validate()?;

        let mut supervisor = Self::new(queue, settings.resolver());
        if let Some(concurrency) = settings.default_pool_concurrency {
            supervisor.default_concurrency = concurrency;
        }
        for (name, concurrency) in &settings.pools {
            supervisor.add_pool(WorkerPool::new(name.clone(), *concurrency)?);
        }
        Ok(supervisor)
    }

    /// Make a named pool available to registrations. Replaces a pool of the same name
    /// for future registrations only.
    pub fn add_pool(&self, pool: WorkerPool) -> Arc<BoundedDispatcher> {
        let name = pool.name().to_string();
        let dispatcher = Arc::new(BoundedDispatcher::new(pool));
        self.lock_dispatchers().insert(name, Arc::clone(&dispatcher));
        dispatcher
    }

    pub fn resolver(&self) -> &QueueNameResolver {
        &self.resolver
    }

    /// Token observed by every listener this supervisor starts
    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown_tx.token()
    }

    /// Validate `registration`, resolve its destination and pool, and start
    /// its replicas. Returns without waiting for them.
    ///
    /// # Errors
    /// - `AppError::Configuration` for a replica count below 1 (nothing is started)
    /// - `AppError::Interrupted` if the supervisor was already shut down
    /// - queue errors from attaching the delayed companion
    pub async fn register(&self, registration: ListenerRegistration) -> Result<RegistrationHandle> {
        registration.validate()?;
        if self.shutdown_tx.is_shutdown() {
            return Err(AppError::Interrupted(
                "supervisor is shut down, refusing new listeners".to_string(),
            ));
        }

        let destination = self.resolver.resolve(registration.queue_name());
        let dispatcher = self.dispatcher_for(registration.pool()).await?;

        let companion = match registration.kind() {
            ListenerKind::Plain => None,
            ListenerKind::Delayed => {
                let companion = self
                    .queue
                    .attach_delayed(&destination, DelayedRole::Consumer)
                    .await?;
                self.lock_companions().push(Arc::clone(&companion));
                Some(companion)
            }
        };

        let mut joins = Vec::with_capacity(registration.replicas());
        for replica in 0..registration.replicas() {
            let mut listener = ListenerLoop::new(
                destination.clone(),
                replica,
                Arc::clone(&self.queue),
                Arc::clone(&dispatcher),
                Arc::clone(registration.handler()),
            );
            if let Some(companion) = &companion {
                listener = listener.with_delayed(Arc::clone(companion));
            }

            let span = info_span!(
                "mq_listener",
                listener_name = %listener.name(),
                destination = %destination,
                replica,
                kind = %registration.kind(),
            );
            joins.push(tokio::spawn(
                listener.run(self.shutdown_tx.token()).instrument(span),
            ));
        }
        self.lock_listeners().extend(joins);

        let handle = RegistrationHandle {
            destination,
            replicas: registration.replicas(),
            kind: registration.kind(),
            pool: dispatcher.pool().name().to_string(),
        };
        info!(
            destination = %handle.destination,
            queue_name = registration.queue_name(),
            replicas = handle.replicas,
            kind = %handle.kind,
            pool = %handle.pool,
            "Registered message queue listener"
        );
        Ok(handle)
    }

    /// Listener replicas that have not returned yet
    pub fn listener_count(&self) -> usize {
        self.lock_listeners()
            .iter()
            .filter(|join| !join.is_finished())
            .count()
    }

    /// Stats of the default pool (if created) and every named pool
    pub fn dispatcher_stats(&self) -> Vec<DispatcherStats> {
        let mut stats: Vec<DispatcherStats> = self
            .default_dispatcher
            .get()
            .into_iter()
            .map(|d| d.stats())
            .collect();
        stats.extend(self.lock_dispatchers().values().map(|d| d.stats()));
        stats
    }

    /// Stop admitting new messages. In-flight handlers keep running.
    pub fn shutdown(&self) {
        info!("Listener supervisor shutting down");
        self.shutdown_tx.shutdown();
    }

    /// Shut down and wait up to `timeout` for every listener loop to return,
    /// then release delayed companions. Returns false if the wait timed out.
    pub async fn shutdown_and_join(&self, timeout: Duration) -> bool {
        self.shutdown();

        let joins: Vec<JoinHandle<()>> = self.lock_listeners().drain(..).collect();
        let count = joins.len();
        let all_stopped = tokio::time::timeout(timeout, futures::future::join_all(joins))
            .await
            .is_ok();
        if !all_stopped {
            warn!(listeners = count, ?timeout, "Listeners did not stop within timeout");
        }

        let companions: Vec<Arc<dyn DelayedQueue>> = self.lock_companions().drain(..).collect();
        for companion in companions {
            if let Err(e) = companion.destroy().await {
                warn!(
                    destination = %companion.destination(),
                    error = %e,
                    "Failed to release delayed companion"
                );
            }
        }

        info!(listeners = count, all_stopped, "Listener supervisor stopped");
        all_stopped
    }

    async fn dispatcher_for(&self, selector: &PoolSelector) -> Result<Arc<BoundedDispatcher>> {
        if let PoolSelector::Named(name) = selector {
            let named = self.lock_dispatchers().get(name).cloned();
            if let Some(dispatcher) = named {
                return Ok(dispatcher);
            }
            warn!(pool = %name, "Worker pool not found, falling back to default pool");
        }
        self.default_dispatcher().await
    }

    async fn default_dispatcher(&self) -> Result<Arc<BoundedDispatcher>> {
        let concurrency = self.default_concurrency;
        let dispatcher = self
            .default_dispatcher
            .get_or_try_init(|| async move {
                tracing::debug!(concurrency, "Initializing default worker pool");
                WorkerPool::new(DEFAULT_POOL_NAME, concurrency)
                    .map(|pool| Arc::new(BoundedDispatcher::new(pool)))
            })
            .await?;
        Ok(Arc::clone(dispatcher))
    }

    // Poisoning only follows a panic while holding one of these short critical
    // sections; the data is still consistent, so keep going.
    fn lock_dispatchers(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<String, Arc<BoundedDispatcher>>> {
        self.dispatchers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_companions(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn DelayedQueue>>> {
        self.companions.lock().unwrap_or_else(|e| e.into_inner())
    }
}
