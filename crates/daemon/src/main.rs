//! redq daemon - Main Entry Point
//! Wires the in-memory store, listener supervisor, producer and lock coordinator

mod demo;
mod settings;

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use redq_core::application::{ListenerSupervisor, LockCoordinator, Producer};
use redq_core::port::{MessageQueue, UuidProvider};
use redq_infra_memory::InMemoryStore;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging
    let log_format = std::env::var("REDQ_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("redq=info"))?;

    match log_format.as_str() {
        "json" => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            // Development: Pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    info!("redq v{} starting...", VERSION);

    // 2. Load configuration
    let settings = settings::load()?;
    info!(
        queue_prefix = %settings.queue_prefix,
        pools = settings.pools.len(),
        "Settings loaded"
    );

    // 3. Setup dependencies (DI wiring)
    let store = InMemoryStore::new();
    let queue: Arc<dyn MessageQueue> = Arc::new(store.message_queue());
    let supervisor = ListenerSupervisor::from_settings(Arc::clone(&queue), &settings)?;
    let producer = Producer::new(Arc::clone(&queue), settings.resolver());
    let locks = LockCoordinator::new(Arc::new(store.distributed_lock()), Arc::new(UuidProvider));

    // 4. Start listeners
    for registration in [demo::general_listener(), demo::reminder_listener()] {
        supervisor.register(registration).await?;
    }

    // 5. Publish demo traffic
    if let Err(e) = demo::publish(&producer, &locks).await {
        error!(error = ?e, "Demo publish failed");
    }

    info!("System ready. Press Ctrl+C to shutdown");

    // 6. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 7. Graceful shutdown
    for stats in supervisor.dispatcher_stats() {
        info!(
            pool = %stats.pool,
            completed = stats.completed,
            failed = stats.failed,
            in_flight = stats.in_flight,
            "Worker pool totals"
        );
    }
    supervisor.shutdown_and_join(settings.shutdown_timeout()).await;

    info!("Shutdown complete.");

    Ok(())
}
