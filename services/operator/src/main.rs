//! kforge operator
//!
//! Drives integrations, their kits and their builds towards a running
//! workload.

use std::sync::Arc;

use anyhow::Result;
use kforge_operator::{config, Context, Controllers, Worker};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Prefer RUST_LOG, fall back to KFORGE_LOG_LEVEL
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        version = kforge_api::OPERATOR_VERSION,
        "Starting kforge operator"
    );
    info!(
        operator_namespace = %config.operator_namespace,
        workers = config.workers,
        "Configuration loaded"
    );

    let controllers = match Controllers::new() {
        Ok(controllers) => controllers,
        Err(e) => {
            error!(error = %e, "Invalid phase table");
            return Err(e.into());
        }
    };

    let ctx = Context::system(config.operator_namespace.clone());
    let worker = Arc::new(Worker::new(ctx, controllers, config.worker()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");
    let _ = shutdown_tx.send(true);

    let shutdown_timeout = std::time::Duration::from_secs(10);
    match tokio::time::timeout(shutdown_timeout, worker_handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Reconcile worker panicked"),
        Err(e) => warn!(error = %e, "Reconcile worker did not shut down in time"),
    }

    info!("Operator shutdown complete");
    Ok(())
}
