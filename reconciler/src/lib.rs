pub mod cache;
pub mod classify;
pub mod cluster;
pub mod config;
pub mod delivery;
pub mod metrics_defs;
pub mod normalize;
pub mod reconcile;

#[cfg(test)]
mod testutils;

use reconcile::Reconciler;
use tokio::sync::watch;

#[derive(thiserror::Error, Debug)]
pub enum ReconcilerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("delivery client error: {0}")]
    DeliveryClient(#[from] delivery::DeliveryClientError),
}

pub fn run(config: config::Config) -> Result<(), ReconcilerError> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(run_async(config))
}

pub async fn run_async(config: config::Config) -> Result<(), ReconcilerError> {
    let reconciler = Reconciler::new(&config)?;

    tracing::info!(
        nodes = ?config.memcached_servers,
        api_endpoint = %config.api_endpoint,
        interval_secs = config.loop_interval,
        "Starting reconciler"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("Shutdown requested, finishing the current pass");
        let _ = shutdown_tx.send(true);
    });

    reconciler.run(shutdown_rx).await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            tracing::warn!(error = %e, "Cannot listen for SIGTERM");
            return wait_for_ctrl_c().await;
        }
    };

    tokio::select! {
        _ = wait_for_ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    wait_for_ctrl_c().await
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
