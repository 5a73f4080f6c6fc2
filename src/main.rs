use std::path::PathBuf;
use std::sync::Arc;

use color_eyre::Result;
use dsu_motion_server::{DsuServer, IioSensors, ServerConfig, logger};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    logger::init("info");

    info!("🚀 Starting DSU motion server...");

    let config = ServerConfig::load(std::env::args_os().nth(1).map(PathBuf::from))?;
    let sensors = Arc::new(IioSensors::discover(&config.sensors));
    let server = DsuServer::bind(&config, sensors).await?;

    info!(
        ttl_ms = config.subscription_ttl_ms,
        interval_ms = config.broadcast_interval_ms,
        "✓ Waiting for DSU clients on {}",
        server.local_addr()?
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            warn!(error = %e, "signal handler failed, shutting down");
        }
        info!("Shutting down DSU motion server...");
        signal_cancel.cancel();
    });

    server.run(cancel).await?;
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
