//! Trickster bot binary.
//!
//! Loads the TOML config (default location, or the path given as the first
//! argument), starts the service and runs until SIGINT or SIGTERM.
//! Logs go to stderr and to a daily rolling file in the log directory.

use std::path::PathBuf;
use trickster::TricksterConfig;
use trickster::service::Service;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let file_appender = tracing_appender::rolling::daily(trickster::paths::logs_dir(), "trickster.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    let config_path = std::env::args_os()
        .nth(1)
        .map_or_else(TricksterConfig::default_config_path, PathBuf::from);
    let mut config = if config_path.exists() {
        TricksterConfig::from_file(&config_path)?
    } else {
        tracing::warn!(
            "no config at {}, using defaults",
            config_path.display()
        );
        TricksterConfig::default()
    };
    config.apply_env_overrides();

    tracing::info!("trickster starting");
    let service = Service::launch(config).map_err(|e| {
        tracing::error!(error = %e, "trickster failed to start");
        anyhow::anyhow!("trickster failed to start: {e}")
    })?;

    wait_for_shutdown_signal().await?;
    tracing::info!("shutdown signal received");
    service.shutdown().await;

    tracing::info!("trickster shut down cleanly");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
