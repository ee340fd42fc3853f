//! pipeserve
//!
//! Loads one inference pipeline from `PIPE_ARGS_STR` and serves it over HTTP.

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use tokio::signal;
use tracing::{error, info, warn};

use pipeserve_server::{create_router, telemetry, AppState, Cli, ServiceConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    telemetry::init_tracing(cli.verbose, cli.log_json);

    info!("Starting pipeserve");

    let config = ServiceConfig::load(&cli)?;
    info!("Configuration loaded successfully");
    info!("Task: {}", config.pipeline.task);
    info!("Model: {}", config.pipeline.model_id());
    info!("Device: {}", String::from(config.pipeline.device));

    let metrics_handle = telemetry::init_metrics()?;

    // Pipeline construction failures abort startup before binding
    let state = AppState::initialize(config).await?.with_metrics(metrics_handle);

    let addr: SocketAddr = state.config.server.bind_address().parse()?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    let shutdown = async {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping server...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
