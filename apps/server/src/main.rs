//! Parley Server - Standalone headless server for Parley.
//!
//! Hosts the live-session orchestrator behind an HTTP control API and a
//! WebSocket attach channel. Designed for server deployments where Parley
//! runs as a background daemon.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use parley_core::{bootstrap_services, start_server, AppState};
use tokio::signal;

use crate::config::ServerConfig;

/// Parley Server - Headless live pitch-meeting assistant backend.
#[derive(Parser, Debug)]
#[command(name = "parley-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "PARLEY_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "PARLEY_BIND_PORT")]
    port: Option<u16>,

    /// Provider API key (overrides config file).
    #[arg(long, env = "PARLEY_PROVIDER_API_KEY", hide_env_values = true)]
    provider_api_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Parley Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(key) = args.provider_api_key {
        config.provider_api_key = Some(key);
    }

    if config.provider_api_key.is_none() {
        log::warn!(
            "No provider API key configured - sessions will refuse audio \
             until PARLEY_PROVIDER_API_KEY is set"
        );
    }

    // Bootstrap services
    let core_config = config.to_core_config();
    let bind_port = core_config.bind_port;
    let services = bootstrap_services(&core_config);

    log::info!("Services bootstrapped successfully");

    // Spawn the HTTP/WebSocket server
    let app_state = AppState::new(services.orchestrator.clone());
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state, bind_port).await {
            log::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    // Graceful shutdown: in-flight finalizations stop submitting new chunks
    services.shutdown().await;
    server_handle.abort();

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
