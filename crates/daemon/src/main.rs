//! Fanout Broker - Main Entry Point
//! Loads the queue configuration and serves the HTTP API until Ctrl+C.

mod config;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{DaemonConfig, DEFAULT_CONFIG_PATH};
use fanout_api_http::{HttpServer, HttpServerConfig};
use fanout_core::{shutdown_channel, Broker, VERSION};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging
    let log_format = std::env::var("FANOUT_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("fanout=info,tower_http=info"))
        .context("Failed to create env filter")?;

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

    info!("Fanout broker v{} starting...", VERSION);

    // 2. Load configuration
    let config_path = std::env::var("FANOUT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = DaemonConfig::load(&config_path)?;

    info!(
        path = %config_path.display(),
        queues = config.queues.len(),
        "Configuration loaded"
    );

    // 3. Build the broker (one broadcast task per queue)
    let broker = Arc::new(Broker::new(&config.queues));

    // 4. Start HTTP server
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let server = HttpServer::new(HttpServerConfig { addr: config.addr }, Arc::clone(&broker));
    let handle = server
        .start(shutdown_rx)
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server start failed: {}", e))?;

    info!(addr = %handle.local_addr, "System ready");
    info!("Press Ctrl+C to shutdown");

    // 5. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 6. Graceful shutdown: end subscription streams first so open
    //    responses can complete, then stop accepting connections
    broker.close();
    shutdown_tx.shutdown();
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, handle.join).await.is_err() {
        warn!("HTTP server did not stop within {:?}", SHUTDOWN_TIMEOUT);
    }

    info!("Shutdown complete.");

    Ok(())
}
