//! Agni Bridge - collectd exec plugin feeding Prometheus query results
//!
//! Startup:
//! - Load `.env`, initialize logging (stderr, stdout is the PUTVAL stream)
//! - Load `plugins.yaml` (fatal on error)
//! - Resolve hostname and interval from the collectd environment
//! - Load `querier.yaml` (defaults when absent or invalid)
//! - Spawn one poller per series and run until interrupted

use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use agni_bridge::config::{self, BridgeConfig, QuerierConfig};
use agni_bridge::manifest;
use agni_bridge::querier::PrometheusQuerier;
use agni_bridge::{Poller, StdioSink};

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("agni_bridge=info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Load everything and start the pollers
async fn start() -> Result<Vec<tokio::task::JoinHandle<()>>> {
    let dirs = config::search_dirs();

    let plugins = manifest::load_plugins(&dirs)
        .await
        .context("Failed to load plugins manifest")?;

    let bridge = BridgeConfig::from_env().context("Invalid process configuration")?;
    info!("Hostname: {}, interval: {}s", bridge.hostname, bridge.interval_secs);

    let querier_config = QuerierConfig::load(&dirs).await;
    let querier = PrometheusQuerier::from_config(&querier_config)
        .context("Failed to create Prometheus client")?;
    info!("Querying {}", querier.endpoint());

    let poller = Poller::new(
        Arc::new(querier),
        Arc::new(StdioSink),
        bridge.hostname,
        bridge.interval_secs,
    );
    Ok(poller.spawn_all(&plugins))
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_logging();

    info!("Agni bridge v{} starting...", env!("CARGO_PKG_VERSION"));

    let _pollers = match start().await {
        Ok(handles) => handles,
        Err(e) => {
            eprintln!("fatal: {:#}", e);
            process::exit(1);
        }
    };

    // Pollers never finish on their own
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Interrupted, exiting");
}
