//! relay-proxy
//!
//! Reverse proxy for plain HTTP and WebSocket traffic, built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request        ┌───────────────────────────────────────────────┐
//!     ──────────────────────┼─▶ http::server ──▶ routing::registry          │
//!                           │   (per listener)   (prefix, rewrite)          │
//!                           │        │                                      │
//!                           │        ├── plain ──▶ http::forward ───────────┼──▶ Backend
//!                           │        │                                      │
//!                           │        └── upgrade ─▶ relay::session ─────────┼──▶ Backend
//!                           │                       (pump, heartbeat,       │    (socket)
//!                           │                        reconnect)             │
//!                           │                                               │
//!                           │  Cross-cutting: config, lifecycle (shutdown), │
//!                           │  observability, resilience (backoff, timeout) │
//!                           └───────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use relay_proxy::config::load_config;
use relay_proxy::lifecycle::{signals, ShutdownCoordinator};
use relay_proxy::observability::{logging, metrics};
use relay_proxy::ProxyServer;

#[derive(Parser)]
#[command(name = "relay-proxy")]
#[command(about = "Reverse proxy for HTTP and WebSocket upstreams", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "relay-proxy.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    logging::init(&config.observability.log_level)?;
    tracing::info!(
        config = %cli.config.display(),
        listeners = config.listeners.len(),
        upstreams = config.upstreams.len(),
        "relay-proxy starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let coordinator = Arc::new(ShutdownCoordinator::new(Duration::from_secs(
        config.shutdown.drain_timeout_secs,
    )));
    let server = ProxyServer::from_config(&config, Arc::clone(&coordinator))?;
    signals::spawn_signal_handler(coordinator);

    server.run(&config).await?;

    tracing::info!("relay-proxy stopped");
    Ok(())
}
