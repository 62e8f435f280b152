//! Supervised gateway.
//!
//! A single public front door for one local backend process.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                      GATEWAY                          │
//!                      │                                                       │
//!   Client request     │  ┌──────────┐   /download*   ┌──────────────────┐     │
//!   ───────────────────┼─▶│   http   │───────────────▶│ download manager │──┐  │
//!                      │  │  server  │                └──────────────────┘  │  │
//!                      │  │          │   /ws upgrade  ┌──────────────────┐  │  │
//!                      │  │          │───────────────▶│  stream bridge   │──┼──┼──▶ Backend
//!                      │  │          │   anything     ┌──────────────────┐  │  │    (loopback)
//!                      │  │          │───────────────▶│  reverse proxy   │──┼──┼──▶
//!                      │  └──────────┘                └──────────────────┘  │  │
//!                      │                                                    ▼  │
//!                      │  ┌──────────────┐  spawn/probe/stop   ┌──────────────┐│
//!                      │  │  supervisor  │────────────────────▶│content store ││
//!                      │  └──────────────┘                     └──────────────┘│
//!                      └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use supervised_gateway::config::{load_config, GatewayConfig};
use supervised_gateway::lifecycle::{self, signals, Shutdown};
use supervised_gateway::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "supervised-gateway")]
#[command(about = "Supervise a backend process and serve it through a single front door", long_about = None)]
struct Cli {
    /// TOML configuration file. Built-in defaults are used when omitted.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long, env = "GATEWAY_BIND")]
    bind: Option<String>,

    /// Serve only the download routes; do not launch a backend.
    #[arg(long)]
    downloads_only: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if cli.downloads_only {
        config.backend.enabled = false;
    }

    logging::init_logging(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        backend_enabled = config.backend.enabled,
        storage_root = %config.storage.root.display(),
        "supervised-gateway starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let signal_task = signals::spawn_signal_handler(&shutdown);

    let result = lifecycle::run(config, shutdown).await;
    signal_task.abort();

    match result {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Gateway failed");
            Err(e.into())
        }
    }
}
