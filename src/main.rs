//! Supervised handler service.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ route table ──▶ supervisor
//!                                                       │
//!                                      spawn handler ◀──┤
//!                                      (catch_unwind)   │
//!                                                       ▼
//!                                 select! finished / failure / deadline
//!                                                       │
//!     Client Response                                   ▼
//!     ◀──────────────────────────────── single guarded JSON write
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use deadline_supervisor::config::{load_config, ConfigWatcher, ServiceConfig};
use deadline_supervisor::config::validation::validate_config;
use deadline_supervisor::lifecycle::Shutdown;
use deadline_supervisor::observability::{logging, metrics};
use deadline_supervisor::{controllers, HttpServer};

#[derive(Parser, Debug)]
#[command(name = "deadline-supervisor")]
#[command(about = "Serve handlers under a per-call deadline with panic isolation", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. Watched for changes.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,

    /// Override the per-call deadline in milliseconds.
    #[arg(short, long)]
    deadline_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if let Some(deadline_ms) = cli.deadline_ms {
        config.supervision.deadline_ms = deadline_ms;
    }
    validate_config(&config).map_err(|errors| {
        errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    })?;

    logging::init_logging(&config.observability);

    tracing::info!(
        bind_address = %config.listener.bind_address,
        deadline_ms = config.supervision.deadline_ms,
        "Configuration loaded"
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

    // Keep the watcher alive for the lifetime of the server.
    let (_watcher, config_updates) = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    let server = HttpServer::new(config, controllers::routes());
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
