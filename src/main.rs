//! Staged configuration service.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                 STAGED CONFIG SERVICE                 │
//!                 │                                                        │
//!   REST request  │  ┌──────────┐    ┌───────────┐    ┌────────────────┐  │
//!   ──────────────┼─▶│   http   │───▶│ changeset │───▶│   validator    │  │
//!                 │  │ handlers │    │ sessions  │    │  rule set      │  │
//!                 │  └────┬─────┘    └───────────┘    └───────┬────────┘  │
//!                 │       │                                   │           │
//!                 │       ▼                                   ▼           │
//!                 │  ┌──────────┐    ┌───────────┐    ┌────────────────┐  │
//!                 │  │  export  │    │  history  │◀───│ commit engine  │──┼──▶ activation
//!                 │  │json/yaml │    │ versions  │    │ apply pipeline │  │    endpoint
//!                 │  └──────────┘    └───────────┘    └────────────────┘  │
//!                 │                                                        │
//!                 │  config · lifecycle · observability · admin · net      │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;

use staged_config::config::{load_config, ServiceConfig};
use staged_config::lifecycle;
use staged_config::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "staged-config")]
#[command(about = "Staged configuration service", long_about = None)]
struct Args {
    /// Settings file (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "staged-config starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        activation = ?config.activation.mode,
        persistence = ?config.history.persistence_path,
        admin = config.admin.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                metrics::init_metrics(addr);
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    lifecycle::run(config, args.config).await?;
    Ok(())
}
