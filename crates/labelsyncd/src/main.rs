//! labelsyncd - webhook receiver and management API
//!
//! Loads the configuration once, then serves:
//! webhooks on `POST /labels`, on-demand passes on `/check/labels` and
//! rule/repository management on `/rules`, `/repos` and `/config`.

mod server;
mod webhooks;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, Level};

use labelsync_core::Config;

use crate::server::{create_router, AppState};

#[derive(Parser)]
#[command(name = "labelsyncd")]
#[command(version = labelsync_core::VERSION)]
#[command(about = "labelsync daemon", long_about = None)]
struct Args {
    /// Main configuration file
    #[arg(short, long, env = "LABELSYNC_CONFIG", default_value = "labelsync.toml")]
    config: PathBuf,

    /// Override `[server] bind`
    #[arg(short, long, env = "LABELSYNC_BIND")]
    bind: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    labelsync_core::init_tracing(args.json, level);

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {:?}", args.config))?;
    let labels = config
        .load_labels()
        .await
        .context("Failed to load labels file")?;
    let services = config
        .build_services(&labels)
        .context("Failed to build service connectors")?;

    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());
    info!(
        services = services.len(),
        rules = labels.labels.len(),
        "configuration loaded"
    );

    let state = Arc::new(AppState::new(config, services, labels.labels));
    let app = create_router(state);

    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    info!(addr = %bind, "labelsyncd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("labelsyncd stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_definition_is_consistent() {
        Args::command().debug_assert();
    }
}
