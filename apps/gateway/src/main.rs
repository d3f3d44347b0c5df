//! Gateway server
//!
//! Runs one proxy tier. A two-tier deployment runs this binary twice: a gated
//! tier with `--downstream` pointing at a fetching tier whose
//! `--public-origin` is the gated tier's origin.

use anyhow::{Context, Result};
use clap::Parser;
use edge_veil_gateway::{
    Gateway, app,
    config::{Args, GatewayConfig},
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --verbose when set
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("Edge veil gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = GatewayConfig::from_args(&args).context("Invalid configuration")?;
    let bind = config.bind;
    let gateway = Arc::new(Gateway::new(config).context("Failed to build gateway")?);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;
    info!("Listening on {}", bind);

    axum::serve(listener, app(gateway))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl-C, shutting down gracefully...");
        })
        .await
        .context("Server error")?;

    Ok(())
}
