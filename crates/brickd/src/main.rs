//! # brickd
//!
//! Script execution daemon binary — binds the WebSocket endpoint and runs
//! until a shutdown signal or a `shutdownGnikrap` action arrives.

#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use brickd_runtime::NullHardware;
use brickd_server::{App, HostSystem};

/// Script execution daemon.
#[derive(Parser, Debug)]
#[command(name = "brickd", about = "Script execution daemon")]
struct Cli {
    /// Host to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to bind.
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Debug-level logging (unless RUST_LOG overrides it).
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let app = App::new(Arc::new(NullHardware), Arc::new(HostSystem));

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(addr = %addr, "brickd listening");

    let shutdown = app.shutdown.clone();
    axum::serve(listener, app.router())
        .with_graceful_shutdown(async move {
            tokio::select! {
                () = shutdown.cancelled() => {}
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "failed to listen for ctrl+c");
                    }
                    shutdown.cancel();
                }
            }
        })
        .await
        .context("server error")?;

    // A signal-triggered exit still stops any running script cleanly.
    let _ = app.scripts.stop_with_configured_grace().await;
    tracing::info!("shut down");
    Ok(())
}
