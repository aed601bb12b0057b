//! lanchat Daemon - Standalone broadcast server
//!
//! Accepts chat clients on a TCP port and relays every message to all of
//! them until interrupted.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default port (8080) on all interfaces
//! lanchatd
//!
//! # Custom port, from a flag or the environment
//! lanchatd --port 9000
//! LANCHAT_PORT=9000 lanchatd
//!
//! # Enable debug logging
//! RUST_LOG=lanchatd=debug lanchatd
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: stop the server, closing every connection

use std::net::IpAddr;
use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use lanchatd::registry::DEFAULT_MAX_CONNECTIONS;
use lanchatd::server::{BroadcastServer, ServerConfig, DEFAULT_PORT};

/// lanchat broadcast server
#[derive(Parser, Debug)]
#[command(name = "lanchatd", version, about)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "LANCHAT_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Address to bind
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Maximum number of simultaneous clients
    #[arg(long, default_value_t = DEFAULT_MAX_CONNECTIONS)]
    max_connections: usize,

    /// Per-client write timeout in seconds
    #[arg(long, default_value_t = 10)]
    write_timeout: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    run_server(args)
}

/// Runs the server (async entry point).
#[tokio::main]
async fn run_server(args: Args) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("lanchatd=info".parse()?)
                .add_directive("lanchat_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "lanchat daemon starting"
    );

    let config = ServerConfig {
        bind_address: args.bind,
        port: args.port,
        max_connections: args.max_connections,
        write_timeout: Duration::from_secs(args.write_timeout),
        ..Default::default()
    };

    let server = BroadcastServer::start(config)
        .await
        .context("Failed to start broadcast server")?;

    if let Err(e) = wait_for_shutdown_signal().await {
        error!(error = %e, "Error waiting for shutdown signal");
    }
    info!("Shutdown signal received");

    server.stop().await;

    info!("lanchat daemon stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
