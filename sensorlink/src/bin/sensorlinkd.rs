//! Device server daemon.
//!
//! Connects to the device named in the configuration file and streams from
//! it until the link ends. Always exits afterwards; run it under a
//! supervisor that restarts it.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use sensorlink::config::Config;
use sensorlink::device::DriverRegistry;
use sensorlink::server::DeviceServer;
use sensorlink::shutdown::ProcessExit;
use sensorlink::tracing::{self, prelude::*};

#[derive(Parser)]
#[command(name = "sensorlinkd", version, about = "Serial sensor link daemon")]
struct Args {
    /// Configuration file (TOML)
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing::init_journald_or_stdout();
    let args = Args::parse();

    let config = Config::load_from(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    info!(
        device = %config.device,
        port = %config.port,
        watchdog = config.enable_watchdog,
        "Started."
    );

    let server = DeviceServer::new(config, Arc::new(ProcessExit));
    let cancel = server.cancel_token();
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(()) => {
                trace!("Shutting down.");
                cancel.cancel();
            }
            Err(e) => warn!(error = %e, "Signal handlers unavailable"),
        }
    });

    let registry = DriverRegistry::builtin();
    server.run(&registry).await;

    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<()> {
    use tokio::signal::unix::{self, SignalKind};

    let mut sigint = unix::signal(SignalKind::interrupt())?;
    let mut sigterm = unix::signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
