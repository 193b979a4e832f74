//! Find the serial port a device answers on.
//!
//! Asks every serial port for its product id and prints the first port
//! reporting the target, e.g. `sensorlink-find '<id:beamscan>'`.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use sensorlink::discovery::{PortScanner, ProbeConfig};
use sensorlink::tracing;

#[derive(Parser)]
#[command(name = "sensorlink-find", version, about = "Locate a device by product id")]
struct Args {
    /// Product id the firmware reports, compared ignoring case
    target: String,

    /// Milliseconds to let the firmware settle after opening a port
    #[arg(long, default_value_t = 2000)]
    settle_ms: u64,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing::init_journald_or_stdout();
    let args = Args::parse();

    let config = ProbeConfig {
        settle: Duration::from_millis(args.settle_ms),
        ..ProbeConfig::default()
    };

    let start = Instant::now();
    let scanner = PortScanner::native(config).context("listing serial ports")?;
    let found = scanner.scan(&args.target).await;

    match &found {
        Some(port) => println!("found {} on: {}", args.target, port),
        None => println!("NOT found"),
    }
    println!("scan took: {} ms", start.elapsed().as_millis());

    Ok(if found.is_some() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
