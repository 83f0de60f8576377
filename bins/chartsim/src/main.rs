//! Chartsim binary.
//!
//! Loads the configuration, seeds the roster and either fast-forwards a fixed
//! number of ticks in virtual time (printing a JSON snapshot) or runs the
//! periodic tick loop on the wall clock until Ctrl+C.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chartsim_runtime::{SimConfig, Simulation};
use chrono::Utc;
use clap::Parser;
use tracing::info;

/// Popularity-driven metric simulation with multi-platform charts.
#[derive(Parser, Debug)]
#[command(
    name = "chartsim",
    version,
    about = "Simulate metric growth and chart ranks for a roster of releases"
)]
struct Args {
    /// Configuration file (TOML). Defaults to <config dir>/chartsim/chartsim.toml if present.
    #[arg(long)]
    config: Option<PathBuf>,

    /// RNG seed; overrides the configured one
    #[arg(long)]
    seed: Option<u64>,

    /// Run this many ticks in virtual time, print a snapshot and exit
    #[arg(long)]
    ticks: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format ("text" or "json")
    #[arg(long, default_value = "text")]
    log_format: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, &args.log_format);

    let mut config = SimConfig::load(args.config.as_deref()).context("loading configuration")?;
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    info!("chartsim v{}", env!("CARGO_PKG_VERSION"));
    info!(
        platforms = config.platforms.len(),
        interval_secs = config.tick_interval_secs,
        history_cap = config.history_cap,
        seed = ?config.seed,
        "configuration loaded"
    );

    let sim = Simulation::new(config).context("building simulation")?;
    let start = Utc::now();
    sim.seed_roster(start).context("seeding roster")?;

    if let Some(ticks) = args.ticks {
        let end = sim.fast_forward(start, ticks);
        let snapshot = sim.snapshot(end);
        println!(
            "{}",
            serde_json::to_string_pretty(&snapshot).context("encoding snapshot")?
        );
        return Ok(());
    }

    info!("simulation running (Ctrl+C to stop)");
    tokio::select! {
        _ = sim.run() => {
            info!("simulation loop exited");
        }
        res = tokio::signal::ctrl_c() => {
            res.context("installing Ctrl+C handler")?;
            info!("received Ctrl+C, shutting down");
        }
    }

    info!("chartsim shutdown complete");
    Ok(())
}

/// Initialize tracing with the given level and output format.
///
/// `RUST_LOG` takes precedence over `level_str`. `format = "json"` selects
/// structured JSON output; anything else is human-readable text.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    // Logs go to stderr so a printed snapshot stays clean JSON.
    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
