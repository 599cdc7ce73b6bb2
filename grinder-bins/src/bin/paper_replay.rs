//! Paper replay: run a fixture through the paper engine and print the
//! result summary with its canonical digest.

use anyhow::Result;
use clap::Parser;
use grinder_core::prelude::*;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Fixture directory holding events.jsonl or events.json
    #[arg(short, long)]
    fixture: PathBuf,

    /// Grid spacing in basis points
    #[arg(long, default_value = "10")]
    spacing_bps: u32,

    /// Levels on each side of the grid
    #[arg(long, default_value = "5")]
    levels: u32,

    /// Ticks an order must rest before it can fill
    #[arg(long, default_value = "0")]
    fill_after_ticks: u64,

    /// Emit the full result JSON instead of the summary
    #[arg(long)]
    json: bool,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    grinder_bins::common::init_logging(&args.log_level)?;

    let mut config = PaperEngineConfig::default();
    config.grid.spacing_bps = args.spacing_bps;
    config.grid.levels = args.levels;
    config.fill_after_ticks = args.fill_after_ticks;

    let mut engine = PaperEngine::new(config);
    let result = engine.run(&args.fixture);

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result.to_value())?
        );
        return Ok(());
    }

    tracing::info!("=== Paper Replay ===");
    tracing::info!("Fixture: {}", result.fixture_path);
    tracing::info!("Events processed: {}", result.events_processed);
    tracing::info!("Events gated: {}", result.events_gated);
    tracing::info!("Orders placed: {}", result.orders_placed);
    tracing::info!("Total fills: {}", result.total_fills);
    tracing::info!("Realized PnL: {}", result.total_realized_pnl);
    tracing::info!("Unrealized PnL: {}", result.total_unrealized_pnl);
    tracing::info!("Digest: {}", result.digest);
    for error in &result.errors {
        tracing::warn!("Error: {error}");
    }

    if result.errors.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{} errors during replay", result.errors.len())
    }
}
