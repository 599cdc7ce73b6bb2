//! Build a fill-outcome dataset from a paper replay.
//!
//! Runs the fixture through the paper engine, collects completed
//! roundtrips, and writes `data.arrow` + `manifest.json`.

use anyhow::{bail, Result};
use clap::Parser;
use grinder_core::artifact::Manifest;
use grinder_core::ml::build_fill_dataset;
use grinder_core::prelude::*;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Fixture directory to replay
    #[arg(short, long)]
    fixture: PathBuf,

    /// Output directory for the dataset
    #[arg(short, long)]
    out_dir: PathBuf,

    /// Overwrite an existing dataset directory
    #[arg(long)]
    force: bool,

    /// Override the manifest timestamp (for deterministic builds)
    #[arg(long)]
    created_at_utc: Option<String>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    grinder_bins::common::init_logging(&args.log_level)?;

    if args.out_dir.join("manifest.json").exists() && !args.force {
        bail!(
            "output directory {} already holds a dataset (use --force)",
            args.out_dir.display()
        );
    }

    let mut config = PaperEngineConfig::default();
    config.fill_after_ticks = 1;
    let mut engine = PaperEngine::new(config);
    let result = engine.run(&args.fixture);
    if !result.errors.is_empty() {
        bail!("replay produced {} errors", result.errors.len());
    }

    let rows = engine.completed_roundtrips();
    let created_at = args
        .created_at_utc
        .unwrap_or_else(Manifest::now_utc);
    build_fill_dataset(rows, &args.out_dir, &created_at)?;

    tracing::info!(
        "OK: dataset with {} roundtrips written to {}",
        rows.len(),
        args.out_dir.display()
    );
    Ok(())
}
