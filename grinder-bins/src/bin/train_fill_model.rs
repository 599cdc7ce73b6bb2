//! Train the fill-probability model from a persisted dataset.

use anyhow::{bail, Result};
use clap::Parser;
use grinder_core::artifact::Manifest;
use grinder_core::ml::{load_fill_dataset, FillModelV0};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Dataset directory (data.arrow + manifest.json)
    #[arg(short, long)]
    dataset: PathBuf,

    /// Output directory for the model artifact
    #[arg(short, long)]
    out_dir: PathBuf,

    /// Overwrite an existing model directory
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

    if args.out_dir.join("model.json").exists() && !args.force {
        bail!(
            "output directory {} already holds a model (use --force)",
            args.out_dir.display()
        );
    }

    let rows = load_fill_dataset(&args.dataset)?;
    let model = FillModelV0::train(&rows);
    let created_at = args.created_at_utc.unwrap_or_else(Manifest::now_utc);
    model.save(&args.out_dir, &created_at)?;

    tracing::info!("OK: fill model v0 saved to {}", args.out_dir.display());
    tracing::info!("  Bins: {}", model.bins.len());
    tracing::info!("  Global prior: {} bps", model.global_prior_bps);
    tracing::info!("  Train rows: {}", model.n_train_rows);
    Ok(())
}
