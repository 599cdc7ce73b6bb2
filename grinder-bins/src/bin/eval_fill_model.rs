//! Offline evaluation and threshold calibration for a trained model.

use anyhow::{bail, Result};
use clap::Parser;
use grinder_core::artifact::Manifest;
use grinder_core::core::digest::sha256_hex;
use grinder_core::ml::{evaluate_fill_model, load_fill_dataset, write_eval_report, FillModelV0};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Dataset directory (data.arrow + manifest.json)
    #[arg(short, long)]
    dataset: PathBuf,

    /// Model directory (model.json + manifest.json)
    #[arg(short, long)]
    model: PathBuf,

    /// Output directory for the eval report
    #[arg(short, long)]
    out_dir: PathBuf,

    /// Weight of avoided losses relative to kept wins
    #[arg(long, default_value = "2.0")]
    cost_ratio: f64,

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

    let rows = load_fill_dataset(&args.dataset)?;
    let model = FillModelV0::load(&args.model)?;
    let model_sha = sha256_hex(&std::fs::read(args.model.join("model.json"))?);

    let report = match evaluate_fill_model(&rows, &model, args.cost_ratio, model_sha) {
        Ok(report) => report,
        Err(err) => bail!("evaluation failed: {err}"),
    };
    let created_at = args.created_at_utc.unwrap_or_else(Manifest::now_utc);
    write_eval_report(&report, &args.out_dir, &created_at)?;

    tracing::info!(
        "Dataset: {} rows ({} wins, {} losses, {} breakeven)",
        report.n_rows,
        report.n_wins,
        report.n_losses,
        report.n_breakeven
    );
    tracing::info!("Cost ratio: {}", report.cost_ratio);
    tracing::info!(
        "Recommended threshold: {} bps",
        report.recommended_threshold_bps
    );
    tracing::info!(
        "Calibration: {}",
        if report.well_calibrated {
            "well-calibrated"
        } else {
            "NOT well-calibrated"
        }
    );
    tracing::info!("OK: eval report written to {}", args.out_dir.display());
    Ok(())
}
