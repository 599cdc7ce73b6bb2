//! Offline evaluation and threshold calibration for the fill model
//!
//! 101-point threshold sweep (0..=10000 bps, step 100) with a confusion
//! matrix, precision/recall/F1, block rate, and a cost score
//! `TP + cost_ratio * TN` per threshold. The recommended threshold is
//! the argmax of the cost score, ties breaking toward the lowest. A
//! decile calibration table compares predicted vs actual rates; the
//! report is well-calibrated iff the maximum per-bin absolute error is
//! below 500 bps. Two runs over the same inputs produce byte-identical
//! report bytes.

use crate::artifact::{atomic_write, Manifest};
use crate::core::digest::{canonical_pretty, sha256_hex};
use crate::core::errors::{ArtifactError, ConfigError};
use crate::ml::model::{extract_features, FillModelV0};
use crate::paper::roundtrip::{FillOutcomeRow, TradeOutcome};
use serde_json::{json, Value};
use std::path::Path;

pub const EVAL_SCHEMA_VERSION: &str = "fill_model_eval_v0";
pub const SWEEP_STEP_BPS: i64 = 100;
pub const CALIBRATION_MAX_ERROR_BPS: i64 = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct SweepEntry {
    pub threshold_bps: i64,
    pub tp: u64,
    pub fp: u64,
    pub tn: u64,
    pub fn_: u64,
    pub precision_pct: f64,
    pub recall_pct: f64,
    pub f1_pct: f64,
    pub block_rate_pct: f64,
    pub cost_score: f64,
}

impl SweepEntry {
    fn to_value(&self) -> Value {
        json!({
            "threshold_bps": self.threshold_bps,
            "tp": self.tp,
            "fp": self.fp,
            "tn": self.tn,
            "fn": self.fn_,
            "precision_pct": self.precision_pct,
            "recall_pct": self.recall_pct,
            "f1_pct": self.f1_pct,
            "block_rate_pct": self.block_rate_pct,
            "cost_score": self.cost_score,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationBin {
    /// Decile lower bound in bps (0, 1000, ..., 9000).
    pub bin_lo_bps: i64,
    pub n: u64,
    pub predicted_avg_bps: i64,
    pub actual_rate_bps: i64,
    pub abs_error_bps: i64,
}

impl CalibrationBin {
    fn to_value(&self) -> Value {
        json!({
            "bin_lo_bps": self.bin_lo_bps,
            "n": self.n,
            "predicted_avg_bps": self.predicted_avg_bps,
            "actual_rate_bps": self.actual_rate_bps,
            "abs_error_bps": self.abs_error_bps,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvalReport {
    pub n_rows: usize,
    pub n_wins: usize,
    pub n_losses: usize,
    pub n_breakeven: usize,
    pub global_prior_bps: i64,
    pub cost_ratio: f64,
    pub threshold_sweep: Vec<SweepEntry>,
    pub recommended_threshold_bps: i64,
    pub calibration: Vec<CalibrationBin>,
    pub well_calibrated: bool,
    /// SHA-256 of the model.json the evaluation ran against; the
    /// provenance link the auto-threshold resolver checks.
    pub model_sha256: String,
}

impl EvalReport {
    pub fn to_value(&self) -> Value {
        json!({
            "schema_version": EVAL_SCHEMA_VERSION,
            "n_rows": self.n_rows,
            "n_wins": self.n_wins,
            "n_losses": self.n_losses,
            "n_breakeven": self.n_breakeven,
            "global_prior_bps": self.global_prior_bps,
            "cost_ratio": self.cost_ratio,
            "threshold_sweep": self.threshold_sweep.iter().map(SweepEntry::to_value).collect::<Vec<_>>(),
            "recommended_threshold_bps": self.recommended_threshold_bps,
            "calibration": self.calibration.iter().map(CalibrationBin::to_value).collect::<Vec<_>>(),
            "well_calibrated": self.well_calibrated,
            "model_sha256": self.model_sha256,
        })
    }
}

/// Run the evaluation. `model_sha256` ties the report to the exact
/// model artifact (pass the sha of `model.json`).
pub fn evaluate_fill_model(
    rows: &[FillOutcomeRow],
    model: &FillModelV0,
    cost_ratio: f64,
    model_sha256: impl Into<String>,
) -> Result<EvalReport, ConfigError> {
    if cost_ratio <= 0.0 {
        return Err(ConfigError("cost_ratio must be positive".into()));
    }

    // One prediction per row, reused across the sweep.
    let scored: Vec<(i64, bool)> = rows
        .iter()
        .map(|row| {
            let features = extract_features(row, &model.bucket_thresholds);
            (model.predict(&features), row.outcome == TradeOutcome::Win)
        })
        .collect();

    let n_wins = scored.iter().filter(|(_, win)| *win).count();
    let n_breakeven = rows
        .iter()
        .filter(|r| r.outcome == TradeOutcome::Breakeven)
        .count();
    let n_losses = rows
        .iter()
        .filter(|r| r.outcome == TradeOutcome::Loss)
        .count();

    let mut sweep = Vec::with_capacity(101);
    for step in 0..=100 {
        let threshold_bps = step * SWEEP_STEP_BPS;
        let mut tp = 0u64;
        let mut fp = 0u64;
        let mut tn = 0u64;
        let mut fn_ = 0u64;
        for (prob, win) in &scored {
            let allowed = *prob >= threshold_bps;
            match (allowed, win) {
                (true, true) => tp += 1,
                (true, false) => fp += 1,
                (false, false) => tn += 1,
                (false, true) => fn_ += 1,
            }
        }

        let pct = |numer: u64, denom: u64| -> f64 {
            if denom == 0 {
                0.0
            } else {
                numer as f64 / denom as f64 * 100.0
            }
        };
        let precision_pct = pct(tp, tp + fp);
        let recall_pct = pct(tp, tp + fn_);
        let f1_pct = if precision_pct + recall_pct == 0.0 {
            0.0
        } else {
            2.0 * precision_pct * recall_pct / (precision_pct + recall_pct)
        };
        let block_rate_pct = pct(tn + fn_, (tp + fp + tn + fn_).max(1));
        let cost_score = tp as f64 + cost_ratio * tn as f64;

        sweep.push(SweepEntry {
            threshold_bps,
            tp,
            fp,
            tn,
            fn_,
            precision_pct,
            recall_pct,
            f1_pct,
            block_rate_pct,
            cost_score,
        });
    }

    // Argmax of cost score; the sweep is ascending so the first maximum
    // is the lowest threshold.
    let mut recommended_threshold_bps = 0;
    let mut best = f64::MIN;
    for entry in &sweep {
        if entry.cost_score > best {
            best = entry.cost_score;
            recommended_threshold_bps = entry.threshold_bps;
        }
    }

    // Decile calibration.
    let mut calibration = Vec::new();
    let mut max_error = 0i64;
    for decile in 0..10i64 {
        let lo = decile * 1_000;
        let hi = if decile == 9 { 10_001 } else { lo + 1_000 };
        let members: Vec<&(i64, bool)> = scored
            .iter()
            .filter(|(p, _)| *p >= lo && *p < hi)
            .collect();
        if members.is_empty() {
            continue;
        }
        let n = members.len() as u64;
        let predicted_avg_bps =
            members.iter().map(|(p, _)| *p).sum::<i64>() / members.len() as i64;
        let actual_rate_bps =
            members.iter().filter(|(_, w)| *w).count() as i64 * 10_000 / members.len() as i64;
        let abs_error_bps = (predicted_avg_bps - actual_rate_bps).abs();
        max_error = max_error.max(abs_error_bps);
        calibration.push(CalibrationBin {
            bin_lo_bps: lo,
            n,
            predicted_avg_bps,
            actual_rate_bps,
            abs_error_bps,
        });
    }

    Ok(EvalReport {
        n_rows: rows.len(),
        n_wins,
        n_losses,
        n_breakeven,
        global_prior_bps: model.global_prior_bps,
        cost_ratio,
        threshold_sweep: sweep,
        recommended_threshold_bps,
        calibration,
        well_calibrated: max_error < CALIBRATION_MAX_ERROR_BPS,
        model_sha256: model_sha256.into(),
    })
}

/// Write `eval_report.json` + `manifest.json` into `out_dir`.
pub fn write_eval_report(
    report: &EvalReport,
    out_dir: &Path,
    created_at_utc: &str,
) -> Result<(), ArtifactError> {
    let text = canonical_pretty(&report.to_value());
    atomic_write(&out_dir.join("eval_report.json"), text.as_bytes())?;

    let mut manifest = Manifest::new(EVAL_SCHEMA_VERSION, created_at_utc);
    manifest.row_count = report.n_rows;
    manifest.record_file("eval_report.json", sha256_hex(text.as_bytes()));
    manifest.write(out_dir)
}
