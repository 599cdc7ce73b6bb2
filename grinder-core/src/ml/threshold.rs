//! Auto-threshold resolution with provenance checking
//!
//! Resolves the enforcement threshold from a persisted eval report,
//! validating three layers: the report's SHA-256 against its manifest,
//! the report schema, and the provenance chain (the report's recorded
//! model SHA-256 must match the currently loaded model artifact).
//! Enforcement is refused when any layer fails.

use crate::artifact::Manifest;
use crate::core::digest::sha256_hex;
use crate::ml::eval::EVAL_SCHEMA_VERSION;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Successful resolution: the threshold plus the provenance digests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdResolution {
    pub threshold_bps: i64,
    pub eval_report_sha256: String,
    pub model_sha256: String,
}

/// Resolve the recommended threshold from `eval_dir`, chained to the
/// model in `model_dir`. Returns `None` (with a logged reason) when any
/// validation layer fails; enforcement must not be activated then.
pub fn resolve_threshold(eval_dir: &Path, model_dir: &Path) -> Option<ThresholdResolution> {
    // Layer 1: report bytes match the eval manifest.
    let manifest = match Manifest::load(eval_dir) {
        Ok(manifest) => manifest,
        Err(err) => {
            warn!(%err, "auto-threshold: eval manifest unreadable");
            return None;
        }
    };
    let report_bytes = match manifest.verify_file(eval_dir, "eval_report.json") {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(%err, "auto-threshold: eval report failed sha256 check");
            return None;
        }
    };
    let eval_report_sha256 = sha256_hex(&report_bytes);

    // Layer 2: schema and threshold field.
    let report: Value = match serde_json::from_slice(&report_bytes) {
        Ok(value) => value,
        Err(err) => {
            warn!(%err, "auto-threshold: eval report is not JSON");
            return None;
        }
    };
    if report.get("schema_version").and_then(Value::as_str) != Some(EVAL_SCHEMA_VERSION) {
        warn!("auto-threshold: unexpected eval schema");
        return None;
    }
    let threshold_bps = match report
        .get("recommended_threshold_bps")
        .and_then(Value::as_i64)
    {
        Some(value) if (0..=10_000).contains(&value) => value,
        _ => {
            warn!("auto-threshold: missing or out-of-range recommended_threshold_bps");
            return None;
        }
    };

    // Layer 3: provenance. The report's recorded model digest must match
    // the model artifact on disk.
    let recorded_model_sha = report
        .get("model_sha256")
        .and_then(Value::as_str)
        .unwrap_or("");
    let model_bytes = match fs::read(model_dir.join("model.json")) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(%err, "auto-threshold: model.json unreadable");
            return None;
        }
    };
    let actual_model_sha = sha256_hex(&model_bytes);
    if recorded_model_sha != actual_model_sha {
        warn!(
            recorded = %&recorded_model_sha[..recorded_model_sha.len().min(16)],
            actual = %&actual_model_sha[..16],
            "auto-threshold: provenance mismatch, eval does not chain to loaded model"
        );
        return None;
    }

    Some(ThresholdResolution {
        threshold_bps,
        eval_report_sha256,
        model_sha256: actual_model_sha,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::eval::{evaluate_fill_model, write_eval_report};
    use crate::ml::model::test_rows::mixed_rows;
    use crate::ml::model::FillModelV0;

    fn setup() -> (tempfile::TempDir, tempfile::TempDir) {
        let model_dir = tempfile::tempdir().unwrap();
        let eval_dir = tempfile::tempdir().unwrap();

        let rows = mixed_rows();
        let model = FillModelV0::train(&rows);
        model.save(model_dir.path(), "2024-01-01T00:00:00Z").unwrap();

        let model_sha = sha256_hex(&fs::read(model_dir.path().join("model.json")).unwrap());
        let report = evaluate_fill_model(&rows, &model, 2.0, model_sha).unwrap();
        write_eval_report(&report, eval_dir.path(), "2024-01-01T00:00:00Z").unwrap();

        (model_dir, eval_dir)
    }

    #[test]
    fn test_resolution_succeeds_when_chained() {
        let (model_dir, eval_dir) = setup();
        let resolution = resolve_threshold(eval_dir.path(), model_dir.path()).unwrap();
        assert!((0..=10_000).contains(&resolution.threshold_bps));
        assert_eq!(resolution.model_sha256.len(), 64);
    }

    #[test]
    fn test_tampered_report_refused() {
        let (model_dir, eval_dir) = setup();
        let path = eval_dir.path().join("eval_report.json");
        let content = fs::read_to_string(&path).unwrap();
        fs::write(&path, content.replace("6000", "9000")).unwrap();

        assert!(resolve_threshold(eval_dir.path(), model_dir.path()).is_none());
    }

    #[test]
    fn test_retrained_model_breaks_provenance() {
        let (model_dir, eval_dir) = setup();
        // Retrain on a different set: model.json changes.
        let rows: Vec<_> = (0..3)
            .map(|i| {
                crate::ml::model::test_rows::make_row(
                    crate::paper::roundtrip::TradeOutcome::Loss,
                    i,
                )
            })
            .collect();
        FillModelV0::train(&rows)
            .save(model_dir.path(), "2024-01-02T00:00:00Z")
            .unwrap();

        assert!(resolve_threshold(eval_dir.path(), model_dir.path()).is_none());
    }

    #[test]
    fn test_missing_model_refused() {
        let (_model_dir, eval_dir) = setup();
        let empty = tempfile::tempdir().unwrap();
        assert!(resolve_threshold(eval_dir.path(), empty.path()).is_none());
    }
}
