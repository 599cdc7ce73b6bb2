//! Fill probability model v0: calibrated bin counts, no ML library
//!
//! Training computes the empirical win rate per bin (basis points of
//! 10000) over the Cartesian product of direction, notional bucket,
//! capped entry-fill count, and holding-time bucket. Unseen bins fall
//! back to the global prior (5000 bps on an empty training set). The
//! artifact is canonical JSON plus a SHA-256 manifest; loading verifies
//! the digest and refuses on mismatch.

use crate::artifact::{atomic_write, Manifest};
use crate::core::digest::{canonical_pretty, sha256_hex};
use crate::core::errors::ArtifactError;
use crate::paper::roundtrip::{FillOutcomeRow, TradeDirection, TradeOutcome};
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const MODEL_SCHEMA_VERSION: &str = "fill_model_v0";
pub const DEFAULT_PRIOR_BPS: i64 = 5_000;

/// Bucket thresholds shared by training and online extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketThresholds {
    /// 4 ascending notional thresholds -> 5 buckets.
    pub notional: [Decimal; 4],
    /// 4 ascending holding-time thresholds (ms) -> 5 buckets.
    pub holding_ms: [i64; 4],
}

impl Default for BucketThresholds {
    fn default() -> Self {
        Self {
            notional: [
                Decimal::from(100),
                Decimal::from(1_000),
                Decimal::from(10_000),
                Decimal::from(100_000),
            ],
            holding_ms: [1_000, 10_000, 60_000, 600_000],
        }
    }
}

impl BucketThresholds {
    pub fn notional_bucket(&self, notional: Decimal) -> u8 {
        self.notional.iter().filter(|t| notional >= **t).count() as u8
    }

    pub fn holding_bucket(&self, holding_ms: i64) -> u8 {
        self.holding_ms.iter().filter(|t| holding_ms >= **t).count() as u8
    }

    fn to_value(&self) -> Value {
        json!({
            "notional": self.notional.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
            "holding_ms": self.holding_ms,
        })
    }

    fn from_value(value: &Value) -> Option<Self> {
        let notional: Vec<Decimal> = value
            .get("notional")?
            .as_array()?
            .iter()
            .filter_map(|v| v.as_str())
            .filter_map(|s| s.parse().ok())
            .collect();
        let holding: Vec<i64> = value
            .get("holding_ms")?
            .as_array()?
            .iter()
            .filter_map(Value::as_i64)
            .collect();
        if notional.len() != 4 || holding.len() != 4 {
            return None;
        }
        Some(Self {
            notional: [notional[0], notional[1], notional[2], notional[3]],
            holding_ms: [holding[0], holding[1], holding[2], holding[3]],
        })
    }
}

/// Feature vector the model is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillModelFeatures {
    pub direction: TradeDirection,
    pub notional_bucket: u8,
    /// Entry fill count capped at 3.
    pub entry_fill_count: u8,
    pub holding_ms_bucket: u8,
}

impl FillModelFeatures {
    pub fn bin_key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.direction.as_str(),
            self.notional_bucket,
            self.entry_fill_count,
            self.holding_ms_bucket
        )
    }
}

/// Extract the training features from a completed roundtrip.
pub fn extract_features(row: &FillOutcomeRow, thresholds: &BucketThresholds) -> FillModelFeatures {
    FillModelFeatures {
        direction: row.direction,
        notional_bucket: thresholds.notional_bucket(row.notional),
        entry_fill_count: row.entry_fill_count.min(3) as u8,
        holding_ms_bucket: thresholds.holding_bucket(row.holding_time_ms),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FillModelV0 {
    pub bins: BTreeMap<String, i64>,
    pub global_prior_bps: i64,
    pub n_train_rows: usize,
    pub bucket_thresholds: BucketThresholds,
}

impl FillModelV0 {
    /// Train from completed roundtrips. Wins count toward the rate;
    /// losses and breakevens only toward the denominator.
    pub fn train(rows: &[FillOutcomeRow]) -> Self {
        Self::train_with_thresholds(rows, BucketThresholds::default())
    }

    pub fn train_with_thresholds(rows: &[FillOutcomeRow], thresholds: BucketThresholds) -> Self {
        let mut counts: BTreeMap<String, (i64, i64)> = BTreeMap::new();
        let mut total_wins = 0i64;
        for row in rows {
            let key = extract_features(row, &thresholds).bin_key();
            let entry = counts.entry(key).or_insert((0, 0));
            entry.1 += 1;
            if row.outcome == TradeOutcome::Win {
                entry.0 += 1;
                total_wins += 1;
            }
        }

        let global_prior_bps = if rows.is_empty() {
            DEFAULT_PRIOR_BPS
        } else {
            total_wins * 10_000 / rows.len() as i64
        };

        let bins = counts
            .into_iter()
            .map(|(key, (wins, total))| (key, wins * 10_000 / total))
            .collect();

        Self {
            bins,
            global_prior_bps,
            n_train_rows: rows.len(),
            bucket_thresholds: thresholds,
        }
    }

    /// Predicted fill-win probability in bps; unseen bins use the prior.
    pub fn predict(&self, features: &FillModelFeatures) -> i64 {
        self.bins
            .get(&features.bin_key())
            .copied()
            .unwrap_or(self.global_prior_bps)
    }

    pub fn to_value(&self) -> Value {
        let mut bins = Map::new();
        for (key, value) in &self.bins {
            bins.insert(key.clone(), json!(value));
        }
        json!({
            "schema_version": MODEL_SCHEMA_VERSION,
            "bins": Value::Object(bins),
            "global_prior_bps": self.global_prior_bps,
            "n_train_rows": self.n_train_rows,
            "bucket_thresholds": self.bucket_thresholds.to_value(),
        })
    }

    pub fn from_value(value: &Value) -> Result<Self, ArtifactError> {
        let malformed = |reason: String| ArtifactError::Malformed {
            path: "model.json".to_string(),
            reason,
        };
        let schema = value
            .get("schema_version")
            .and_then(Value::as_str)
            .unwrap_or("");
        if schema != MODEL_SCHEMA_VERSION {
            return Err(malformed(format!("unsupported schema {schema:?}")));
        }
        let bins = value
            .get("bins")
            .and_then(Value::as_object)
            .ok_or_else(|| malformed("missing bins".into()))?
            .iter()
            .filter_map(|(k, v)| v.as_i64().map(|p| (k.clone(), p)))
            .collect();
        let bucket_thresholds = value
            .get("bucket_thresholds")
            .and_then(BucketThresholds::from_value)
            .ok_or_else(|| malformed("missing bucket_thresholds".into()))?;
        Ok(Self {
            bins,
            global_prior_bps: value
                .get("global_prior_bps")
                .and_then(Value::as_i64)
                .unwrap_or(DEFAULT_PRIOR_BPS),
            n_train_rows: value
                .get("n_train_rows")
                .and_then(Value::as_u64)
                .unwrap_or(0) as usize,
            bucket_thresholds,
        })
    }

    /// Save `model.json` + `manifest.json` into `out_dir`.
    pub fn save(&self, out_dir: &Path, created_at_utc: &str) -> Result<PathBuf, ArtifactError> {
        let text = canonical_pretty(&self.to_value());
        atomic_write(&out_dir.join("model.json"), text.as_bytes())?;

        let mut manifest = Manifest::new(MODEL_SCHEMA_VERSION, created_at_utc);
        manifest.row_count = self.n_train_rows;
        manifest.record_file("model.json", sha256_hex(text.as_bytes()));
        manifest.write(out_dir)?;
        Ok(out_dir.to_path_buf())
    }

    /// Load and verify a saved model. A tampered `model.json` fails the
    /// SHA-256 check.
    pub fn load(dir: &Path) -> Result<Self, ArtifactError> {
        let manifest = Manifest::load(dir)?;
        let content = manifest.verify_file(dir, "model.json")?;
        let value: Value =
            serde_json::from_slice(&content).map_err(|e| ArtifactError::Malformed {
                path: dir.join("model.json").display().to_string(),
                reason: e.to_string(),
            })?;
        Self::from_value(&value)
    }
}
