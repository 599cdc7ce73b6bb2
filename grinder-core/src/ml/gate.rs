//! Online fill-probability gate
//!
//! At live-action time the gate extracts the online feature vector,
//! queries the bin-count model, and compares against the threshold.
//! Below-threshold actions are SHADOW (record-only) unless enforcement
//! is active, in which case they BLOCK. Enforcement activation is
//! two-step: the environment flag plus a runtime threshold resolution
//! whose provenance chains to the loaded model.

use crate::artifact::write_with_sidecar;
use crate::core::digest::canonical_pretty;
use crate::core::time::TsMs;
use crate::execution::Side;
use crate::ml::model::{BucketThresholds, FillModelFeatures, FillModelV0};
use crate::ml::threshold::ThresholdResolution;
use crate::monitoring::MetricsRegistry;
use crate::paper::roundtrip::TradeDirection;
use rust_decimal::Decimal;
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

pub const DEFAULT_THRESHOLD_BPS: i64 = 2_500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateVerdict {
    Allow,
    Shadow,
    Block,
}

impl GateVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateVerdict::Allow => "ALLOW",
            GateVerdict::Shadow => "SHADOW",
            GateVerdict::Block => "BLOCK",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateDecision {
    pub verdict: GateVerdict,
    pub prob_bps: i64,
    pub threshold_bps: i64,
}

#[derive(Debug, Clone)]
pub struct FillProbGateConfig {
    /// Resolved enforcement flag (see `resolve_enforcement`).
    pub enforce: bool,
    pub threshold_bps: i64,
    /// Base evidence toggle from the config layer; the per-call
    /// environment check can turn evidence on at runtime.
    pub evidence_enabled: bool,
    pub artifact_dir: PathBuf,
    /// `ML_KILL_SWITCH`: disables every model query.
    pub ml_kill_switch: bool,
}

impl Default for FillProbGateConfig {
    fn default() -> Self {
        Self {
            enforce: false,
            threshold_bps: DEFAULT_THRESHOLD_BPS,
            evidence_enabled: false,
            artifact_dir: PathBuf::from("artifacts/fill_prob"),
            ml_kill_switch: false,
        }
    }
}

/// Resolve the (enforce, threshold) pair from the activation inputs.
/// Enforcement is refused, with a warning, when the auto-threshold
/// resolution is missing or does not chain to the loaded model.
pub fn resolve_enforcement(
    enforce_requested: bool,
    configured_threshold_bps: Option<i64>,
    resolution: Option<&ThresholdResolution>,
    loaded_model_sha256: &str,
) -> (bool, i64) {
    let threshold = configured_threshold_bps
        .or(resolution.map(|r| r.threshold_bps))
        .unwrap_or(DEFAULT_THRESHOLD_BPS);

    if !enforce_requested {
        return (false, threshold);
    }
    match resolution {
        Some(resolution) if resolution.model_sha256 == loaded_model_sha256 => {
            info!(threshold, "fill-prob enforcement activated");
            (true, threshold)
        }
        Some(_) => {
            warn!("fill-prob enforcement refused: provenance does not chain to loaded model");
            (false, threshold)
        }
        None => {
            warn!("fill-prob enforcement refused: no threshold resolution");
            (false, threshold)
        }
    }
}

/// Online feature extraction: direction from the order side, notional
/// bucket from the order's notional, zero fill-count and holding proxies
/// (the order has not lived yet).
pub fn extract_online_features(
    side: Side,
    price: Decimal,
    quantity: Decimal,
    thresholds: &BucketThresholds,
) -> FillModelFeatures {
    FillModelFeatures {
        direction: match side {
            Side::Buy => TradeDirection::Long,
            Side::Sell => TradeDirection::Short,
        },
        notional_bucket: thresholds.notional_bucket(price * quantity),
        entry_fill_count: 0,
        holding_ms_bucket: 0,
    }
}

pub struct FillProbGate {
    model: FillModelV0,
    config: FillProbGateConfig,
    metrics: Option<MetricsRegistry>,
}

impl FillProbGate {
    pub fn new(model: FillModelV0, config: FillProbGateConfig) -> Self {
        Self {
            model,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn bucket_thresholds(&self) -> &BucketThresholds {
        &self.model.bucket_thresholds
    }

    pub fn is_enforcing(&self) -> bool {
        self.config.enforce
    }

    /// Evaluate one proposed order. Returns `None` when the ML kill
    /// switch is active (no inference runs at all).
    pub fn check(
        &self,
        ts: TsMs,
        symbol: &str,
        features: &FillModelFeatures,
    ) -> Option<GateDecision> {
        if self.config.ml_kill_switch {
            return None;
        }
        let prob_bps = self.model.predict(features);
        let verdict = if prob_bps >= self.config.threshold_bps {
            GateVerdict::Allow
        } else if self.config.enforce {
            GateVerdict::Block
        } else {
            GateVerdict::Shadow
        };

        if verdict == GateVerdict::Block {
            warn!(
                symbol,
                prob_bps,
                threshold_bps = self.config.threshold_bps,
                "FILL_PROB_BLOCK"
            );
        }
        if let Some(metrics) = &self.metrics {
            metrics
                .fill_prob_verdicts
                .with_label_values(&[verdict.as_str()])
                .inc();
        }
        if verdict != GateVerdict::Allow && self.evidence_enabled() {
            self.write_evidence(ts, symbol, features, prob_bps, verdict);
        }

        Some(GateDecision {
            verdict,
            prob_bps,
            threshold_bps: self.config.threshold_bps,
        })
    }

    /// Evidence toggle. The environment re-read here is the one
    /// documented per-call exception to config-layer-only env access,
    /// so operators can switch evidence on without a restart.
    fn evidence_enabled(&self) -> bool {
        if self.config.evidence_enabled {
            return true;
        }
        std::env::var("GRINDER_FILL_PROB_EVIDENCE")
            .map(|v| v == "1")
            .unwrap_or(false)
    }

    fn write_evidence(
        &self,
        ts: TsMs,
        symbol: &str,
        features: &FillModelFeatures,
        prob_bps: i64,
        verdict: GateVerdict,
    ) {
        let value = json!({
            "ts_ms": ts,
            "symbol": symbol,
            "verdict": verdict.as_str(),
            "prob_bps": prob_bps,
            "threshold_bps": self.config.threshold_bps,
            "enforce": self.config.enforce,
            "bin_key": features.bin_key(),
        });
        let text = canonical_pretty(&value);
        let path = self
            .config
            .artifact_dir
            .join(format!("{ts}_{}_{symbol}.json", verdict.as_str()));
        if let Err(err) = write_with_sidecar(&path, text.as_bytes()) {
            warn!(%err, "failed to write fill-prob evidence");
        }
    }
}
