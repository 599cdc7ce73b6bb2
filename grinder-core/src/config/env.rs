//! Environment layer
//!
//! Every environment read lives here, resolved once at startup; pure
//! components receive their configuration by value. (The ML gate's
//! per-call evidence re-read is the one documented exception and lives
//! with the gate.)

use crate::live::fsm::OperatorOverride;
use std::path::PathBuf;

fn truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Overrides sourced from the process environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvOverrides {
    pub fill_model_enforce: bool,
    pub fill_prob_min_bps: Option<i64>,
    pub fill_prob_evidence: bool,
    pub artifact_dir: Option<PathBuf>,
    pub sor_enabled: bool,
    pub operator_override: Option<OperatorOverride>,
    pub consec_loss_enabled: bool,
    pub consec_loss_threshold: Option<u32>,
    pub consec_loss_evidence: bool,
    pub consec_loss_state_path: Option<PathBuf>,
    pub allow_mainnet_trade: bool,
    pub ml_kill_switch: bool,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Testable resolver over an injected lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            fill_model_enforce: lookup("GRINDER_FILL_MODEL_ENFORCE")
                .is_some_and(|v| v == "1"),
            fill_prob_min_bps: lookup("GRINDER_FILL_PROB_MIN_BPS")
                .and_then(|v| v.trim().parse().ok()),
            fill_prob_evidence: lookup("GRINDER_FILL_PROB_EVIDENCE")
                .is_some_and(|v| v == "1"),
            artifact_dir: lookup("GRINDER_ARTIFACT_DIR").map(PathBuf::from),
            sor_enabled: lookup("GRINDER_SOR_ENABLED").is_some_and(|v| truthy(&v)),
            operator_override: lookup("GRINDER_OPERATOR_OVERRIDE")
                .and_then(|v| OperatorOverride::parse(&v)),
            consec_loss_enabled: lookup("GRINDER_CONSEC_LOSS_ENABLED")
                .is_some_and(|v| v == "1"),
            consec_loss_threshold: lookup("GRINDER_CONSEC_LOSS_THRESHOLD")
                .and_then(|v| v.trim().parse().ok())
                .filter(|n| *n >= 1),
            consec_loss_evidence: lookup("GRINDER_CONSEC_LOSS_EVIDENCE")
                .is_some_and(|v| v == "1"),
            consec_loss_state_path: lookup("GRINDER_CONSEC_LOSS_STATE_PATH")
                .map(PathBuf::from),
            allow_mainnet_trade: lookup("ALLOW_MAINNET_TRADE").is_some_and(|v| truthy(&v)),
            ml_kill_switch: lookup("ML_KILL_SWITCH").is_some_and(|v| truthy(&v)),
        }
    }
}
