//! Engine configuration: typed defaults, named profiles, env overrides

pub mod env;

pub use env::EnvOverrides;

use crate::live::engine::LiveEngineConfig;
use crate::live::fsm::{EngineMode, OperatorOverrideSignal};
use crate::ml::gate::FillProbGateConfig;
use crate::paper::PaperEngineConfig;
use crate::port::breaker::CircuitBreakerConfig;
use crate::port::RetryPolicy;
use crate::reconcile::remediation::RemediationConfig;
use crate::reconcile::ReconcileEngineConfig;
use crate::risk::consecutive_loss::ConsecutiveLossConfig;
use crate::risk::drawdown::DrawdownGuardConfig;

/// Top-level configuration for a deployment.
#[derive(Debug, Clone)]
pub struct GrinderConfig {
    pub paper: PaperEngineConfig,
    pub live: LiveEngineConfig,
    pub retry: RetryPolicy,
    pub breaker: CircuitBreakerConfig,
    pub reconcile: ReconcileEngineConfig,
    pub remediation: RemediationConfig,
    pub consec_loss: ConsecutiveLossConfig,
    pub fill_gate: FillProbGateConfig,
    pub drawdown: DrawdownGuardConfig,
}

impl Default for GrinderConfig {
    fn default() -> Self {
        Self {
            paper: PaperEngineConfig::default(),
            live: LiveEngineConfig::default(),
            retry: RetryPolicy::default(),
            breaker: CircuitBreakerConfig::default(),
            reconcile: ReconcileEngineConfig::default(),
            remediation: RemediationConfig::default(),
            consec_loss: ConsecutiveLossConfig::default(),
            fill_gate: FillProbGateConfig::default(),
            drawdown: DrawdownGuardConfig::default(),
        }
    }
}

impl GrinderConfig {
    /// Paper replay: everything defensive, no live surface.
    pub fn paper_profile() -> Self {
        Self::default()
    }

    /// Shadow live: full pipeline, writes disabled.
    pub fn shadow_profile() -> Self {
        Self {
            live: LiveEngineConfig {
                armed: false,
                mode: EngineMode::Shadow,
                ..LiveEngineConfig::default()
            },
            ..Self::default()
        }
    }

    /// Fold the environment overrides in and seed the operator override
    /// signal. Returns the signal for the FSM and the consec-loss wiring.
    pub fn apply_env(&mut self, overrides: &EnvOverrides) -> OperatorOverrideSignal {
        let signal = OperatorOverrideSignal::new();
        if let Some(value) = overrides.operator_override {
            signal.set(value);
        }

        self.live.sor_enabled = self.live.sor_enabled || overrides.sor_enabled;

        self.consec_loss.enabled = self.consec_loss.enabled || overrides.consec_loss_enabled;
        if let Some(threshold) = overrides.consec_loss_threshold {
            self.consec_loss.threshold = threshold;
        }
        self.consec_loss.evidence_enabled =
            self.consec_loss.evidence_enabled || overrides.consec_loss_evidence;

        if let Some(dir) = &overrides.artifact_dir {
            self.fill_gate.artifact_dir = dir.clone();
        }
        if let Some(threshold) = overrides.fill_prob_min_bps {
            self.fill_gate.threshold_bps = threshold;
        }
        self.fill_gate.evidence_enabled =
            self.fill_gate.evidence_enabled || overrides.fill_prob_evidence;
        self.fill_gate.ml_kill_switch = overrides.ml_kill_switch;
        // Note: `fill_gate.enforce` is NOT set here; enforcement requires
        // the second activation step (threshold resolution with
        // provenance), see `ml::gate::resolve_enforcement`.

        signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::fsm::OperatorOverride;

    #[test]
    fn test_defaults_are_defensive() {
        let config = GrinderConfig::default();
        assert!(!config.live.armed);
        assert!(!config.fill_gate.enforce);
        assert!(config.remediation.dry_run);
        assert!(!config.remediation.allow_active_remediation);
    }

    #[test]
    fn test_apply_env_seeds_override_signal() {
        let mut config = GrinderConfig::default();
        let overrides = EnvOverrides {
            operator_override: Some(OperatorOverride::Pause),
            sor_enabled: true,
            consec_loss_enabled: true,
            consec_loss_threshold: Some(3),
            fill_prob_min_bps: Some(4_000),
            ..Default::default()
        };
        let signal = config.apply_env(&overrides);

        assert_eq!(signal.get(), Some(OperatorOverride::Pause));
        assert!(config.live.sor_enabled);
        assert!(config.consec_loss.enabled);
        assert_eq!(config.consec_loss.threshold, 3);
        assert_eq!(config.fill_gate.threshold_bps, 4_000);
        // Enforcement stays off without the resolution step.
        assert!(!config.fill_gate.enforce);
    }
}
