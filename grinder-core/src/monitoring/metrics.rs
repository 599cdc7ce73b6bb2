//! Counter/gauge registry with a guarded label taxonomy
//!
//! Counters and gauges only. High-cardinality labels are forbidden by
//! construction: label *names* are checked against a deny list, and the
//! `op` label only accepts the nine-operation taxonomy (anything else is
//! recorded as `invalid`). How the registry is scraped is someone else's
//! problem.

use crate::port::OP_TAXONOMY;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;
use tracing::warn;

/// Label names that would explode cardinality.
pub const FORBIDDEN_LABEL_NAMES: [&str; 4] = ["symbol", "order_id", "key", "client_id"];

pub fn assert_label_names_allowed(names: &[&str]) {
    for name in names {
        assert!(
            !FORBIDDEN_LABEL_NAMES.contains(name),
            "label name {name:?} is forbidden (high cardinality)"
        );
    }
}

/// Central metric registry for the engine.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Arc<Registry>,
    /// Port operations by op and outcome (ok/error/rejected).
    pub port_ops: IntCounterVec,
    pub reconcile_runs: IntCounter,
    pub mismatches: IntCounterVec,
    pub remediation_attempts: IntCounterVec,
    pub remediation_blocked: IntCounterVec,
    pub router_decisions: IntCounterVec,
    pub live_actions: IntCounterVec,
    pub fill_prob_verdicts: IntCounterVec,
    pub observed_snapshot_age_ms: IntGauge,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Arc::new(Registry::new());

        let make_vec = |name: &str, help: &str, labels: &[&str]| {
            assert_label_names_allowed(labels);
            let vec = IntCounterVec::new(Opts::new(name, help).namespace("grinder"), labels)?;
            registry.register(Box::new(vec.clone()))?;
            Ok::<_, prometheus::Error>(vec)
        };

        let port_ops = make_vec(
            "port_ops_total",
            "Exchange port operations by op and outcome",
            &["op", "outcome"],
        )?;
        let reconcile_runs = IntCounter::new(
            "grinder_reconcile_runs_total",
            "Reconciliation passes executed",
        )?;
        registry.register(Box::new(reconcile_runs.clone()))?;
        let mismatches = make_vec(
            "reconcile_mismatches_total",
            "Mismatches by type",
            &["mismatch_type"],
        )?;
        let remediation_attempts = make_vec(
            "remediation_attempts_total",
            "Remediation attempts by action and status",
            &["action", "status"],
        )?;
        let remediation_blocked = make_vec(
            "remediation_blocked_total",
            "Remediation blocks by reason",
            &["reason"],
        )?;
        let router_decisions = make_vec(
            "router_decisions_total",
            "Smart order router decisions",
            &["decision", "reason"],
        )?;
        let live_actions = make_vec(
            "live_actions_total",
            "Live engine action outcomes",
            &["status"],
        )?;
        let fill_prob_verdicts = make_vec(
            "fill_prob_verdicts_total",
            "Fill-probability gate verdicts",
            &["verdict"],
        )?;
        let observed_snapshot_age_ms = IntGauge::new(
            "grinder_observed_snapshot_age_ms",
            "Age of the most recent observed-state refresh",
        )?;
        registry.register(Box::new(observed_snapshot_age_ms.clone()))?;

        Ok(Self {
            registry,
            port_ops,
            reconcile_runs,
            mismatches,
            remediation_attempts,
            remediation_blocked,
            router_decisions,
            live_actions,
            fill_prob_verdicts,
            observed_snapshot_age_ms,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a port operation, clamping unknown ops to `invalid` so the
    /// label set stays closed.
    pub fn record_port_op(&self, op: &str, outcome: &str) {
        let op = if OP_TAXONOMY.contains(&op) {
            op
        } else {
            warn!(op, "op outside taxonomy, recording as invalid");
            "invalid"
        };
        self.port_ops.with_label_values(&[op, outcome]).inc();
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        // Metric construction only fails on duplicate registration, which
        // cannot happen on a fresh registry.
        Self::new().expect("fresh metrics registry")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_constructs() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.record_port_op("place_order", "ok");
        assert_eq!(
            metrics.port_ops.with_label_values(&["place_order", "ok"]).get(),
            1
        );
    }

    #[test]
    fn test_unknown_op_clamped_to_invalid() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.record_port_op("BTCUSDT", "ok");
        assert_eq!(
            metrics.port_ops.with_label_values(&["invalid", "ok"]).get(),
            1
        );
    }

    #[test]
    #[should_panic(expected = "forbidden")]
    fn test_forbidden_label_names_rejected() {
        assert_label_names_allowed(&["op", "symbol"]);
    }

    #[test]
    fn test_counters_accumulate() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.mismatches.with_label_values(&["ORDER_MISSING_ON_EXCHANGE"]).inc();
        metrics.mismatches.with_label_values(&["ORDER_MISSING_ON_EXCHANGE"]).inc();
        assert_eq!(
            metrics
                .mismatches
                .with_label_values(&["ORDER_MISSING_ON_EXCHANGE"])
                .get(),
            2
        );
    }
}
