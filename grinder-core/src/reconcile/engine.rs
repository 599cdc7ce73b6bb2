//! Reconcile engine: expected vs observed classification
//!
//! Pure classification: every discrepancy becomes an independent
//! `Mismatch`; nothing aborts a pass. Orders without our prefix are
//! foreign and ignored entirely.

use crate::core::ids::OrderIdPolicy;
use crate::core::time::{SharedClock, TsMs};
use crate::monitoring::MetricsRegistry;
use crate::reconcile::expected::ExpectedStateStore;
use crate::reconcile::observed::ObservedStateStore;
use serde_json::{json, Value};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchType {
    OrderMissingOnExchange,
    OrderExistsUnexpected,
    PositionNonzeroUnexpected,
}

impl MismatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MismatchType::OrderMissingOnExchange => "ORDER_MISSING_ON_EXCHANGE",
            MismatchType::OrderExistsUnexpected => "ORDER_EXISTS_UNEXPECTED",
            MismatchType::PositionNonzeroUnexpected => "POSITION_NONZERO_UNEXPECTED",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    pub mismatch_type: MismatchType,
    pub symbol: String,
    pub client_order_id: Option<String>,
    pub details: Value,
}

#[derive(Debug, Clone)]
pub struct ReconcileEngineConfig {
    pub enabled: bool,
    /// Expected orders younger than this are never reported missing
    /// (the exchange may simply not show them yet).
    pub order_grace_period_ms: i64,
}

impl Default for ReconcileEngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            order_grace_period_ms: 5_000,
        }
    }
}

pub struct ReconcileEngine {
    config: ReconcileEngineConfig,
    id_policy: OrderIdPolicy,
    clock: SharedClock,
    metrics: Option<MetricsRegistry>,
}

impl ReconcileEngine {
    pub fn new(config: ReconcileEngineConfig, id_policy: OrderIdPolicy, clock: SharedClock) -> Self {
        Self {
            config,
            id_policy,
            clock,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// One reconciliation pass. Returns all mismatches found.
    pub fn reconcile(
        &self,
        expected: &ExpectedStateStore,
        observed: &ObservedStateStore,
    ) -> Vec<Mismatch> {
        if !self.config.enabled {
            return Vec::new();
        }
        let now = self.clock.now_ms();
        let mut mismatches = Vec::new();

        // Expected orders the exchange does not show, past the grace
        // period.
        for order in expected.orders() {
            if observed.order(&order.client_order_id).is_some() {
                continue;
            }
            let age_ms = now - order.ts_created;
            if age_ms <= self.config.order_grace_period_ms {
                continue;
            }
            mismatches.push(Mismatch {
                mismatch_type: MismatchType::OrderMissingOnExchange,
                symbol: order.symbol.clone(),
                client_order_id: Some(order.client_order_id.clone()),
                details: json!({
                    "age_ms": age_ms,
                    "grace_period_ms": self.config.order_grace_period_ms,
                }),
            });
        }

        // Observed orders with our prefix that we never issued. Foreign
        // orders are out of scope.
        for order in observed.orders() {
            if !self.id_policy.is_ours(&order.client_order_id) {
                continue;
            }
            if expected.order(&order.client_order_id).is_some() {
                continue;
            }
            mismatches.push(Mismatch {
                mismatch_type: MismatchType::OrderExistsUnexpected,
                symbol: order.symbol.clone(),
                client_order_id: Some(order.client_order_id.clone()),
                details: json!({
                    "status": order.status,
                    "orig_qty": order.orig_qty.to_string(),
                }),
            });
        }

        // Positions the exchange holds where we expect flat.
        for position in observed.positions() {
            if !expected.expected_position(&position.symbol).is_zero() {
                continue;
            }
            mismatches.push(Mismatch {
                mismatch_type: MismatchType::PositionNonzeroUnexpected,
                symbol: position.symbol.clone(),
                client_order_id: None,
                details: json!({
                    "position_amt": position.position_amt.to_string(),
                    "entry_price": position.entry_price.to_string(),
                }),
            });
        }

        if let Some(metrics) = &self.metrics {
            metrics.reconcile_runs.inc();
            for mismatch in &mismatches {
                metrics
                    .mismatches
                    .with_label_values(&[mismatch.mismatch_type.as_str()])
                    .inc();
            }
            metrics
                .observed_snapshot_age_ms
                .set(now - observed.last_refresh_ms());
        }

        if !mismatches.is_empty() {
            info!(count = mismatches.len(), "reconcile found mismatches");
        }
        mismatches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::FakeClock;
    use crate::execution::Side;
    use crate::reconcile::expected::ExpectedOrder;
    use crate::reconcile::observed::{ObservedOrder, ObservedPosition};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    const NOW: TsMs = 10_000_000;

    fn engine(clock: &FakeClock) -> ReconcileEngine {
        ReconcileEngine::new(
            ReconcileEngineConfig {
                enabled: true,
                order_grace_period_ms: 5_000,
            },
            OrderIdPolicy::default_with_strategies(["static".to_string()]),
            Arc::new(clock.clone()),
        )
    }

    fn expected_order(id: &str, ts_created: TsMs) -> ExpectedOrder {
        ExpectedOrder {
            client_order_id: id.into(),
            symbol: "BTCUSDT".into(),
            side: Side::Buy,
            price: dec!(50000),
            quantity: dec!(0.1),
            ts_created,
        }
    }

    fn observed_order(id: &str) -> ObservedOrder {
        ObservedOrder {
            client_order_id: id.into(),
            symbol: "BTCUSDT".into(),
            side: Side::Buy,
            price: dec!(50000),
            orig_qty: dec!(0.1),
            executed_qty: dec!(0),
            status: "NEW".into(),
            ts_observed: NOW,
        }
    }

    #[test]
    fn test_missing_after_grace_period() {
        let clock = FakeClock::new(NOW);
        let mut expected = ExpectedStateStore::new();
        expected.record_open(expected_order("grinder_static_BTCUSDT_B1_1_0", NOW - 10_000));
        let observed = ObservedStateStore::new();

        let mismatches = engine(&clock).reconcile(&expected, &observed);
        assert_eq!(mismatches.len(), 1);
        assert_eq!(
            mismatches[0].mismatch_type,
            MismatchType::OrderMissingOnExchange
        );
    }

    #[test]
    fn test_no_mismatch_within_grace() {
        let clock = FakeClock::new(NOW);
        let mut expected = ExpectedStateStore::new();
        expected.record_open(expected_order("grinder_static_BTCUSDT_B1_1_0", NOW - 3_000));
        let observed = ObservedStateStore::new();

        assert!(engine(&clock).reconcile(&expected, &observed).is_empty());
    }

    #[test]
    fn test_no_mismatch_when_observed() {
        let clock = FakeClock::new(NOW);
        let id = "grinder_static_BTCUSDT_B1_1_0";
        let mut expected = ExpectedStateStore::new();
        expected.record_open(expected_order(id, NOW - 60_000));
        let mut observed = ObservedStateStore::new();
        observed.apply_snapshot(vec![observed_order(id)], vec![], NOW);

        assert!(engine(&clock).reconcile(&expected, &observed).is_empty());
    }

    #[test]
    fn test_unexpected_grinder_order_detected() {
        let clock = FakeClock::new(NOW);
        let expected = ExpectedStateStore::new();
        let mut observed = ObservedStateStore::new();
        observed.apply_snapshot(
            vec![observed_order("grinder_static_BTCUSDT_B2_5_0")],
            vec![],
            NOW,
        );

        let mismatches = engine(&clock).reconcile(&expected, &observed);
        assert_eq!(mismatches.len(), 1);
        assert_eq!(
            mismatches[0].mismatch_type,
            MismatchType::OrderExistsUnexpected
        );
    }

    #[test]
    fn test_foreign_orders_ignored() {
        let clock = FakeClock::new(NOW);
        let expected = ExpectedStateStore::new();
        let mut observed = ObservedStateStore::new();
        observed.apply_snapshot(vec![observed_order("manual_order_123")], vec![], NOW);

        assert!(engine(&clock).reconcile(&expected, &observed).is_empty());
    }

    #[test]
    fn test_unexpected_position_detected() {
        let clock = FakeClock::new(NOW);
        let expected = ExpectedStateStore::new();
        let mut observed = ObservedStateStore::new();
        observed.apply_snapshot(
            vec![],
            vec![ObservedPosition {
                symbol: "BTCUSDT".into(),
                position_amt: dec!(0.5),
                entry_price: dec!(50000),
                ts_observed: NOW,
            }],
            NOW,
        );

        let mismatches = engine(&clock).reconcile(&expected, &observed);
        assert_eq!(mismatches.len(), 1);
        assert_eq!(
            mismatches[0].mismatch_type,
            MismatchType::PositionNonzeroUnexpected
        );
    }

    #[test]
    fn test_expected_position_suppresses_mismatch() {
        let clock = FakeClock::new(NOW);
        let mut expected = ExpectedStateStore::new();
        expected.apply_fill("BTCUSDT", Side::Buy, dec!(0.5));
        let mut observed = ObservedStateStore::new();
        observed.apply_snapshot(
            vec![],
            vec![ObservedPosition {
                symbol: "BTCUSDT".into(),
                position_amt: dec!(0.5),
                entry_price: dec!(50000),
                ts_observed: NOW,
            }],
            NOW,
        );

        assert!(engine(&clock).reconcile(&expected, &observed).is_empty());
    }

    #[test]
    fn test_disabled_returns_empty() {
        let clock = FakeClock::new(NOW);
        let mut e = engine(&clock);
        e.config.enabled = false;
        let mut expected = ExpectedStateStore::new();
        expected.record_open(expected_order("grinder_static_BTCUSDT_B1_1_0", 0));

        assert!(e.reconcile(&expected, &ObservedStateStore::new()).is_empty());
    }

    #[test]
    fn test_multiple_mismatches_independent() {
        let clock = FakeClock::new(NOW);
        let mut expected = ExpectedStateStore::new();
        expected.record_open(expected_order("grinder_static_BTCUSDT_B1_1_0", NOW - 60_000));
        let mut observed = ObservedStateStore::new();
        observed.apply_snapshot(
            vec![observed_order("grinder_static_BTCUSDT_B9_2_0")],
            vec![ObservedPosition {
                symbol: "ETHUSDT".into(),
                position_amt: dec!(-1),
                entry_price: dec!(2000),
                ts_observed: NOW,
            }],
            NOW,
        );

        let mismatches = engine(&clock).reconcile(&expected, &observed);
        let types: Vec<MismatchType> = mismatches.iter().map(|m| m.mismatch_type).collect();
        assert!(types.contains(&MismatchType::OrderMissingOnExchange));
        assert!(types.contains(&MismatchType::OrderExistsUnexpected));
        assert!(types.contains(&MismatchType::PositionNonzeroUnexpected));
    }

    #[test]
    fn test_metrics_recorded() {
        let clock = FakeClock::new(NOW);
        let metrics = MetricsRegistry::new().unwrap();
        let e = engine(&clock).with_metrics(metrics.clone());

        let mut observed = ObservedStateStore::new();
        observed.apply_snapshot(
            vec![],
            vec![ObservedPosition {
                symbol: "BTCUSDT".into(),
                position_amt: dec!(1),
                entry_price: dec!(50000),
                ts_observed: NOW,
            }],
            NOW,
        );
        e.reconcile(&ExpectedStateStore::new(), &observed);

        assert_eq!(metrics.reconcile_runs.get(), 1);
        assert_eq!(
            metrics
                .mismatches
                .with_label_values(&["POSITION_NONZERO_UNEXPECTED"])
                .get(),
            1
        );
    }
}
