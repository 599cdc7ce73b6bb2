//! Observed state: what the exchange says
//!
//! Updated from REST snapshots and user-data stream events. Orders are
//! keyed by client order id; positions by symbol. The refresh timestamp
//! drives staleness checks.

use crate::core::time::TsMs;
use crate::execution::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedOrder {
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub price: Decimal,
    pub orig_qty: Decimal,
    pub executed_qty: Decimal,
    pub status: String,
    pub ts_observed: TsMs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedPosition {
    pub symbol: String,
    /// Signed position amount; zero means flat.
    pub position_amt: Decimal,
    pub entry_price: Decimal,
    pub ts_observed: TsMs,
}

#[derive(Debug, Clone, Default)]
pub struct ObservedStateStore {
    orders: HashMap<String, ObservedOrder>,
    positions: HashMap<String, ObservedPosition>,
    last_refresh_ms: TsMs,
}

impl ObservedStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole view from a REST snapshot.
    pub fn apply_snapshot(
        &mut self,
        orders: Vec<ObservedOrder>,
        positions: Vec<ObservedPosition>,
        ts: TsMs,
    ) {
        self.orders = orders
            .into_iter()
            .map(|o| (o.client_order_id.clone(), o))
            .collect();
        self.positions = positions
            .into_iter()
            .filter(|p| !p.position_amt.is_zero())
            .map(|p| (p.symbol.clone(), p))
            .collect();
        self.last_refresh_ms = ts;
    }

    /// Incremental order update from the user-data stream. Terminal
    /// states remove the order from the open set.
    pub fn apply_order_update(&mut self, order: ObservedOrder) {
        let terminal = matches!(order.status.as_str(), "FILLED" | "CANCELED" | "EXPIRED");
        self.last_refresh_ms = self.last_refresh_ms.max(order.ts_observed);
        if terminal {
            self.orders.remove(&order.client_order_id);
        } else {
            self.orders.insert(order.client_order_id.clone(), order);
        }
    }

    /// Incremental position update from the user-data stream.
    pub fn apply_position_update(&mut self, position: ObservedPosition) {
        self.last_refresh_ms = self.last_refresh_ms.max(position.ts_observed);
        if position.position_amt.is_zero() {
            self.positions.remove(&position.symbol);
        } else {
            self.positions.insert(position.symbol.clone(), position);
        }
    }

    pub fn orders(&self) -> impl Iterator<Item = &ObservedOrder> {
        self.orders.values()
    }

    pub fn order(&self, client_order_id: &str) -> Option<&ObservedOrder> {
        self.orders.get(client_order_id)
    }

    pub fn positions(&self) -> impl Iterator<Item = &ObservedPosition> {
        self.positions.values()
    }

    pub fn position(&self, symbol: &str) -> Option<&ObservedPosition> {
        self.positions.get(symbol)
    }

    pub fn last_refresh_ms(&self) -> TsMs {
        self.last_refresh_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order(id: &str, status: &str) -> ObservedOrder {
        ObservedOrder {
            client_order_id: id.into(),
            symbol: "BTCUSDT".into(),
            side: Side::Buy,
            price: dec!(50000),
            orig_qty: dec!(0.1),
            executed_qty: dec!(0),
            status: status.into(),
            ts_observed: 1_000,
        }
    }

    #[test]
    fn test_snapshot_replaces_view() {
        let mut store = ObservedStateStore::new();
        store.apply_snapshot(vec![order("a", "NEW")], vec![], 1_000);
        store.apply_snapshot(vec![order("b", "NEW")], vec![], 2_000);

        assert!(store.order("a").is_none());
        assert!(store.order("b").is_some());
        assert_eq!(store.last_refresh_ms(), 2_000);
    }

    #[test]
    fn test_terminal_update_removes_order() {
        let mut store = ObservedStateStore::new();
        store.apply_snapshot(vec![order("a", "NEW")], vec![], 1_000);
        store.apply_order_update(order("a", "FILLED"));
        assert!(store.order("a").is_none());
    }

    #[test]
    fn test_zero_position_removed() {
        let mut store = ObservedStateStore::new();
        store.apply_position_update(ObservedPosition {
            symbol: "BTCUSDT".into(),
            position_amt: dec!(0.5),
            entry_price: dec!(50000),
            ts_observed: 1_000,
        });
        assert!(store.position("BTCUSDT").is_some());

        store.apply_position_update(ObservedPosition {
            symbol: "BTCUSDT".into(),
            position_amt: dec!(0),
            entry_price: dec!(0),
            ts_observed: 2_000,
        });
        assert!(store.position("BTCUSDT").is_none());
    }

    #[test]
    fn test_snapshot_filters_flat_positions() {
        let mut store = ObservedStateStore::new();
        store.apply_snapshot(
            vec![],
            vec![
                ObservedPosition {
                    symbol: "BTCUSDT".into(),
                    position_amt: dec!(0),
                    entry_price: dec!(0),
                    ts_observed: 1_000,
                },
                ObservedPosition {
                    symbol: "ETHUSDT".into(),
                    position_amt: dec!(-1),
                    entry_price: dec!(2000),
                    ts_observed: 1_000,
                },
            ],
            1_000,
        );
        assert!(store.position("BTCUSDT").is_none());
        assert!(store.position("ETHUSDT").is_some());
    }
}
