//! Expected state: what the engine believes it did

use crate::core::time::TsMs;
use crate::execution::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedOrder {
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub ts_created: TsMs,
}

#[derive(Debug, Clone, Default)]
pub struct ExpectedStateStore {
    orders: BTreeMap<String, ExpectedOrder>,
    positions: BTreeMap<String, Decimal>,
}

impl ExpectedStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an order the engine asked the exchange to open.
    pub fn record_open(&mut self, order: ExpectedOrder) {
        self.orders.insert(order.client_order_id.clone(), order);
    }

    /// Remove an order the engine cancelled or saw filled.
    pub fn record_close(&mut self, client_order_id: &str) -> Option<ExpectedOrder> {
        self.orders.remove(client_order_id)
    }

    /// Fold a fill into the per-symbol expected position aggregate.
    pub fn apply_fill(&mut self, symbol: &str, side: Side, quantity: Decimal) {
        let delta = match side {
            Side::Buy => quantity,
            Side::Sell => -quantity,
        };
        let entry = self
            .positions
            .entry(symbol.to_string())
            .or_insert(Decimal::ZERO);
        *entry += delta;
        if entry.is_zero() {
            self.positions.remove(symbol);
        }
    }

    pub fn order(&self, client_order_id: &str) -> Option<&ExpectedOrder> {
        self.orders.get(client_order_id)
    }

    pub fn orders(&self) -> impl Iterator<Item = &ExpectedOrder> {
        self.orders.values()
    }

    pub fn expected_position(&self, symbol: &str) -> Decimal {
        self.positions.get(symbol).copied().unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn expected(id: &str) -> ExpectedOrder {
        ExpectedOrder {
            client_order_id: id.into(),
            symbol: "BTCUSDT".into(),
            side: Side::Buy,
            price: dec!(50000),
            quantity: dec!(0.1),
            ts_created: 1_000,
        }
    }

    #[test]
    fn test_open_close_lifecycle() {
        let mut store = ExpectedStateStore::new();
        store.record_open(expected("a"));
        assert!(store.order("a").is_some());
        assert!(store.record_close("a").is_some());
        assert!(store.order("a").is_none());
        assert!(store.record_close("a").is_none());
    }

    #[test]
    fn test_position_aggregate() {
        let mut store = ExpectedStateStore::new();
        store.apply_fill("BTCUSDT", Side::Buy, dec!(0.3));
        store.apply_fill("BTCUSDT", Side::Sell, dec!(0.1));
        assert_eq!(store.expected_position("BTCUSDT"), dec!(0.2));

        store.apply_fill("BTCUSDT", Side::Sell, dec!(0.2));
        assert_eq!(store.expected_position("BTCUSDT"), dec!(0));
    }
}
