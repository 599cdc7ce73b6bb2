//! Cycle engine: fill -> take-profit and replenishment intents
//!
//! Each fill spawns a TP intent on the opposite side one step away, and,
//! when adds are allowed, a replenishment intent on the same side one
//! offset away. Intent ids derive deterministically from the source fill.

use crate::core::digest::dec_value;
use crate::execution::{Fill, Side};
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentType {
    TakeProfit,
    Replenish,
}

impl IntentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentType::TakeProfit => "TP",
            IntentType::Replenish => "REPLENISH",
        }
    }
}

/// Follow-up order intent produced by the cycle engine.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleIntent {
    pub intent_id: String,
    pub intent_type: IntentType,
    pub symbol: String,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub source_fill_id: String,
}

impl CycleIntent {
    pub fn to_value(&self) -> Value {
        json!({
            "intent_id": self.intent_id,
            "intent_type": self.intent_type.as_str(),
            "symbol": self.symbol,
            "side": self.side.as_str(),
            "price": dec_value(&self.price),
            "quantity": dec_value(&self.quantity),
            "source_fill_id": self.source_fill_id,
        })
    }
}

/// Aggregate result for one batch of fills.
#[derive(Debug, Clone, Default)]
pub struct CycleResult {
    pub fills_processed: usize,
    pub tps_generated: usize,
    pub replenishments_generated: usize,
    pub intents: Vec<CycleIntent>,
}

#[derive(Debug, Clone)]
pub struct CycleEngine {
    /// TP distance as a fraction (0.001 = 10 bps).
    step_pct: Decimal,
    /// Replenishment distance; defaults to `step_pct`.
    replenish_offset_pct: Decimal,
    price_precision: u32,
    quantity_precision: u32,
}

impl CycleEngine {
    pub fn new(step_pct: Decimal) -> Self {
        Self {
            step_pct,
            replenish_offset_pct: step_pct,
            price_precision: 2,
            quantity_precision: 3,
        }
    }

    pub fn with_replenish_offset(mut self, offset_pct: Decimal) -> Self {
        self.replenish_offset_pct = offset_pct;
        self
    }

    pub fn with_precisions(mut self, price_precision: u32, quantity_precision: u32) -> Self {
        self.price_precision = price_precision;
        self.quantity_precision = quantity_precision;
        self
    }

    /// Process fills in order, emitting TP (and optionally replenish)
    /// intents per fill.
    pub fn process_fills(&self, fills: &[Fill], adds_allowed: bool) -> CycleResult {
        let mut result = CycleResult::default();
        for fill in fills {
            result.fills_processed += 1;

            let tp_side = fill.side.opposite();
            let tp_price = match fill.side {
                Side::Buy => fill.price * (Decimal::ONE + self.step_pct),
                Side::Sell => fill.price * (Decimal::ONE - self.step_pct),
            };
            result
                .intents
                .push(self.intent(IntentType::TakeProfit, fill, tp_side, tp_price));
            result.tps_generated += 1;

            if adds_allowed {
                let re_price = match fill.side {
                    Side::Buy => fill.price * (Decimal::ONE - self.replenish_offset_pct),
                    Side::Sell => fill.price * (Decimal::ONE + self.replenish_offset_pct),
                };
                result
                    .intents
                    .push(self.intent(IntentType::Replenish, fill, fill.side, re_price));
                result.replenishments_generated += 1;
            }
        }
        result
    }

    fn intent(&self, kind: IntentType, fill: &Fill, side: Side, raw_price: Decimal) -> CycleIntent {
        let mut price =
            raw_price.round_dp_with_strategy(self.price_precision, RoundingStrategy::MidpointNearestEven);
        price.rescale(self.price_precision);
        let mut quantity = fill
            .quantity
            .round_dp_with_strategy(self.quantity_precision, RoundingStrategy::ToZero);
        quantity.rescale(self.quantity_precision);

        let intent_id = format!(
            "cycle_{}_{}_{}_{}",
            kind.as_str(),
            fill.order_id,
            side.as_str(),
            price
        );
        CycleIntent {
            intent_id,
            intent_type: kind,
            symbol: fill.symbol.clone(),
            side,
            price,
            quantity,
            source_fill_id: fill.order_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fill(side: Side, price: Decimal) -> Fill {
        Fill {
            ts: 1_000,
            symbol: "BTCUSDT".into(),
            side,
            price,
            quantity: dec!(0.1),
            order_id: "fill_1".into(),
        }
    }

    #[test]
    fn test_buy_fill_generates_sell_tp() {
        let engine = CycleEngine::new(dec!(0.001));
        let result = engine.process_fills(&[fill(Side::Buy, dec!(50000))], false);

        assert_eq!(result.fills_processed, 1);
        assert_eq!(result.tps_generated, 1);
        assert_eq!(result.replenishments_generated, 0);
        assert_eq!(result.intents.len(), 1);

        let tp = &result.intents[0];
        assert_eq!(tp.intent_type, IntentType::TakeProfit);
        assert_eq!(tp.side, Side::Sell);
        assert_eq!(tp.price, dec!(50050.00));
        assert_eq!(tp.quantity, dec!(0.100));
        assert_eq!(tp.source_fill_id, "fill_1");
    }

    #[test]
    fn test_sell_fill_generates_buy_tp() {
        let engine = CycleEngine::new(dec!(0.001));
        let result = engine.process_fills(&[fill(Side::Sell, dec!(50000))], false);

        let tp = &result.intents[0];
        assert_eq!(tp.side, Side::Buy);
        assert_eq!(tp.price, dec!(49950.00));
    }

    #[test]
    fn test_replenishment_when_adds_allowed() {
        let engine = CycleEngine::new(dec!(0.001));
        let result = engine.process_fills(&[fill(Side::Buy, dec!(50000))], true);

        assert_eq!(result.replenishments_generated, 1);
        assert_eq!(result.intents.len(), 2);

        let replenish = &result.intents[1];
        assert_eq!(replenish.intent_type, IntentType::Replenish);
        assert_eq!(replenish.side, Side::Buy);
        assert_eq!(replenish.price, dec!(49950.00));
        assert_eq!(replenish.quantity, dec!(0.100));
    }

    #[test]
    fn test_sell_replenishment_above() {
        let engine = CycleEngine::new(dec!(0.001));
        let result = engine.process_fills(&[fill(Side::Sell, dec!(50000))], true);
        let replenish = &result.intents[1];
        assert_eq!(replenish.side, Side::Sell);
        assert_eq!(replenish.price, dec!(50050.00));
    }

    #[test]
    fn test_custom_replenish_offset() {
        let engine = CycleEngine::new(dec!(0.001)).with_replenish_offset(dec!(0.002));
        let result = engine.process_fills(&[fill(Side::Buy, dec!(50000))], true);
        assert_eq!(result.intents[0].price, dec!(50050.00));
        assert_eq!(result.intents[1].price, dec!(49900.00));
    }

    #[test]
    fn test_intent_id_format() {
        let engine = CycleEngine::new(dec!(0.001));
        let result = engine.process_fills(&[fill(Side::Buy, dec!(50000))], true);
        assert_eq!(result.intents[0].intent_id, "cycle_TP_fill_1_SELL_50050.00");
        assert_eq!(
            result.intents[1].intent_id,
            "cycle_REPLENISH_fill_1_BUY_49950.00"
        );
    }

    #[test]
    fn test_intent_ids_deterministic() {
        let engine = CycleEngine::new(dec!(0.001));
        let f = fill(Side::Buy, dec!(50000));
        let r1 = engine.process_fills(std::slice::from_ref(&f), true);
        let r2 = engine.process_fills(std::slice::from_ref(&f), true);
        assert_eq!(r1.intents[0].intent_id, r2.intents[0].intent_id);
        assert_eq!(r1.intents[1].intent_id, r2.intents[1].intent_id);
    }

    #[test]
    fn test_multiple_fills_order_preserved() {
        let engine = CycleEngine::new(dec!(0.001));
        let mut f2 = fill(Side::Sell, dec!(51000));
        f2.order_id = "fill_2".into();
        let result = engine.process_fills(&[fill(Side::Buy, dec!(50000)), f2], false);
        assert_eq!(result.intents[0].source_fill_id, "fill_1");
        assert_eq!(result.intents[1].source_fill_id, "fill_2");
    }
}
