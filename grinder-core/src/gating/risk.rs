//! Risk gate: outstanding notional and daily loss limits

use super::{GateReason, GatingResult};
use crate::core::digest::dec_value;
use rust_decimal::Decimal;
use serde_json::Map;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct RiskGateConfig {
    pub max_notional_per_symbol: Decimal,
    pub max_notional_total: Decimal,
    /// Positive number: losses beyond this block new orders for the day.
    pub daily_loss_limit: Decimal,
}

impl Default for RiskGateConfig {
    fn default() -> Self {
        Self {
            max_notional_per_symbol: Decimal::from(5_000),
            max_notional_total: Decimal::from(20_000),
            daily_loss_limit: Decimal::from(500),
        }
    }
}

pub struct RiskGate {
    config: RiskGateConfig,
    notional_by_symbol: HashMap<String, Decimal>,
    total_notional: Decimal,
    daily_realized_loss: Decimal,
}

impl RiskGate {
    pub fn new(config: RiskGateConfig) -> Self {
        Self {
            config,
            notional_by_symbol: HashMap::new(),
            total_notional: Decimal::ZERO,
            daily_realized_loss: Decimal::ZERO,
        }
    }

    pub fn check_order(&self, symbol: &str, proposed_notional: Decimal) -> GatingResult {
        let symbol_notional = self
            .notional_by_symbol
            .get(symbol)
            .copied()
            .unwrap_or(Decimal::ZERO);

        let mut details = Map::new();
        details.insert("symbol_notional".into(), dec_value(&symbol_notional));
        details.insert("total_notional".into(), dec_value(&self.total_notional));
        details.insert("proposed_notional".into(), dec_value(&proposed_notional));
        details.insert(
            "daily_realized_loss".into(),
            dec_value(&self.daily_realized_loss),
        );

        if self.daily_realized_loss > self.config.daily_loss_limit {
            return GatingResult::block(GateReason::DailyLossLimit, details);
        }
        if symbol_notional + proposed_notional > self.config.max_notional_per_symbol {
            return GatingResult::block(GateReason::MaxNotionalPerSymbol, details);
        }
        if self.total_notional + proposed_notional > self.config.max_notional_total {
            return GatingResult::block(GateReason::MaxNotionalTotal, details);
        }
        GatingResult::allow(details)
    }

    /// Record notional for an accepted placement.
    pub fn record_order(&mut self, symbol: &str, notional: Decimal) {
        *self
            .notional_by_symbol
            .entry(symbol.to_string())
            .or_insert(Decimal::ZERO) += notional;
        self.total_notional += notional;
    }

    /// Release notional when an order leaves the book (fill or cancel).
    pub fn release_order(&mut self, symbol: &str, notional: Decimal) {
        if let Some(entry) = self.notional_by_symbol.get_mut(symbol) {
            *entry = (*entry - notional).max(Decimal::ZERO);
        }
        self.total_notional = (self.total_notional - notional).max(Decimal::ZERO);
    }

    /// Fold a realized PnL delta into the daily loss tracker. Profits
    /// reduce the tracked loss, floored at zero.
    pub fn record_realized_pnl(&mut self, pnl: Decimal) {
        self.daily_realized_loss = (self.daily_realized_loss - pnl).max(Decimal::ZERO);
    }

    pub fn reset(&mut self) {
        self.notional_by_symbol.clear();
        self.total_notional = Decimal::ZERO;
        self.daily_realized_loss = Decimal::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_allows_within_limits() {
        let gate = RiskGate::new(RiskGateConfig::default());
        assert!(gate.check_order("BTCUSDT", dec!(1000)).allowed);
    }

    #[test]
    fn test_per_symbol_cap() {
        let mut gate = RiskGate::new(RiskGateConfig::default());
        gate.record_order("BTCUSDT", dec!(4500));
        let result = gate.check_order("BTCUSDT", dec!(1000));
        assert!(!result.allowed);
        assert_eq!(result.reason, Some(GateReason::MaxNotionalPerSymbol));

        // Other symbols still have room.
        assert!(gate.check_order("ETHUSDT", dec!(1000)).allowed);
    }

    #[test]
    fn test_total_cap() {
        let mut gate = RiskGate::new(RiskGateConfig::default());
        for symbol in ["AUSDT", "BUSDT", "CUSDT", "DUSDT"] {
            gate.record_order(symbol, dec!(4900));
        }
        let result = gate.check_order("EUSDT", dec!(1000));
        assert!(!result.allowed);
        assert_eq!(result.reason, Some(GateReason::MaxNotionalTotal));
    }

    #[test]
    fn test_daily_loss_limit() {
        let mut gate = RiskGate::new(RiskGateConfig::default());
        gate.record_realized_pnl(dec!(-600));
        let result = gate.check_order("BTCUSDT", dec!(10));
        assert!(!result.allowed);
        assert_eq!(result.reason, Some(GateReason::DailyLossLimit));
    }

    #[test]
    fn test_profit_offsets_loss() {
        let mut gate = RiskGate::new(RiskGateConfig::default());
        gate.record_realized_pnl(dec!(-600));
        gate.record_realized_pnl(dec!(200));
        assert!(gate.check_order("BTCUSDT", dec!(10)).allowed);
    }

    #[test]
    fn test_release_frees_room() {
        let mut gate = RiskGate::new(RiskGateConfig::default());
        gate.record_order("BTCUSDT", dec!(5000));
        assert!(!gate.check_order("BTCUSDT", dec!(1)).allowed);
        gate.release_order("BTCUSDT", dec!(3000));
        assert!(gate.check_order("BTCUSDT", dec!(1)).allowed);
    }
}
