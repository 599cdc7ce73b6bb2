//! Position ledger and PnL
//!
//! Applies fills to signed per-symbol positions. Increasing a position
//! updates the weighted-average entry price; reducing or closing releases
//! realized PnL against that average. All math is exact decimal.

use crate::core::digest::dec_value;
use crate::core::time::TsMs;
use crate::execution::{Fill, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Signed position for one symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionState {
    /// Positive = long, negative = short.
    pub quantity: Decimal,
    pub avg_entry_price: Decimal,
    pub realized_pnl: Decimal,
}

/// Point-in-time PnL view for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct PnLSnapshot {
    pub ts: TsMs,
    pub symbol: String,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub position_qty: Decimal,
    pub avg_entry_price: Decimal,
}

impl PnLSnapshot {
    pub fn to_value(&self) -> Value {
        json!({
            "ts": self.ts,
            "symbol": self.symbol,
            "realized_pnl": dec_value(&self.realized_pnl),
            "unrealized_pnl": dec_value(&self.unrealized_pnl),
            "position_qty": dec_value(&self.position_qty),
            "avg_entry_price": dec_value(&self.avg_entry_price),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    positions: BTreeMap<String, PositionState>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_fills(&mut self, fills: &[Fill]) {
        for fill in fills {
            self.apply_fill(fill);
        }
    }

    /// Apply one fill. Returns the realized PnL released by this fill
    /// (zero when the fill only opens or adds).
    pub fn apply_fill(&mut self, fill: &Fill) -> Decimal {
        let position = self.positions.entry(fill.symbol.clone()).or_default();
        let delta = match fill.side {
            Side::Buy => fill.quantity,
            Side::Sell => -fill.quantity,
        };

        let old_qty = position.quantity;
        let mut released = Decimal::ZERO;

        let increasing = old_qty.is_zero() || (old_qty.is_sign_positive() == delta.is_sign_positive());
        if increasing {
            let old_notional = position.avg_entry_price * old_qty.abs();
            let new_notional = fill.price * delta.abs();
            let total_qty = old_qty.abs() + delta.abs();
            if total_qty > Decimal::ZERO {
                position.avg_entry_price = (old_notional + new_notional) / total_qty;
            }
            position.quantity = old_qty + delta;
        } else {
            // Reducing, closing, or flipping.
            let closing_qty = old_qty.abs().min(delta.abs());
            released = if old_qty.is_sign_positive() {
                (fill.price - position.avg_entry_price) * closing_qty
            } else {
                (position.avg_entry_price - fill.price) * closing_qty
            };
            position.realized_pnl += released;
            position.quantity = old_qty + delta;

            if position.quantity.is_zero() {
                position.avg_entry_price = Decimal::ZERO;
            } else if position.quantity.is_sign_positive() != old_qty.is_sign_positive() {
                // Flip: the remainder opens at the fill price.
                position.avg_entry_price = fill.price;
            }
        }
        released
    }

    pub fn position(&self, symbol: &str) -> PositionState {
        self.positions.get(symbol).cloned().unwrap_or_default()
    }

    pub fn all_positions(&self) -> &BTreeMap<String, PositionState> {
        &self.positions
    }

    pub fn unrealized_pnl(&self, symbol: &str, mark_price: Decimal) -> Decimal {
        let Some(position) = self.positions.get(symbol) else {
            return Decimal::ZERO;
        };
        if position.quantity.is_zero() || position.avg_entry_price.is_zero() {
            return Decimal::ZERO;
        }
        if position.quantity.is_sign_positive() {
            (mark_price - position.avg_entry_price) * position.quantity
        } else {
            (position.avg_entry_price - mark_price) * position.quantity.abs()
        }
    }

    pub fn total_realized_pnl(&self) -> Decimal {
        self.positions.values().map(|p| p.realized_pnl).sum()
    }

    pub fn pnl_snapshot(&self, ts: TsMs, symbol: &str, mark_price: Decimal) -> PnLSnapshot {
        let position = self.position(symbol);
        PnLSnapshot {
            ts,
            symbol: symbol.to_string(),
            realized_pnl: position.realized_pnl,
            unrealized_pnl: self.unrealized_pnl(symbol, mark_price),
            position_qty: position.quantity,
            avg_entry_price: position.avg_entry_price,
        }
    }

    pub fn reset(&mut self) {
        self.positions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fill(side: Side, price: Decimal, quantity: Decimal) -> Fill {
        Fill {
            ts: 0,
            symbol: "BTCUSDT".into(),
            side,
            price,
            quantity,
            order_id: "x".into(),
        }
    }

    #[test]
    fn test_open_long_sets_entry() {
        let mut ledger = Ledger::new();
        ledger.apply_fill(&fill(Side::Buy, dec!(50000), dec!(0.1)));
        let p = ledger.position("BTCUSDT");
        assert_eq!(p.quantity, dec!(0.1));
        assert_eq!(p.avg_entry_price, dec!(50000));
        assert_eq!(p.realized_pnl, dec!(0));
    }

    #[test]
    fn test_weighted_average_on_add() {
        let mut ledger = Ledger::new();
        ledger.apply_fill(&fill(Side::Buy, dec!(50000), dec!(0.1)));
        ledger.apply_fill(&fill(Side::Buy, dec!(51000), dec!(0.1)));
        let p = ledger.position("BTCUSDT");
        assert_eq!(p.quantity, dec!(0.2));
        assert_eq!(p.avg_entry_price, dec!(50500));
    }

    #[test]
    fn test_close_long_releases_pnl() {
        let mut ledger = Ledger::new();
        ledger.apply_fill(&fill(Side::Buy, dec!(50000), dec!(0.1)));
        let released = ledger.apply_fill(&fill(Side::Sell, dec!(51000), dec!(0.1)));
        assert_eq!(released, dec!(100.0));

        let p = ledger.position("BTCUSDT");
        assert_eq!(p.quantity, dec!(0));
        assert_eq!(p.avg_entry_price, dec!(0));
        assert_eq!(p.realized_pnl, dec!(100.0));
    }

    #[test]
    fn test_partial_close() {
        let mut ledger = Ledger::new();
        ledger.apply_fill(&fill(Side::Buy, dec!(50000), dec!(0.2)));
        let released = ledger.apply_fill(&fill(Side::Sell, dec!(51000), dec!(0.1)));
        assert_eq!(released, dec!(100.0));

        let p = ledger.position("BTCUSDT");
        assert_eq!(p.quantity, dec!(0.1));
        assert_eq!(p.avg_entry_price, dec!(50000));
    }

    #[test]
    fn test_short_roundtrip() {
        let mut ledger = Ledger::new();
        ledger.apply_fill(&fill(Side::Sell, dec!(40000), dec!(0.2)));
        let released = ledger.apply_fill(&fill(Side::Buy, dec!(39900), dec!(0.2)));
        assert_eq!(released, dec!(20.0));
        assert_eq!(ledger.position("BTCUSDT").quantity, dec!(0));
    }

    #[test]
    fn test_flip_resets_entry_to_fill_price() {
        let mut ledger = Ledger::new();
        ledger.apply_fill(&fill(Side::Buy, dec!(50000), dec!(0.1)));
        ledger.apply_fill(&fill(Side::Sell, dec!(52000), dec!(0.3)));

        let p = ledger.position("BTCUSDT");
        assert_eq!(p.quantity, dec!(-0.2));
        assert_eq!(p.avg_entry_price, dec!(52000));
        // Realized on the closed 0.1.
        assert_eq!(p.realized_pnl, dec!(200.0));
    }

    #[test]
    fn test_unrealized_long_and_short() {
        let mut ledger = Ledger::new();
        ledger.apply_fill(&fill(Side::Buy, dec!(30000), dec!(0.5)));
        assert_eq!(ledger.unrealized_pnl("BTCUSDT", dec!(31000)), dec!(500.0));
        assert_eq!(ledger.unrealized_pnl("BTCUSDT", dec!(29000)), dec!(-500.0));

        let mut short_ledger = Ledger::new();
        short_ledger.apply_fill(&fill(Side::Sell, dec!(30000), dec!(0.5)));
        assert_eq!(
            short_ledger.unrealized_pnl("BTCUSDT", dec!(29000)),
            dec!(500.0)
        );
    }

    #[test]
    fn test_pnl_snapshot_shape() {
        let mut ledger = Ledger::new();
        ledger.apply_fill(&fill(Side::Buy, dec!(50000), dec!(0.1)));
        let snap = ledger.pnl_snapshot(9, "BTCUSDT", dec!(50100));
        assert_eq!(snap.position_qty, dec!(0.1));
        assert_eq!(snap.unrealized_pnl, dec!(10.0));
        let v = snap.to_value();
        assert_eq!(v["symbol"], json!("BTCUSDT"));
    }

    #[test]
    fn test_unknown_symbol_is_flat() {
        let ledger = Ledger::new();
        assert_eq!(ledger.position("NOPEUSDT").quantity, dec!(0));
        assert_eq!(ledger.unrealized_pnl("NOPEUSDT", dec!(1)), dec!(0));
    }
}
