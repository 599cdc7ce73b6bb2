//! Exchange filters: tick/step grids and minimums
//!
//! Prices round down to the tick grid and quantities down to the step grid
//! so post-rounding notional never exceeds the policy's intent.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeFilters {
    pub tick_size: Decimal,
    pub step_size: Decimal,
    pub min_qty: Decimal,
    pub min_notional: Decimal,
}

impl ExchangeFilters {
    /// Filters from decimal-place precisions, the common venue encoding:
    /// precision 2 -> tick 0.01.
    pub fn from_precisions(price_precision: u32, quantity_precision: u32) -> Self {
        Self {
            tick_size: pow10_neg(price_precision),
            step_size: pow10_neg(quantity_precision),
            min_qty: Decimal::ZERO,
            min_notional: Decimal::ZERO,
        }
    }

    pub fn with_minimums(mut self, min_qty: Decimal, min_notional: Decimal) -> Self {
        self.min_qty = min_qty;
        self.min_notional = min_notional;
        self
    }

    pub fn round_price_down(&self, price: Decimal) -> Decimal {
        round_down_to(price, self.tick_size)
    }

    pub fn round_qty_down(&self, qty: Decimal) -> Decimal {
        round_down_to(qty, self.step_size)
    }

    pub fn is_on_tick(&self, price: Decimal) -> bool {
        self.tick_size <= Decimal::ZERO || (price % self.tick_size).is_zero()
    }

    pub fn is_on_step(&self, qty: Decimal) -> bool {
        self.step_size <= Decimal::ZERO || (qty % self.step_size).is_zero()
    }
}

impl Default for ExchangeFilters {
    fn default() -> Self {
        Self::from_precisions(2, 3)
    }
}

fn pow10_neg(places: u32) -> Decimal {
    Decimal::new(1, places)
}

fn round_down_to(value: Decimal, grid: Decimal) -> Decimal {
    if grid <= Decimal::ZERO {
        return value;
    }
    (value / grid).floor() * grid
}
