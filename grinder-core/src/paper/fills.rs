//! Tick-delay fill simulator
//!
//! An open order placed at tick `P` becomes fill-eligible at tick `T` when
//! `T - P >= fill_after_ticks`. An eligible BUY fills when the mid is at or
//! below its limit; an eligible SELL when the mid is at or above.
//! `fill_after_ticks = 0` recovers instantaneous crossing. Fills are
//! emitted in lexicographic order by order id so the sequence is
//! deterministic.

use crate::core::time::TsMs;
use crate::execution::{ExecutionState, Fill, OrderRecord, Side};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy)]
pub struct FillModelConfig {
    pub fill_after_ticks: u64,
}

impl Default for FillModelConfig {
    fn default() -> Self {
        Self { fill_after_ticks: 0 }
    }
}

/// Outcome of a pending-fill check.
#[derive(Debug, Clone, Default)]
pub struct FillCheckResult {
    pub fills: Vec<Fill>,
    pub filled_order_ids: Vec<String>,
}

/// Pure check over a set of open orders. Does not mutate anything; the
/// caller removes `filled_order_ids` from its book.
pub fn check_pending_fills(
    ts: TsMs,
    open_orders: &[OrderRecord],
    mid_price: Decimal,
    current_tick: u64,
    fill_after_ticks: u64,
) -> FillCheckResult {
    let mut eligible: Vec<&OrderRecord> = open_orders
        .iter()
        .filter(|o| current_tick.saturating_sub(o.placed_tick) >= fill_after_ticks)
        .filter(|o| match o.side {
            Side::Buy => mid_price <= o.price,
            Side::Sell => mid_price >= o.price,
        })
        .collect();
    eligible.sort_by(|a, b| a.order_id.cmp(&b.order_id));

    let mut result = FillCheckResult::default();
    for order in eligible {
        result.fills.push(Fill {
            ts,
            symbol: order.symbol.clone(),
            side: order.side,
            price: order.price,
            quantity: order.quantity,
            order_id: order.order_id.clone(),
        });
        result.filled_order_ids.push(order.order_id.clone());
    }
    result
}

/// Run the fill check against an execution state and remove filled orders
/// from the book.
pub fn simulate_fills(
    ts: TsMs,
    state: &mut ExecutionState,
    mid_price: Decimal,
    config: &FillModelConfig,
) -> Vec<Fill> {
    let open: Vec<OrderRecord> = state.open_orders.values().cloned().collect();
    let result = check_pending_fills(
        ts,
        &open,
        mid_price,
        state.tick_counter,
        config.fill_after_ticks,
    );
    for order_id in &result.filled_order_ids {
        state.open_orders.remove(order_id);
    }
    result.fills
}
