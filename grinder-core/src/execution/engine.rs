//! Execution engine: reconcile a desired grid against open orders
//!
//! `evaluate` is pure with respect to its inputs: it returns a new state
//! plus the actions needed to move the book from the current open-order
//! set to the plan's target set. Re-evaluating an identical plan over
//! identical state is a no-op, detected via a digest of both.

use crate::core::digest::short_digest;
use crate::core::ids::OrderIdGenerator;
use crate::core::time::TsMs;
use crate::execution::filters::ExchangeFilters;
use crate::execution::types::{
    level_token, ExecutionAction, ExecutionEvent, ExecutionState, OrderRecord, OrderState, Side,
};
use crate::policy::{GridMode, GridPlan};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

pub const REASON_GRID_LEVEL: &str = "GRID_LEVEL";
pub const REASON_LEVEL_ZEROED: &str = "LEVEL_ZEROED";
pub const REASON_PLAN_PAUSE: &str = "PLAN_PAUSE";
pub const REASON_PLAN_UNCHANGED: &str = "PLAN_UNCHANGED";
pub const SKIP_MIN_QTY: &str = "MIN_QTY";
pub const SKIP_MIN_NOTIONAL: &str = "MIN_NOTIONAL";

#[derive(Debug, Clone)]
pub struct ExecutionEngineConfig {
    pub filters: ExchangeFilters,
    /// Absolute price difference tolerated before a REPLACE is emitted.
    pub price_tolerance: Decimal,
    pub quantity_tolerance: Decimal,
}

impl Default for ExecutionEngineConfig {
    fn default() -> Self {
        Self {
            filters: ExchangeFilters::default(),
            price_tolerance: Decimal::ZERO,
            quantity_tolerance: Decimal::ZERO,
        }
    }
}

/// Result of one evaluation.
#[derive(Debug, Clone)]
pub struct EvalResult {
    pub state: ExecutionState,
    pub actions: Vec<ExecutionAction>,
    pub events: Vec<ExecutionEvent>,
}

pub struct ExecutionEngine {
    config: ExecutionEngineConfig,
    id_gen: OrderIdGenerator,
}

impl ExecutionEngine {
    pub fn new(config: ExecutionEngineConfig, id_gen: OrderIdGenerator) -> Self {
        Self { config, id_gen }
    }

    /// Reconcile `plan` against `state` at time `ts`.
    ///
    /// Actions are emitted in lexicographic `(side, level_id)` order,
    /// buys before sells. The caller advances `state.tick_counter` once
    /// per snapshot before evaluating; new orders record it as their
    /// `placed_tick`.
    pub fn evaluate(
        &self,
        plan: &GridPlan,
        symbol: &str,
        state: &ExecutionState,
        ts: TsMs,
    ) -> EvalResult {
        let mut state = state.clone();
        let tick = state.tick_counter;

        let mut events = Vec::new();
        let targets = self.target_levels(plan, symbol, &mut events);

        let digest = plan_state_digest(plan, &state);
        if state.last_plan_digest.as_deref() == Some(digest.as_str()) {
            debug!(symbol, digest = %digest, "plan unchanged, no-op");
            events.push(ExecutionEvent::PlanUnchanged {
                symbol: symbol.to_string(),
                digest: digest.clone(),
            });
            return EvalResult {
                state,
                actions: vec![ExecutionAction::Noop {
                    reason: REASON_PLAN_UNCHANGED.to_string(),
                }],
                events,
            };
        }

        // Existing open orders keyed by grid level.
        let mut existing: BTreeMap<(Side, u32), OrderRecord> = BTreeMap::new();
        for order in state.open_orders.values() {
            existing.insert((order.side, order.level_id), order.clone());
        }

        // Union of levels, traversed in (side, level_id) order.
        let mut keys: Vec<(Side, u32)> = targets.keys().copied().collect();
        for key in existing.keys() {
            if !targets.contains_key(key) {
                keys.push(*key);
            }
        }
        keys.sort();

        let cancel_reason = if plan.mode == GridMode::Pause {
            REASON_PLAN_PAUSE
        } else {
            REASON_LEVEL_ZEROED
        };

        let mut actions = Vec::new();
        for key in keys {
            let (side, level_id) = key;
            match (targets.get(&key), existing.get(&key)) {
                (Some(&(price, quantity)), None) => {
                    let order_id =
                        self.id_gen
                            .make_id(symbol, &level_token(side, level_id), ts, state.seq);
                    state.seq += 1;
                    state.open_orders.insert(
                        order_id.clone(),
                        OrderRecord {
                            order_id: order_id.clone(),
                            symbol: symbol.to_string(),
                            side,
                            price,
                            quantity,
                            state: OrderState::Open,
                            level_id,
                            created_ts: ts,
                            placed_tick: tick,
                        },
                    );
                    actions.push(ExecutionAction::Place {
                        symbol: symbol.to_string(),
                        side,
                        price,
                        quantity,
                        level_id,
                        order_id,
                        reason: REASON_GRID_LEVEL.to_string(),
                    });
                }
                (Some(&(price, quantity)), Some(order)) => {
                    let price_moved = (order.price - price).abs() > self.config.price_tolerance;
                    let qty_moved =
                        (order.quantity - quantity).abs() > self.config.quantity_tolerance;
                    if price_moved || qty_moved {
                        let order_id = order.order_id.clone();
                        if let Some(record) = state.open_orders.get_mut(&order_id) {
                            record.price = price;
                            record.quantity = quantity;
                            record.placed_tick = tick;
                        }
                        actions.push(ExecutionAction::Replace {
                            symbol: symbol.to_string(),
                            order_id,
                            side,
                            new_price: price,
                            new_quantity: quantity,
                            level_id,
                            reason: REASON_GRID_LEVEL.to_string(),
                        });
                    }
                }
                (None, Some(order)) => {
                    let order_id = order.order_id.clone();
                    state.open_orders.remove(&order_id);
                    actions.push(ExecutionAction::Cancel {
                        symbol: symbol.to_string(),
                        order_id,
                        reason: cancel_reason.to_string(),
                    });
                }
                (None, None) => unreachable!("key came from one of the two maps"),
            }
        }

        // Store the digest of the plan against the post-action book, so
        // an identical plan over the settled state no-ops next time.
        state.last_plan_digest = Some(plan_state_digest(plan, &state));

        EvalResult {
            state,
            actions,
            events,
        }
    }

    /// Desired (price, quantity) per level after rounding and minimums.
    fn target_levels(
        &self,
        plan: &GridPlan,
        symbol: &str,
        events: &mut Vec<ExecutionEvent>,
    ) -> BTreeMap<(Side, u32), (Decimal, Decimal)> {
        let mut targets = BTreeMap::new();
        if plan.mode == GridMode::Pause {
            return targets;
        }

        let bps = Decimal::from(10_000);
        let center = plan.center_price
            * (Decimal::ONE + Decimal::from(plan.skew_bps) / bps);
        let spacing = Decimal::from(plan.spacing_bps);

        let mut sides: Vec<(Side, u32)> = Vec::new();
        if plan.mode != GridMode::SellOnly {
            sides.push((Side::Buy, plan.levels_down));
        }
        if plan.mode != GridMode::BuyOnly {
            sides.push((Side::Sell, plan.levels_up));
        }

        for (side, levels) in sides {
            for level in 1..=levels {
                let size = plan
                    .size_schedule
                    .get(level as usize - 1)
                    .copied()
                    .unwrap_or(Decimal::ZERO);
                // A zero entry means "do not place this level".
                if size.is_zero() {
                    continue;
                }

                let offset = spacing * Decimal::from(level) / bps;
                let raw_price = match side {
                    Side::Buy => center * (Decimal::ONE - offset),
                    Side::Sell => center * (Decimal::ONE + offset),
                };
                let price = self.config.filters.round_price_down(raw_price);
                let quantity = self.config.filters.round_qty_down(size);

                if quantity < self.config.filters.min_qty || quantity.is_zero() {
                    events.push(ExecutionEvent::OrderSkipped {
                        symbol: symbol.to_string(),
                        side,
                        level_id: level,
                        reason: SKIP_MIN_QTY.to_string(),
                    });
                    continue;
                }
                if price * quantity < self.config.filters.min_notional {
                    events.push(ExecutionEvent::OrderSkipped {
                        symbol: symbol.to_string(),
                        side,
                        level_id: level,
                        reason: SKIP_MIN_NOTIONAL.to_string(),
                    });
                    continue;
                }

                targets.insert((side, level), (price, quantity));
            }
        }

        targets
    }
}

/// Digest over the plan and the open-order set, the no-op detector.
fn plan_state_digest(plan: &GridPlan, state: &ExecutionState) -> String {
    let orders: Vec<_> = state
        .open_orders
        .values()
        .map(|o| {
            json!({
                "order_id": o.order_id,
                "side": o.side.as_str(),
                "price": o.price.to_string(),
                "quantity": o.quantity.to_string(),
                "level_id": o.level_id,
            })
        })
        .collect();
    short_digest(&json!({
        "plan": plan.to_value(),
        "open_orders": orders,
    }))
}
