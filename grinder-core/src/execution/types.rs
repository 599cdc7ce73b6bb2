//! Execution data model: orders, actions, events, per-symbol state

use crate::core::digest::dec_value;
use crate::core::time::TsMs;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Single-letter tag used in level tokens ("B3", "S1").
    pub fn tag(&self) -> char {
        match self {
            Side::Buy => 'B',
            Side::Sell => 'S',
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an order we believe is on the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
}

impl OrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Open => "OPEN",
            OrderState::PartiallyFilled => "PARTIALLY_FILLED",
            OrderState::Filled => "FILLED",
            OrderState::Cancelled => "CANCELLED",
        }
    }
}

/// One order in the engine's model of the book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub state: OrderState,
    /// Grid level index, 1-based from the center outward on each side.
    pub level_id: u32,
    pub created_ts: TsMs,
    /// Snapshot counter value when the order was placed; drives the
    /// tick-delay fill model.
    pub placed_tick: u64,
}

impl OrderRecord {
    /// Level token combining side and level, e.g. "B2".
    pub fn level_token(&self) -> String {
        level_token(self.side, self.level_id)
    }

    pub fn to_value(&self) -> Value {
        json!({
            "order_id": self.order_id,
            "symbol": self.symbol,
            "side": self.side.as_str(),
            "price": dec_value(&self.price),
            "quantity": dec_value(&self.quantity),
            "state": self.state.as_str(),
            "level_id": self.level_id,
            "created_ts": self.created_ts,
            "placed_tick": self.placed_tick,
        })
    }
}

pub fn level_token(side: Side, level_id: u32) -> String {
    format!("{}{}", side.tag(), level_id)
}

/// What the engine wants the exchange to do.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionAction {
    Place {
        symbol: String,
        side: Side,
        price: Decimal,
        quantity: Decimal,
        level_id: u32,
        order_id: String,
        reason: String,
    },
    Cancel {
        symbol: String,
        order_id: String,
        reason: String,
    },
    Replace {
        symbol: String,
        order_id: String,
        side: Side,
        new_price: Decimal,
        new_quantity: Decimal,
        level_id: u32,
        reason: String,
    },
    Noop {
        reason: String,
    },
}

impl ExecutionAction {
    pub fn action_type(&self) -> &'static str {
        match self {
            ExecutionAction::Place { .. } => "PLACE",
            ExecutionAction::Cancel { .. } => "CANCEL",
            ExecutionAction::Replace { .. } => "REPLACE",
            ExecutionAction::Noop { .. } => "NOOP",
        }
    }

    pub fn symbol(&self) -> Option<&str> {
        match self {
            ExecutionAction::Place { symbol, .. }
            | ExecutionAction::Cancel { symbol, .. }
            | ExecutionAction::Replace { symbol, .. } => Some(symbol),
            ExecutionAction::Noop { .. } => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            ExecutionAction::Place {
                symbol,
                side,
                price,
                quantity,
                level_id,
                order_id,
                reason,
            } => json!({
                "action_type": "PLACE",
                "symbol": symbol,
                "side": side.as_str(),
                "price": dec_value(price),
                "quantity": dec_value(quantity),
                "level_id": level_id,
                "order_id": order_id,
                "reason": reason,
            }),
            ExecutionAction::Cancel {
                symbol,
                order_id,
                reason,
            } => json!({
                "action_type": "CANCEL",
                "symbol": symbol,
                "order_id": order_id,
                "reason": reason,
            }),
            ExecutionAction::Replace {
                symbol,
                order_id,
                side,
                new_price,
                new_quantity,
                level_id,
                reason,
            } => json!({
                "action_type": "REPLACE",
                "symbol": symbol,
                "order_id": order_id,
                "side": side.as_str(),
                "new_price": dec_value(new_price),
                "new_quantity": dec_value(new_quantity),
                "level_id": level_id,
                "reason": reason,
            }),
            ExecutionAction::Noop { reason } => json!({
                "action_type": "NOOP",
                "reason": reason,
            }),
        }
    }
}

/// Non-action observations emitted during evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    OrderSkipped {
        symbol: String,
        side: Side,
        level_id: u32,
        reason: String,
    },
    PlanUnchanged {
        symbol: String,
        digest: String,
    },
}

impl ExecutionEvent {
    pub fn to_value(&self) -> Value {
        match self {
            ExecutionEvent::OrderSkipped {
                symbol,
                side,
                level_id,
                reason,
            } => json!({
                "event_type": "ORDER_SKIPPED",
                "symbol": symbol,
                "side": side.as_str(),
                "level_id": level_id,
                "reason": reason,
            }),
            ExecutionEvent::PlanUnchanged { symbol, digest } => json!({
                "event_type": "PLAN_UNCHANGED",
                "symbol": symbol,
                "digest": digest,
            }),
        }
    }
}

/// Per-symbol execution state threaded through evaluations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    /// Open orders keyed by client order id; BTreeMap keeps traversal
    /// deterministic.
    pub open_orders: BTreeMap<String, OrderRecord>,
    pub last_plan_digest: Option<String>,
    /// Monotonic snapshot counter; also the source of `placed_tick`.
    pub tick_counter: u64,
    /// Sequence number for client order id generation.
    pub seq: u64,
}

impl ExecutionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open order at a grid level, if any.
    pub fn order_at_level(&self, side: Side, level_id: u32) -> Option<&OrderRecord> {
        self.open_orders
            .values()
            .find(|o| o.side == side && o.level_id == level_id)
    }
}

/// A simulated or reported trade execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub ts: TsMs,
    pub symbol: String,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub order_id: String,
}

impl Fill {
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }

    pub fn to_value(&self) -> Value {
        json!({
            "ts": self.ts,
            "symbol": self.symbol,
            "side": self.side.as_str(),
            "price": dec_value(&self.price),
            "quantity": dec_value(&self.quantity),
            "order_id": self.order_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_ordering_buys_before_sells() {
        assert!(Side::Buy < Side::Sell);
        assert_eq!(level_token(Side::Buy, 3), "B3");
        assert_eq!(level_token(Side::Sell, 1), "S1");
    }

    #[test]
    fn test_action_to_value_place() {
        let action = ExecutionAction::Place {
            symbol: "BTCUSDT".into(),
            side: Side::Buy,
            price: dec!(49000),
            quantity: dec!(0.1),
            level_id: 1,
            order_id: "grinder_static_BTCUSDT_B1_1000_0".into(),
            reason: "GRID_LEVEL".into(),
        };
        let v = action.to_value();
        assert_eq!(v["action_type"], json!("PLACE"));
        assert_eq!(v["price"], json!("49000"));
    }

    #[test]
    fn test_state_lookup_by_level() {
        let mut state = ExecutionState::new();
        state.open_orders.insert(
            "id1".into(),
            OrderRecord {
                order_id: "id1".into(),
                symbol: "BTCUSDT".into(),
                side: Side::Sell,
                price: dec!(51000),
                quantity: dec!(0.1),
                state: OrderState::Open,
                level_id: 2,
                created_ts: 0,
                placed_tick: 0,
            },
        );
        assert!(state.order_at_level(Side::Sell, 2).is_some());
        assert!(state.order_at_level(Side::Buy, 2).is_none());
    }

    #[test]
    fn test_fill_notional() {
        let fill = Fill {
            ts: 0,
            symbol: "BTCUSDT".into(),
            side: Side::Buy,
            price: dec!(50000),
            quantity: dec!(0.1),
            order_id: "x".into(),
        };
        assert_eq!(fill.notional(), dec!(5000.0));
    }
}
