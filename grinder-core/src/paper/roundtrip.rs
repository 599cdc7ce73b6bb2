//! Roundtrip tracker: fills -> completed trade outcomes
//!
//! For each symbol the tracker maintains one in-flight position with
//! volume-weighted entry aggregates. Fills on the opposite side accumulate
//! exit aggregates; only the closing transition `N -> 0` emits a
//! `FillOutcomeRow`. The tracker serializes so live state survives
//! restarts.

use crate::core::digest::sha1_hex;
use crate::core::time::TsMs;
use crate::execution::{Fill, Side};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DATASET_VERSION: &str = "fill_outcomes_v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    Long,
    Short,
}

impl TradeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDirection::Long => "long",
            TradeDirection::Short => "short",
        }
    }

    fn entry_side(&self) -> Side {
        match self {
            TradeDirection::Long => Side::Buy,
            TradeDirection::Short => Side::Sell,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeOutcome {
    Win,
    Loss,
    Breakeven,
}

impl TradeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeOutcome::Win => "win",
            TradeOutcome::Loss => "loss",
            TradeOutcome::Breakeven => "breakeven",
        }
    }
}

/// One completed roundtrip. The training and evaluation unit for the fill
/// model, and the dataset row format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillOutcomeRow {
    pub row_id: String,
    pub symbol: String,
    pub direction: TradeDirection,
    pub entry_ts: TsMs,
    pub entry_price: Decimal,
    pub entry_qty: Decimal,
    pub entry_fee: Decimal,
    pub entry_fill_count: u32,
    pub exit_ts: TsMs,
    pub exit_price: Decimal,
    pub exit_qty: Decimal,
    pub exit_fee: Decimal,
    pub exit_fill_count: u32,
    pub realized_pnl: Decimal,
    pub net_pnl: Decimal,
    pub pnl_bps: i64,
    pub holding_time_ms: i64,
    pub notional: Decimal,
    pub outcome: TradeOutcome,
    pub source: String,
    pub dataset_version: String,
}

/// sha1 over the canonical identity tuple, pipe-joined.
pub fn compute_row_id(
    symbol: &str,
    direction: TradeDirection,
    entry_ts: TsMs,
    exit_ts: TsMs,
    entry_price: Decimal,
    exit_price: Decimal,
    entry_qty: Decimal,
) -> String {
    let canonical = format!(
        "{symbol}|{direction}|{entry_ts}|{exit_ts}|{entry_price}|{exit_price}|{entry_qty}",
        direction = direction.as_str(),
    );
    sha1_hex(canonical.as_bytes())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct InFlight {
    direction: TradeDirection,
    entry_ts: TsMs,
    entry_qty: Decimal,
    entry_notional: Decimal,
    entry_fee: Decimal,
    entry_fill_count: u32,
    open_qty: Decimal,
    exit_ts: TsMs,
    exit_qty: Decimal,
    exit_notional: Decimal,
    exit_fee: Decimal,
    exit_fill_count: u32,
}

impl InFlight {
    fn open(fill: &Fill, fee: Decimal, direction: TradeDirection) -> Self {
        Self {
            direction,
            entry_ts: fill.ts,
            entry_qty: fill.quantity,
            entry_notional: fill.price * fill.quantity,
            entry_fee: fee,
            entry_fill_count: 1,
            open_qty: fill.quantity,
            exit_ts: 0,
            exit_qty: Decimal::ZERO,
            exit_notional: Decimal::ZERO,
            exit_fee: Decimal::ZERO,
            exit_fill_count: 0,
        }
    }
}

/// Serializable tracker state (the v2 persisted form embeds this).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundtripTrackerState {
    in_flight: BTreeMap<String, InFlight>,
}

#[derive(Debug, Clone)]
pub struct RoundtripTracker {
    state: RoundtripTrackerState,
    source: String,
}

impl RoundtripTracker {
    /// `source` tags emitted rows: "paper" or "live".
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            state: RoundtripTrackerState::default(),
            source: source.into(),
        }
    }

    pub fn from_state(state: RoundtripTrackerState, source: impl Into<String>) -> Self {
        Self {
            state,
            source: source.into(),
        }
    }

    pub fn state(&self) -> &RoundtripTrackerState {
        &self.state
    }

    pub fn in_flight_symbols(&self) -> Vec<&str> {
        self.state.in_flight.keys().map(String::as_str).collect()
    }

    /// Record one fill. Returns completed rows (usually zero or one; an
    /// over-large closing fill both closes and re-opens, still one row).
    pub fn record_fill(&mut self, fill: &Fill, fee: Decimal) -> Vec<FillOutcomeRow> {
        let mut rows = Vec::new();
        let mut remaining = fill.quantity;
        let mut remaining_fee = fee;

        while remaining > Decimal::ZERO {
            let mut closed = false;
            match self.state.in_flight.get_mut(&fill.symbol) {
                None => {
                    let direction = match fill.side {
                        Side::Buy => TradeDirection::Long,
                        Side::Sell => TradeDirection::Short,
                    };
                    let mut opening = fill.clone();
                    opening.quantity = remaining;
                    self.state.in_flight.insert(
                        fill.symbol.clone(),
                        InFlight::open(&opening, remaining_fee, direction),
                    );
                    remaining = Decimal::ZERO;
                }
                Some(flight) if fill.side == flight.direction.entry_side() => {
                    // Same side: add to the entry aggregates.
                    flight.entry_qty += remaining;
                    flight.entry_notional += fill.price * remaining;
                    flight.entry_fee += remaining_fee;
                    flight.entry_fill_count += 1;
                    flight.open_qty += remaining;
                    remaining = Decimal::ZERO;
                }
                Some(flight) => {
                    // Opposite side: reduce.
                    let closing = flight.open_qty.min(remaining);
                    let fee_share = if remaining > Decimal::ZERO {
                        remaining_fee * closing / remaining
                    } else {
                        Decimal::ZERO
                    };
                    flight.exit_qty += closing;
                    flight.exit_notional += fill.price * closing;
                    flight.exit_fee += fee_share;
                    flight.exit_fill_count += 1;
                    flight.exit_ts = fill.ts;
                    flight.open_qty -= closing;
                    remaining -= closing;
                    remaining_fee -= fee_share;
                    closed = flight.open_qty.is_zero();
                }
            }
            if closed {
                if let Some(flight) = self.state.in_flight.remove(&fill.symbol) {
                    rows.push(self.emit(&fill.symbol, flight));
                }
            }
        }
        rows
    }

    fn emit(&self, symbol: &str, flight: InFlight) -> FillOutcomeRow {
        let entry_price = if flight.entry_qty > Decimal::ZERO {
            flight.entry_notional / flight.entry_qty
        } else {
            Decimal::ZERO
        };
        let exit_price = if flight.exit_qty > Decimal::ZERO {
            flight.exit_notional / flight.exit_qty
        } else {
            Decimal::ZERO
        };

        let realized_pnl = match flight.direction {
            TradeDirection::Long => flight.exit_notional - flight.entry_notional,
            TradeDirection::Short => flight.entry_notional - flight.exit_notional,
        };
        let fees = flight.entry_fee + flight.exit_fee;
        let net_pnl = realized_pnl - fees;

        let notional = flight.entry_notional;
        let pnl_bps = if notional > Decimal::ZERO {
            (net_pnl * Decimal::from(10_000) / notional)
                .round()
                .to_i64()
                .unwrap_or(0)
        } else {
            0
        };

        let outcome = if net_pnl > Decimal::ZERO {
            TradeOutcome::Win
        } else if net_pnl < Decimal::ZERO {
            TradeOutcome::Loss
        } else {
            TradeOutcome::Breakeven
        };

        FillOutcomeRow {
            row_id: compute_row_id(
                symbol,
                flight.direction,
                flight.entry_ts,
                flight.exit_ts,
                entry_price,
                exit_price,
                flight.entry_qty,
            ),
            symbol: symbol.to_string(),
            direction: flight.direction,
            entry_ts: flight.entry_ts,
            entry_price,
            entry_qty: flight.entry_qty,
            entry_fee: flight.entry_fee,
            entry_fill_count: flight.entry_fill_count,
            exit_ts: flight.exit_ts,
            exit_price,
            exit_qty: flight.exit_qty,
            exit_fee: flight.exit_fee,
            exit_fill_count: flight.exit_fill_count,
            realized_pnl,
            net_pnl,
            pnl_bps,
            holding_time_ms: flight.exit_ts - flight.entry_ts,
            notional,
            outcome,
            source: self.source.clone(),
            dataset_version: DATASET_VERSION.to_string(),
        }
    }
}
