//! Normalized market data types
//!
//! A `Snapshot` is the L1 view the pipeline runs on: best bid/ask with
//! quantities plus the last trade. `L2Snapshot` is the depth view used by
//! thinness features and book checks. Both validate their invariants at
//! construction so downstream code never re-checks.

use crate::core::digest::dec_value;
use crate::core::time::TsMs;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("crossed book for {symbol}: bid {bid} >= ask {ask}")]
    CrossedBook {
        symbol: String,
        bid: Decimal,
        ask: Decimal,
    },

    #[error("negative quantity in snapshot for {symbol}")]
    NegativeQuantity { symbol: String },

    #[error("l2 side not strictly ordered at level {level}")]
    UnorderedSide { level: usize },

    #[error("l2 level {level} has non-positive quantity")]
    NonPositiveQuantity { level: usize },

    #[error("l2 depth mismatch: {bids} bids vs {asks} asks")]
    DepthMismatch { bids: usize, asks: usize },
}

/// L1 market snapshot for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub ts: TsMs,
    pub symbol: String,
    pub bid_price: Decimal,
    pub ask_price: Decimal,
    pub bid_qty: Decimal,
    pub ask_qty: Decimal,
    pub last_price: Decimal,
    pub last_qty: Decimal,
}

impl Snapshot {
    /// Validate book invariants: `bid < ask`, all quantities >= 0.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.bid_price >= self.ask_price {
            return Err(SnapshotError::CrossedBook {
                symbol: self.symbol.clone(),
                bid: self.bid_price,
                ask: self.ask_price,
            });
        }
        if self.bid_qty < Decimal::ZERO
            || self.ask_qty < Decimal::ZERO
            || self.last_qty < Decimal::ZERO
        {
            return Err(SnapshotError::NegativeQuantity {
                symbol: self.symbol.clone(),
            });
        }
        Ok(())
    }

    pub fn mid_price(&self) -> Decimal {
        (self.bid_price + self.ask_price) / Decimal::TWO
    }

    /// Spread in whole basis points, floored.
    pub fn spread_bps(&self) -> i64 {
        let mid = self.mid_price();
        if mid <= Decimal::ZERO {
            return 0;
        }
        let bps = (self.ask_price - self.bid_price) * Decimal::from(10_000) / mid;
        bps.floor().to_i64().unwrap_or(i64::MAX)
    }

    /// L1 imbalance `(bid_qty - ask_qty) / (bid_qty + ask_qty)` in floored
    /// basis points. Zero when both sides are empty.
    pub fn imbalance_l1_bps(&self) -> i64 {
        let total = self.bid_qty + self.ask_qty;
        if total <= Decimal::ZERO {
            return 0;
        }
        let bps = (self.bid_qty - self.ask_qty) * Decimal::from(10_000) / total;
        bps.floor().to_i64().unwrap_or(0)
    }

    /// Canonical JSON value used in fixtures and digests.
    pub fn to_value(&self) -> Value {
        json!({
            "type": "SNAPSHOT",
            "ts": self.ts,
            "symbol": self.symbol,
            "bid_price": dec_value(&self.bid_price),
            "ask_price": dec_value(&self.ask_price),
            "bid_qty": dec_value(&self.bid_qty),
            "ask_qty": dec_value(&self.ask_qty),
            "last_price": dec_value(&self.last_price),
            "last_qty": dec_value(&self.last_qty),
        })
    }
}

/// One price level of an L2 book side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Decimal,
    pub qty: Decimal,
}

/// Validated two-sided depth snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L2Snapshot {
    pub ts: TsMs,
    pub symbol: String,
    bids: Vec<BookLevel>,
    asks: Vec<BookLevel>,
}

impl L2Snapshot {
    /// Build an L2 snapshot, enforcing: equal depth on both sides, bids
    /// strictly descending, asks strictly ascending, all quantities > 0.
    pub fn new(
        ts: TsMs,
        symbol: impl Into<String>,
        bids: Vec<BookLevel>,
        asks: Vec<BookLevel>,
    ) -> Result<Self, SnapshotError> {
        if bids.len() != asks.len() {
            return Err(SnapshotError::DepthMismatch {
                bids: bids.len(),
                asks: asks.len(),
            });
        }
        for side in [&bids, &asks] {
            for (i, level) in side.iter().enumerate() {
                if level.qty <= Decimal::ZERO {
                    return Err(SnapshotError::NonPositiveQuantity { level: i });
                }
            }
        }
        for (i, pair) in bids.windows(2).enumerate() {
            if pair[1].price >= pair[0].price {
                return Err(SnapshotError::UnorderedSide { level: i + 1 });
            }
        }
        for (i, pair) in asks.windows(2).enumerate() {
            if pair[1].price <= pair[0].price {
                return Err(SnapshotError::UnorderedSide { level: i + 1 });
            }
        }
        Ok(Self {
            ts,
            symbol: symbol.into(),
            bids,
            asks,
        })
    }

    pub fn depth(&self) -> usize {
        self.bids.len()
    }

    pub fn bids(&self) -> &[BookLevel] {
        &self.bids
    }

    pub fn asks(&self) -> &[BookLevel] {
        &self.asks
    }

    /// Total quantity on a side within `within_bps` of the touch. Used by
    /// the thinness indicator.
    pub fn depth_qty_within_bps(&self, side_bids: bool, within_bps: i64) -> Decimal {
        let levels = if side_bids { &self.bids } else { &self.asks };
        let Some(touch) = levels.first() else {
            return Decimal::ZERO;
        };
        let band = touch.price * Decimal::from(within_bps) / Decimal::from(10_000);
        levels
            .iter()
            .filter(|l| {
                if side_bids {
                    l.price >= touch.price - band
                } else {
                    l.price <= touch.price + band
                }
            })
            .map(|l| l.qty)
            .sum()
    }
}
