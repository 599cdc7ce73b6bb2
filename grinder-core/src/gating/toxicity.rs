//! Toxicity gate: spread and realized price impact
//!
//! Keeps a small rolling price history per symbol and blocks when the
//! spread exceeds the ceiling or the realized price move over the lookback
//! window exceeds the impact limit. Both conditions indicate market-making
//! here is temporarily unprofitable.

use super::{GateReason, GatingResult};
use crate::core::time::TsMs;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Map};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone)]
pub struct ToxicityGateConfig {
    pub max_spread_bps: i64,
    pub max_price_impact_bps: i64,
    pub lookback_window_ms: i64,
}

impl Default for ToxicityGateConfig {
    fn default() -> Self {
        Self {
            max_spread_bps: 50,
            // High enough to ignore normal volatility.
            max_price_impact_bps: 500,
            lookback_window_ms: 5_000,
        }
    }
}

pub struct ToxicityGate {
    config: ToxicityGateConfig,
    history: HashMap<String, VecDeque<(TsMs, Decimal)>>,
}

impl ToxicityGate {
    pub fn new(config: ToxicityGateConfig) -> Self {
        Self {
            config,
            history: HashMap::new(),
        }
    }

    /// Record a mid price for impact tracking. Entries older than the
    /// lookback window are evicted.
    pub fn record_price(&mut self, ts: TsMs, symbol: &str, mid_price: Decimal) {
        let window = self.history.entry(symbol.to_string()).or_default();
        window.push_back((ts, mid_price));
        let horizon = ts - self.config.lookback_window_ms;
        while window.front().is_some_and(|(t, _)| *t < horizon) {
            window.pop_front();
        }
    }

    /// Realized absolute price move over the retained window, in bps of
    /// the oldest price.
    pub fn price_impact_bps(&self, symbol: &str) -> i64 {
        let Some(window) = self.history.get(symbol) else {
            return 0;
        };
        let (Some((_, oldest)), Some((_, newest))) = (window.front(), window.back()) else {
            return 0;
        };
        if *oldest <= Decimal::ZERO {
            return 0;
        }
        ((*newest - *oldest).abs() * Decimal::from(10_000) / *oldest)
            .floor()
            .to_i64()
            .unwrap_or(0)
    }

    pub fn check(
        &self,
        _ts: TsMs,
        symbol: &str,
        spread_bps: i64,
        _mid_price: Decimal,
    ) -> GatingResult {
        let impact_bps = self.price_impact_bps(symbol);

        let mut details = Map::new();
        details.insert("spread_bps".into(), json!(spread_bps));
        details.insert("max_spread_bps".into(), json!(self.config.max_spread_bps));
        details.insert("price_impact_bps".into(), json!(impact_bps));
        details.insert(
            "max_price_impact_bps".into(),
            json!(self.config.max_price_impact_bps),
        );

        if spread_bps > self.config.max_spread_bps {
            return GatingResult::block(GateReason::ToxicitySpread, details);
        }
        if impact_bps > self.config.max_price_impact_bps {
            return GatingResult::block(GateReason::ToxicityImpact, details);
        }
        GatingResult::allow(details)
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}
