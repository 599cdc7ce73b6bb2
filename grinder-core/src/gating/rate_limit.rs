//! Order rate limiter
//!
//! Token-bucket style: at most N orders per rolling minute, plus a minimum
//! cooldown between any two placements. Timestamps come from the caller so
//! replay and tests are deterministic.

use super::{GateReason, GatingResult};
use crate::core::time::TsMs;
use serde_json::{json, Map};
use std::collections::VecDeque;

const WINDOW_MS: i64 = 60_000;

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub max_orders_per_minute: usize,
    pub cooldown_ms: i64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_orders_per_minute: 60,
            cooldown_ms: 100,
        }
    }
}

pub struct RateLimiter {
    config: RateLimiterConfig,
    placements: VecDeque<TsMs>,
    last_order_ts: Option<TsMs>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            placements: VecDeque::new(),
            last_order_ts: None,
        }
    }

    fn evict(&mut self, ts: TsMs) {
        let horizon = ts - WINDOW_MS;
        while self.placements.front().is_some_and(|t| *t <= horizon) {
            self.placements.pop_front();
        }
    }

    pub fn check(&mut self, ts: TsMs) -> GatingResult {
        self.evict(ts);

        let mut details = Map::new();
        details.insert("orders_in_window".into(), json!(self.placements.len()));
        details.insert(
            "max_orders_per_minute".into(),
            json!(self.config.max_orders_per_minute),
        );
        details.insert("cooldown_ms".into(), json!(self.config.cooldown_ms));

        if let Some(last) = self.last_order_ts {
            if ts - last < self.config.cooldown_ms {
                details.insert("ms_since_last_order".into(), json!(ts - last));
                return GatingResult::block(GateReason::CooldownActive, details);
            }
        }

        if self.placements.len() >= self.config.max_orders_per_minute {
            return GatingResult::block(GateReason::RateLimitExceeded, details);
        }

        GatingResult::allow(details)
    }

    /// Record an accepted placement.
    pub fn record_order(&mut self, ts: TsMs) {
        self.placements.push_back(ts);
        self.last_order_ts = Some(ts);
    }

    pub fn reset(&mut self) {
        self.placements.clear();
        self.last_order_ts = None;
    }
}
