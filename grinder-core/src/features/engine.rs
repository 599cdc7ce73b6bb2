//! Per-symbol feature engine
//!
//! Consumes snapshots and aggregates them into fixed-width bars (default
//! 1 second). On each snapshot it emits a `FeatureSnapshot` combining L1
//! features from the latest book with bar-derived measures over the
//! completed-bar window. Warmup requires 15 completed bars.

use crate::core::time::TsMs;
use crate::data::Snapshot;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};

/// Completed bars required before `is_warmed_up` turns true.
pub const WARMUP_BARS_MIN: u32 = 15;

/// Bars retained per symbol for windowed measures.
const BAR_WINDOW_CAP: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct FeatureEngineConfig {
    /// Bar width in milliseconds.
    pub bar_ms: i64,
    /// Bars in the NATR window.
    pub natr_window: usize,
}

impl Default for FeatureEngineConfig {
    fn default() -> Self {
        Self {
            bar_ms: 1_000,
            natr_window: 14,
        }
    }
}

/// One completed bar of mid prices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bar {
    pub open_ts: TsMs,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

/// Features for one symbol at one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSnapshot {
    pub ts: TsMs,
    pub symbol: String,
    pub mid_price: Decimal,
    pub spread_bps: i64,
    pub imbalance_l1_bps: i64,
    /// Thinner of the two L1 quantities; the liquidity proxy.
    pub thin_l1: Decimal,
    /// Normalized average true range over the NATR window, in bps of close.
    pub natr_bps: i64,
    /// Sum of absolute bar-over-bar returns in bps (chop measure).
    pub sum_abs_returns_bps: i64,
    /// Signed first-to-last return over the bar window, in bps.
    pub net_return_bps: i64,
    /// Chop minus trend: how much movement was range rather than drift.
    pub range_score: i64,
    pub warmup_bars: u32,
    pub is_warmed_up: bool,
}

#[derive(Debug, Default)]
struct SymbolState {
    bars: VecDeque<Bar>,
    current: Option<Bar>,
    current_bucket: i64,
}

/// Streaming bar builder and feature extractor, one state per symbol.
pub struct FeatureEngine {
    config: FeatureEngineConfig,
    states: HashMap<String, SymbolState>,
}

impl FeatureEngine {
    pub fn new(config: FeatureEngineConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(FeatureEngineConfig::default())
    }

    /// Ingest one snapshot and return the current feature view.
    pub fn on_snapshot(&mut self, snapshot: &Snapshot) -> FeatureSnapshot {
        let mid = snapshot.mid_price();
        let bar_ms = self.config.bar_ms;
        let state = self.states.entry(snapshot.symbol.clone()).or_default();

        let bucket = snapshot.ts.div_euclid(bar_ms);
        match &mut state.current {
            Some(bar) if bucket == state.current_bucket => {
                if mid > bar.high {
                    bar.high = mid;
                }
                if mid < bar.low {
                    bar.low = mid;
                }
                bar.close = mid;
            }
            current => {
                if let Some(done) = current.take() {
                    state.bars.push_back(done);
                    if state.bars.len() > BAR_WINDOW_CAP {
                        state.bars.pop_front();
                    }
                }
                *current = Some(Bar {
                    open_ts: bucket * bar_ms,
                    open: mid,
                    high: mid,
                    low: mid,
                    close: mid,
                });
                state.current_bucket = bucket;
            }
        }

        let warmup_bars = state.bars.len() as u32;
        let natr_bps = natr_bps(&state.bars, self.config.natr_window);
        let (sum_abs_returns_bps, net_return_bps) = window_returns_bps(&state.bars);
        let range_score = (sum_abs_returns_bps - net_return_bps.abs()).max(0);

        FeatureSnapshot {
            ts: snapshot.ts,
            symbol: snapshot.symbol.clone(),
            mid_price: mid,
            spread_bps: snapshot.spread_bps(),
            imbalance_l1_bps: snapshot.imbalance_l1_bps(),
            thin_l1: snapshot.bid_qty.min(snapshot.ask_qty),
            natr_bps,
            sum_abs_returns_bps,
            net_return_bps,
            range_score,
            warmup_bars,
            is_warmed_up: warmup_bars >= WARMUP_BARS_MIN,
        }
    }

    /// Completed bars currently held for a symbol.
    pub fn bars(&self, symbol: &str) -> Vec<Bar> {
        self.states
            .get(symbol)
            .map(|s| s.bars.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn reset(&mut self) {
        self.states.clear();
    }
}

fn floor_bps(numer: Decimal, denom: Decimal) -> i64 {
    if denom <= Decimal::ZERO {
        return 0;
    }
    (numer * Decimal::from(10_000) / denom)
        .floor()
        .to_i64()
        .unwrap_or(0)
}

fn natr_bps(bars: &VecDeque<Bar>, window: usize) -> i64 {
    if bars.len() < 2 {
        return 0;
    }
    let take = window.min(bars.len() - 1);
    let start = bars.len() - take;
    let mut tr_sum = Decimal::ZERO;
    for i in start..bars.len() {
        let prev_close = bars[i - 1].close;
        let bar = &bars[i];
        let tr = (bar.high - bar.low)
            .max((bar.high - prev_close).abs())
            .max((bar.low - prev_close).abs());
        tr_sum += tr;
    }
    let last_close = bars[bars.len() - 1].close;
    if last_close <= Decimal::ZERO {
        return 0;
    }
    floor_bps(tr_sum / Decimal::from(take as i64), last_close)
}

fn window_returns_bps(bars: &VecDeque<Bar>) -> (i64, i64) {
    if bars.len() < 2 {
        return (0, 0);
    }
    let mut sum_abs = 0i64;
    for i in 1..bars.len() {
        let prev = bars[i - 1].close;
        let cur = bars[i].close;
        sum_abs += floor_bps((cur - prev).abs(), prev);
    }
    let first = bars[0].close;
    let last = bars[bars.len() - 1].close;
    let net = if first > Decimal::ZERO {
        ((last - first) * Decimal::from(10_000) / first)
            .floor()
            .to_i64()
            .unwrap_or(0)
    } else {
        0
    };
    (sum_abs, net)
}
