//! Data-quality engine: stale / gap / outlier conditions
//!
//! Observes ticks and produces a verdict the remediation executor can
//! consult before acting on a possibly-wrong view of the market. When
//! several conditions hold the consumer applies priority
//! stale > gap > outlier.

use crate::core::time::TsMs;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct DataQualityConfig {
    /// Tick older than this (vs. now) is stale.
    pub stale_book_ticker_ms: i64,
    /// Ascending gap bucket thresholds; the verdict carries the largest
    /// bucket the inter-tick gap reached.
    pub gap_buckets_ms: Vec<i64>,
    /// Price jump beyond this marks an outlier tick.
    pub price_jump_max_bps: i64,
}

impl Default for DataQualityConfig {
    fn default() -> Self {
        Self {
            stale_book_ticker_ms: 5_000,
            gap_buckets_ms: vec![500, 2_000],
            price_jump_max_bps: 300,
        }
    }
}

/// Immutable verdict for the most recent tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataQualityVerdict {
    pub stale: bool,
    pub gap_bucket: Option<String>,
    pub outlier_kind: Option<String>,
}

impl DataQualityVerdict {
    pub fn is_ok(&self) -> bool {
        !self.stale && self.gap_bucket.is_none() && self.outlier_kind.is_none()
    }
}

#[derive(Debug, Default)]
pub struct DataQualityEngine {
    config: DataQualityConfig,
    last_tick_ts: Option<TsMs>,
    last_price: Option<Decimal>,
    last_verdict: DataQualityVerdict,
}

impl DataQualityEngine {
    pub fn new(config: DataQualityConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Observe one tick. `now_ms` is wall time, `tick_ts` the exchange
    /// timestamp, `price` the tick's mid.
    pub fn observe_tick(&mut self, now_ms: TsMs, tick_ts: TsMs, price: Decimal) -> DataQualityVerdict {
        let stale = now_ms - tick_ts > self.config.stale_book_ticker_ms;

        let gap_bucket = self.last_tick_ts.and_then(|last| {
            let gap = tick_ts - last;
            self.config
                .gap_buckets_ms
                .iter()
                .rev()
                .find(|&&bucket| gap >= bucket)
                .map(|bucket| bucket.to_string())
        });

        let outlier_kind = self.last_price.and_then(|last| {
            if last <= Decimal::ZERO {
                return None;
            }
            let jump_bps = ((price - last).abs() * Decimal::from(10_000) / last)
                .floor()
                .to_i64()
                .unwrap_or(0);
            (jump_bps > self.config.price_jump_max_bps).then(|| "price".to_string())
        });

        self.last_tick_ts = Some(tick_ts);
        self.last_price = Some(price);

        let verdict = DataQualityVerdict {
            stale,
            gap_bucket,
            outlier_kind,
        };
        self.last_verdict = verdict.clone();
        verdict
    }

    /// The most recent verdict (what remediation consults).
    pub fn current_verdict(&self) -> DataQualityVerdict {
        self.last_verdict.clone()
    }
}
