//! Hard prefilter: stateless rejections before policy evaluation
//!
//! Blocked snapshots skip the policy/execution path entirely but still
//! update features and ledger mark-to-market upstream.

use rust_decimal::Decimal;
use serde_json::{json, Value};

/// Why the prefilter blocked a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefilterReason {
    SpreadTooWide,
    Volume24hTooLow,
    Volume1hTooLow,
}

impl PrefilterReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrefilterReason::SpreadTooWide => "SPREAD_TOO_WIDE",
            PrefilterReason::Volume24hTooLow => "VOLUME_24H_TOO_LOW",
            PrefilterReason::Volume1hTooLow => "VOLUME_1H_TOO_LOW",
        }
    }
}

/// Feature inputs consumed by the prefilter.
#[derive(Debug, Clone)]
pub struct PrefilterInput {
    pub spread_bps: i64,
    pub vol_24h_usd: Decimal,
    pub vol_1h_usd: Decimal,
}

#[derive(Debug, Clone)]
pub struct PrefilterConfig {
    /// Spread ceiling; wider books are rejected outright.
    pub max_spread_bps: i64,
    pub min_vol_24h_usd: Decimal,
    pub min_vol_1h_usd: Decimal,
}

impl Default for PrefilterConfig {
    fn default() -> Self {
        Self {
            max_spread_bps: 100,
            min_vol_24h_usd: Decimal::from(1_000_000),
            min_vol_1h_usd: Decimal::from(10_000),
        }
    }
}

/// Verdict with the first failing reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefilterResult {
    pub allowed: bool,
    pub reason: Option<PrefilterReason>,
    pub symbol: String,
}

impl PrefilterResult {
    pub fn to_value(&self) -> Value {
        json!({
            "allowed": self.allowed,
            "reason": self.reason.map(|r| r.as_str()),
            "symbol": self.symbol,
        })
    }
}

/// Apply the hard filter. First failure wins; checks run in a fixed order
/// (spread, 24h volume, 1h volume) so the reason is deterministic.
pub fn hard_filter(symbol: &str, input: &PrefilterInput, config: &PrefilterConfig) -> PrefilterResult {
    let reason = if input.spread_bps > config.max_spread_bps {
        Some(PrefilterReason::SpreadTooWide)
    } else if input.vol_24h_usd < config.min_vol_24h_usd {
        Some(PrefilterReason::Volume24hTooLow)
    } else if input.vol_1h_usd < config.min_vol_1h_usd {
        Some(PrefilterReason::Volume1hTooLow)
    } else {
        None
    };

    PrefilterResult {
        allowed: reason.is_none(),
        reason,
        symbol: symbol.to_string(),
    }
}
