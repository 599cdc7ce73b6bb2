//! Gating stack: toxicity, rate limit, risk limits
//!
//! Three gates evaluated in a fixed order; the first failure
//! short-circuits. The combined allow result carries the per-gate detail
//! maps; a blocked result carries the failing gate's reason.

pub mod rate_limit;
pub mod risk;
pub mod stack;
pub mod toxicity;

pub use rate_limit::{RateLimiter, RateLimiterConfig};
pub use risk::{RiskGate, RiskGateConfig};
pub use stack::GatingStack;
pub use toxicity::{ToxicityGate, ToxicityGateConfig};

use serde_json::{json, Map, Value};

/// Why a gate blocked the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateReason {
    ToxicitySpread,
    ToxicityImpact,
    RateLimitExceeded,
    CooldownActive,
    MaxNotionalPerSymbol,
    MaxNotionalTotal,
    DailyLossLimit,
}

impl GateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateReason::ToxicitySpread => "TOXICITY_SPREAD",
            GateReason::ToxicityImpact => "TOXICITY_IMPACT",
            GateReason::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            GateReason::CooldownActive => "COOLDOWN_ACTIVE",
            GateReason::MaxNotionalPerSymbol => "MAX_NOTIONAL_PER_SYMBOL",
            GateReason::MaxNotionalTotal => "MAX_NOTIONAL_TOTAL",
            GateReason::DailyLossLimit => "DAILY_LOSS_LIMIT",
        }
    }
}

/// Verdict from a single gate or the whole stack.
#[derive(Debug, Clone, PartialEq)]
pub struct GatingResult {
    pub allowed: bool,
    pub reason: Option<GateReason>,
    pub details: Map<String, Value>,
}

impl GatingResult {
    pub fn allow(details: Map<String, Value>) -> Self {
        Self {
            allowed: true,
            reason: None,
            details,
        }
    }

    pub fn allow_empty() -> Self {
        Self::allow(Map::new())
    }

    pub fn block(reason: GateReason, details: Map<String, Value>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            details,
        }
    }

    pub fn to_value(&self) -> Value {
        json!({
            "allowed": self.allowed,
            "reason": self.reason.map(|r| r.as_str()),
            "details": Value::Object(self.details.clone()),
        })
    }
}
