//! Combined gate evaluation in fixed order

use super::{GatingResult, RateLimiter, RiskGate, ToxicityGate};
use crate::core::time::TsMs;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

/// Owns the three gates and evaluates them in order:
/// toxicity -> rate limit -> risk. First failure short-circuits.
pub struct GatingStack {
    pub toxicity: ToxicityGate,
    pub rate_limiter: RateLimiter,
    pub risk_gate: RiskGate,
}

impl GatingStack {
    pub fn new(toxicity: ToxicityGate, rate_limiter: RateLimiter, risk_gate: RiskGate) -> Self {
        Self {
            toxicity,
            rate_limiter,
            risk_gate,
        }
    }

    /// Evaluate all gates for a proposed order. The allow result carries
    /// the rate and risk detail maps; toxicity details are omitted from
    /// the allow payload to keep digest input small and stable.
    pub fn check(
        &mut self,
        ts: TsMs,
        symbol: &str,
        proposed_notional: Decimal,
        spread_bps: i64,
        mid_price: Decimal,
    ) -> GatingResult {
        let tox = self.toxicity.check(ts, symbol, spread_bps, mid_price);
        if !tox.allowed {
            return tox;
        }

        let rate = self.rate_limiter.check(ts);
        if !rate.allowed {
            return rate;
        }

        let risk = self.risk_gate.check_order(symbol, proposed_notional);
        if !risk.allowed {
            return risk;
        }

        let mut details = Map::new();
        details.insert("rate_limiter".into(), Value::Object(rate.details));
        details.insert("risk_gate".into(), Value::Object(risk.details));
        GatingResult::allow(details)
    }

    pub fn reset(&mut self) {
        self.toxicity.reset();
        self.rate_limiter.reset();
        self.risk_gate.reset();
    }
}
