//! Deterministic client order ids
//!
//! Format: `{prefix}{sep}{strategy}{sep}{symbol}{sep}{level_id}{sep}{ts}{sep}{seq}`
//! with defaults `grinder_static_BTCUSDT_B0_1700000000000_17`. The prefix
//! and separator are configurable but fixed at engine start. Only ids that
//! pass the is-ours check (prefix match + strategy in the allowlist) are
//! eligible for automated cancellation.

use crate::core::errors::ConfigError;
use crate::core::time::TsMs;
use std::collections::BTreeSet;

pub const DEFAULT_ID_PREFIX: &str = "grinder";
pub const DEFAULT_ID_SEPARATOR: char = '_';

/// Identity rule shared by the id generator and the is-ours check.
#[derive(Debug, Clone)]
pub struct OrderIdPolicy {
    prefix: String,
    separator: char,
    strategy_allowlist: BTreeSet<String>,
}

impl OrderIdPolicy {
    pub fn new(
        prefix: impl Into<String>,
        separator: char,
        strategies: impl IntoIterator<Item = String>,
    ) -> Result<Self, ConfigError> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(ConfigError("order id prefix cannot be empty".into()));
        }
        if prefix.contains(separator) {
            return Err(ConfigError(format!(
                "order id prefix {prefix:?} cannot contain the separator {separator:?}"
            )));
        }
        let strategy_allowlist: BTreeSet<String> = strategies.into_iter().collect();
        for strategy in &strategy_allowlist {
            if strategy.is_empty() || strategy.contains(separator) {
                return Err(ConfigError(format!(
                    "strategy token {strategy:?} is not separator-safe"
                )));
            }
        }
        Ok(Self {
            prefix,
            separator,
            strategy_allowlist,
        })
    }

    pub fn default_with_strategies(strategies: impl IntoIterator<Item = String>) -> Self {
        Self::new(DEFAULT_ID_PREFIX, DEFAULT_ID_SEPARATOR, strategies)
            .expect("default id policy is valid")
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    /// True iff the id was generated by this system under an allowed
    /// strategy. Foreign and manual orders fail this check and are never
    /// auto-cancelled.
    pub fn is_ours(&self, client_order_id: &str) -> bool {
        let mut parts = client_order_id.split(self.separator);
        let Some(prefix) = parts.next() else {
            return false;
        };
        if prefix != self.prefix {
            return false;
        }
        let Some(strategy) = parts.next() else {
            return false;
        };
        if !self.strategy_allowlist.contains(strategy) {
            return false;
        }
        // symbol, level_id, ts, seq
        parts.count() == 4
    }
}

/// Deterministic id generator for one strategy.
#[derive(Debug, Clone)]
pub struct OrderIdGenerator {
    policy: OrderIdPolicy,
    strategy: String,
}

impl OrderIdGenerator {
    pub fn new(policy: OrderIdPolicy, strategy: impl Into<String>) -> Result<Self, ConfigError> {
        let strategy = strategy.into();
        if strategy.is_empty() || strategy.contains(policy.separator()) {
            return Err(ConfigError(format!(
                "strategy token {strategy:?} is not separator-safe"
            )));
        }
        Ok(Self { policy, strategy })
    }

    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    /// Build a client order id from the identity tuple. Same inputs always
    /// yield the same id; `seq` disambiguates multiple orders for one
    /// level within a single timestamp.
    pub fn make_id(&self, symbol: &str, level_id: &str, ts: TsMs, seq: u64) -> String {
        let sep = self.policy.separator();
        format!(
            "{prefix}{sep}{strategy}{sep}{symbol}{sep}{level_id}{sep}{ts}{sep}{seq}",
            prefix = self.policy.prefix(),
            strategy = self.strategy,
        )
    }
}
