//! Portfolio drawdown-budget allocator
//!
//! Distributes `equity * portfolio_dd_budget` across enabled symbols by
//! `weight / tier_factor`, normalized, rounded DOWN to cents. Invariants:
//! non-negativity, conservation (allocated + residual == budget),
//! determinism, budget monotonicity, tier ordering at equal weights.

use crate::core::errors::AllocationError;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskTier {
    Low,
    Med,
    High,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Med => "med",
            RiskTier::High => "high",
        }
    }
}

fn default_tier_factor(tier: RiskTier) -> Decimal {
    match tier {
        RiskTier::Low => Decimal::new(10, 1),  // 1.0
        RiskTier::Med => Decimal::new(15, 1),  // 1.5
        RiskTier::High => Decimal::new(20, 1), // 2.0
    }
}

#[derive(Debug, Clone)]
pub struct SymbolCandidate {
    pub symbol: String,
    pub tier: RiskTier,
    pub weight: Decimal,
    pub enabled: bool,
}

impl SymbolCandidate {
    pub fn new(symbol: impl Into<String>, tier: RiskTier) -> Result<Self, AllocationError> {
        Self::with_weight(symbol, tier, Decimal::ONE)
    }

    pub fn with_weight(
        symbol: impl Into<String>,
        tier: RiskTier,
        weight: Decimal,
    ) -> Result<Self, AllocationError> {
        let symbol = symbol.into();
        if symbol.is_empty() {
            return Err(AllocationError("symbol cannot be empty".into()));
        }
        if weight < Decimal::ZERO {
            return Err(AllocationError(format!("weight must be >= 0, got {weight}")));
        }
        Ok(Self {
            symbol,
            tier,
            weight,
            enabled: true,
        })
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllocationResult {
    /// symbol -> dd budget as a fraction of equity.
    pub allocations: BTreeMap<String, Decimal>,
    pub allocations_usd: BTreeMap<String, Decimal>,
    pub residual_usd: Decimal,
    pub total_allocated_usd: Decimal,
    pub portfolio_budget_usd: Decimal,
    pub enabled_count: usize,
}

#[derive(Debug, Clone)]
pub struct DdAllocatorConfig {
    pub tier_factors: BTreeMap<RiskTier, Decimal>,
    /// Decimal places for budget rounding (2 = USD cents).
    pub budget_precision: u32,
    /// Rounded budgets below this become 0 (residual keeps the amount).
    pub min_budget_usd: Decimal,
}

impl Default for DdAllocatorConfig {
    fn default() -> Self {
        let mut tier_factors = BTreeMap::new();
        for tier in [RiskTier::Low, RiskTier::Med, RiskTier::High] {
            tier_factors.insert(tier, default_tier_factor(tier));
        }
        Self {
            tier_factors,
            budget_precision: 2,
            min_budget_usd: Decimal::ONE,
        }
    }
}

impl DdAllocatorConfig {
    pub fn validate(&self) -> Result<(), AllocationError> {
        if self.min_budget_usd < Decimal::ZERO {
            return Err(AllocationError(format!(
                "min_budget_usd must be >= 0, got {}",
                self.min_budget_usd
            )));
        }
        for (tier, factor) in &self.tier_factors {
            if *factor <= Decimal::ZERO {
                return Err(AllocationError(format!(
                    "tier_factor for {} must be > 0, got {factor}",
                    tier.as_str()
                )));
            }
        }
        Ok(())
    }
}

/// Stateless allocator; `allocate` is a pure function of its inputs.
#[derive(Debug, Clone, Default)]
pub struct DdAllocator {
    config: DdAllocatorConfig,
}

impl DdAllocator {
    pub fn new(config: DdAllocatorConfig) -> Result<Self, AllocationError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn allocate(
        &self,
        equity: Decimal,
        portfolio_dd_budget: Decimal,
        candidates: &[SymbolCandidate],
    ) -> Result<AllocationResult, AllocationError> {
        if equity <= Decimal::ZERO {
            return Err(AllocationError(format!("equity must be > 0, got {equity}")));
        }
        if portfolio_dd_budget <= Decimal::ZERO {
            return Err(AllocationError(format!(
                "portfolio_dd_budget must be > 0, got {portfolio_dd_budget}"
            )));
        }
        if portfolio_dd_budget > Decimal::ONE {
            return Err(AllocationError(format!(
                "portfolio_dd_budget must be <= 1.0, got {portfolio_dd_budget}"
            )));
        }
        if candidates.is_empty() {
            return Err(AllocationError("candidates cannot be empty".into()));
        }

        let portfolio_budget_usd = equity * portfolio_dd_budget;

        let mut enabled: Vec<&SymbolCandidate> =
            candidates.iter().filter(|c| c.enabled).collect();
        if enabled.is_empty() {
            return Ok(AllocationResult {
                allocations: BTreeMap::new(),
                allocations_usd: BTreeMap::new(),
                residual_usd: portfolio_budget_usd,
                total_allocated_usd: Decimal::ZERO,
                portfolio_budget_usd,
                enabled_count: 0,
            });
        }
        enabled.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        // Raw risk weights: weight / tier_factor.
        let mut raw_weights: Vec<(&str, Decimal)> = Vec::with_capacity(enabled.len());
        for candidate in &enabled {
            let factor = self
                .config
                .tier_factors
                .get(&candidate.tier)
                .copied()
                .unwrap_or_else(|| default_tier_factor(RiskTier::Med));
            raw_weights.push((candidate.symbol.as_str(), candidate.weight / factor));
        }

        let total_weight: Decimal = raw_weights.iter().map(|(_, w)| *w).sum();
        if total_weight <= Decimal::ZERO {
            return Err(AllocationError("total weight must be > 0".into()));
        }

        let mut allocations_usd = BTreeMap::new();
        let mut total_allocated_usd = Decimal::ZERO;
        for (symbol, weight) in &raw_weights {
            let raw_usd = portfolio_budget_usd * *weight / total_weight;
            let mut rounded = raw_usd.round_dp_with_strategy(
                self.config.budget_precision,
                RoundingStrategy::ToZero,
            );
            if rounded < self.config.min_budget_usd {
                rounded = Decimal::ZERO;
            }
            total_allocated_usd += rounded;
            allocations_usd.insert((*symbol).to_string(), rounded);
        }

        let residual_usd = portfolio_budget_usd - total_allocated_usd;
        let allocations = allocations_usd
            .iter()
            .map(|(symbol, usd)| (symbol.clone(), *usd / equity))
            .collect();

        Ok(AllocationResult {
            allocations,
            allocations_usd,
            residual_usd,
            total_allocated_usd,
            portfolio_budget_usd,
            enabled_count: enabled.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn candidate(symbol: &str, tier: RiskTier) -> SymbolCandidate {
        SymbolCandidate::new(symbol, tier).unwrap()
    }

    #[test]
    fn test_conservation() {
        let allocator = DdAllocator::default();
        let result = allocator
            .allocate(
                dec!(100000),
                dec!(0.20),
                &[
                    candidate("BTCUSDT", RiskTier::High),
                    candidate("ETHUSDT", RiskTier::Med),
                    candidate("BNBUSDT", RiskTier::Low),
                ],
            )
            .unwrap();

        let sum: Decimal = result.allocations_usd.values().copied().sum();
        assert_eq!(sum + result.residual_usd, result.portfolio_budget_usd);
        assert!(result.residual_usd >= Decimal::ZERO);
    }

    #[test]
    fn test_tier_ordering_at_equal_weights() {
        let allocator = DdAllocator::default();
        let result = allocator
            .allocate(
                dec!(100000),
                dec!(0.20),
                &[
                    candidate("AUSDT", RiskTier::High),
                    candidate("BUSDT", RiskTier::Med),
                    candidate("CUSDT", RiskTier::Low),
                ],
            )
            .unwrap();

        let high = result.allocations_usd["AUSDT"];
        let med = result.allocations_usd["BUSDT"];
        let low = result.allocations_usd["CUSDT"];
        assert!(high <= med);
        assert!(med <= low);
    }

    #[test]
    fn test_determinism() {
        let allocator = DdAllocator::default();
        let candidates = [
            candidate("BTCUSDT", RiskTier::High),
            candidate("ETHUSDT", RiskTier::Low),
        ];
        let a = allocator.allocate(dec!(50000), dec!(0.1), &candidates).unwrap();
        let b = allocator.allocate(dec!(50000), dec!(0.1), &candidates).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_disabled_symbols_get_nothing() {
        let allocator = DdAllocator::default();
        let result = allocator
            .allocate(
                dec!(100000),
                dec!(0.20),
                &[
                    candidate("BTCUSDT", RiskTier::Med),
                    candidate("ETHUSDT", RiskTier::Med).disabled(),
                ],
            )
            .unwrap();
        assert!(!result.allocations_usd.contains_key("ETHUSDT"));
        assert_eq!(result.enabled_count, 1);
    }

    #[test]
    fn test_all_disabled_returns_full_residual() {
        let allocator = DdAllocator::default();
        let result = allocator
            .allocate(
                dec!(100000),
                dec!(0.20),
                &[candidate("BTCUSDT", RiskTier::Med).disabled()],
            )
            .unwrap();
        assert_eq!(result.residual_usd, dec!(20000.00));
        assert_eq!(result.enabled_count, 0);
    }

    #[test]
    fn test_min_budget_floor() {
        let allocator = DdAllocator::new(DdAllocatorConfig {
            min_budget_usd: dec!(100),
            ..Default::default()
        })
        .unwrap();
        // Tiny budget: every slice is below the floor.
        let result = allocator
            .allocate(
                dec!(1000),
                dec!(0.01),
                &[
                    candidate("AUSDT", RiskTier::Med),
                    candidate("BUSDT", RiskTier::Med),
                ],
            )
            .unwrap();
        assert!(result.allocations_usd.values().all(|v| v.is_zero()));
        assert_eq!(result.residual_usd, result.portfolio_budget_usd);
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let allocator = DdAllocator::default();
        let candidates = [candidate("BTCUSDT", RiskTier::Med)];
        assert!(allocator.allocate(dec!(0), dec!(0.2), &candidates).is_err());
        assert!(allocator.allocate(dec!(-1), dec!(0.2), &candidates).is_err());
        assert!(allocator.allocate(dec!(100), dec!(0), &candidates).is_err());
        assert!(allocator.allocate(dec!(100), dec!(1.5), &candidates).is_err());
        assert!(allocator.allocate(dec!(100), dec!(0.2), &[]).is_err());
    }

    #[test]
    fn test_weight_scales_allocation() {
        let allocator = DdAllocator::default();
        let result = allocator
            .allocate(
                dec!(100000),
                dec!(0.20),
                &[
                    SymbolCandidate::with_weight("AUSDT", RiskTier::Med, dec!(2)).unwrap(),
                    SymbolCandidate::with_weight("BUSDT", RiskTier::Med, dec!(1)).unwrap(),
                ],
            )
            .unwrap();
        assert!(result.allocations_usd["AUSDT"] > result.allocations_usd["BUSDT"]);
    }

    proptest! {
        #[test]
        fn prop_conservation_and_nonnegativity(
            equity_cents in 1_000i64..10_000_000,
            budget_bps in 1i64..10_000,
            n in 1usize..6,
        ) {
            let equity = Decimal::new(equity_cents, 2);
            let budget = Decimal::new(budget_bps, 4);
            let tiers = [RiskTier::Low, RiskTier::Med, RiskTier::High];
            let candidates: Vec<SymbolCandidate> = (0..n)
                .map(|i| candidate(&format!("SYM{i}USDT"), tiers[i % 3]))
                .collect();

            let allocator = DdAllocator::default();
            let result = allocator.allocate(equity, budget, &candidates).unwrap();

            let sum: Decimal = result.allocations_usd.values().copied().sum();
            prop_assert_eq!(sum + result.residual_usd, result.portfolio_budget_usd);
            for value in result.allocations_usd.values() {
                prop_assert!(*value >= Decimal::ZERO);
            }
        }

        #[test]
        fn prop_budget_monotonicity(
            budget_bps in 1i64..5_000,
            extra_bps in 0i64..5_000,
        ) {
            let equity = dec!(100000);
            let candidates = [
                candidate("AUSDT", RiskTier::High),
                candidate("BUSDT", RiskTier::Low),
            ];
            let allocator = DdAllocator::default();

            let small = allocator
                .allocate(equity, Decimal::new(budget_bps, 4), &candidates)
                .unwrap();
            let large = allocator
                .allocate(equity, Decimal::new(budget_bps + extra_bps, 4), &candidates)
                .unwrap();

            for (symbol, small_usd) in &small.allocations_usd {
                prop_assert!(large.allocations_usd[symbol] >= *small_usd);
            }
        }
    }
}
