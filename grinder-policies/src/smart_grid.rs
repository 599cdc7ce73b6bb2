//! Regime-aware adaptive grid policy
//!
//! Classifies the market regime from bar features and adapts the grid:
//! ranging markets quote the full grid, trending markets skew away from
//! the drift and trim the far side, volatile markets widen spacing and
//! cut levels, and toxic/unwarmed conditions pause outright.

use grinder_core::policy::{
    GridMode, GridPlan, GridPolicy, PolicyContext, Regime, ResetAction,
};
use rust_decimal::Decimal;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SmartGridConfig {
    pub base_spacing_bps: u32,
    pub levels: u32,
    pub size_per_level: Decimal,
    /// NATR above this marks the regime volatile.
    pub volatile_natr_bps: i64,
    /// |net return| above this marks the regime trending.
    pub trend_net_return_bps: i64,
    /// Spacing multiplier (percent) applied in volatile regimes.
    pub volatile_spacing_pct: u32,
    /// Skew magnitude applied against the trend, in bps.
    pub trend_skew_bps: i64,
    /// Spread beyond this pauses quoting entirely.
    pub max_spread_bps: i64,
}

impl Default for SmartGridConfig {
    fn default() -> Self {
        Self {
            base_spacing_bps: 10,
            levels: 5,
            size_per_level: Decimal::from(100),
            volatile_natr_bps: 30,
            trend_net_return_bps: 40,
            volatile_spacing_pct: 200,
            trend_skew_bps: 5,
            max_spread_bps: 40,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmartGridPolicy {
    config: SmartGridConfig,
}

impl SmartGridPolicy {
    pub fn new(config: SmartGridConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(SmartGridConfig::default())
    }

    fn classify(&self, ctx: &PolicyContext) -> Regime {
        if !ctx.is_warmed_up {
            return Regime::Unknown;
        }
        if ctx.natr_bps > self.config.volatile_natr_bps {
            return Regime::Volatile;
        }
        if ctx.net_return_bps.abs() > self.config.trend_net_return_bps {
            return Regime::Trend;
        }
        Regime::Range
    }
}

impl GridPolicy for SmartGridPolicy {
    fn name(&self) -> &str {
        "smart"
    }

    fn evaluate(&self, ctx: &PolicyContext) -> GridPlan {
        if ctx.spread_bps > self.config.max_spread_bps {
            let mut plan = GridPlan::pause(ctx.mid_price, "SPREAD_TOO_WIDE");
            plan.regime = Regime::Volatile;
            return plan;
        }

        let regime = self.classify(ctx);
        debug!(regime = regime.as_str(), "smart grid regime");

        match regime {
            Regime::Unknown => {
                let mut plan = GridPlan::pause(ctx.mid_price, "WARMUP_INSUFFICIENT");
                plan.regime = Regime::Unknown;
                plan
            }
            Regime::Range => GridPlan {
                mode: GridMode::Bilateral,
                center_price: ctx.mid_price,
                spacing_bps: self.config.base_spacing_bps,
                levels_up: self.config.levels,
                levels_down: self.config.levels,
                size_schedule: vec![self.config.size_per_level; self.config.levels as usize],
                skew_bps: 0,
                regime,
                width_bps: i64::from(self.config.base_spacing_bps)
                    * i64::from(self.config.levels),
                reset_action: ResetAction::None,
                reason_codes: Vec::new(),
            },
            Regime::Trend => {
                // Quote both sides but lean away from the drift and thin
                // the far side one level.
                let skew = if ctx.net_return_bps > 0 {
                    -self.config.trend_skew_bps
                } else {
                    self.config.trend_skew_bps
                };
                let levels = self.config.levels.saturating_sub(1).max(1);
                GridPlan {
                    mode: GridMode::Bilateral,
                    center_price: ctx.mid_price,
                    spacing_bps: self.config.base_spacing_bps,
                    levels_up: levels,
                    levels_down: levels,
                    size_schedule: vec![self.config.size_per_level; levels as usize],
                    skew_bps: skew,
                    regime,
                    width_bps: i64::from(self.config.base_spacing_bps) * i64::from(levels),
                    reset_action: ResetAction::Recenter,
                    reason_codes: vec!["TREND_SKEW".to_string()],
                }
            }
            Regime::Volatile => {
                let spacing = self.config.base_spacing_bps
                    * self.config.volatile_spacing_pct
                    / 100;
                let levels = (self.config.levels / 2).max(1);
                GridPlan {
                    mode: GridMode::Bilateral,
                    center_price: ctx.mid_price,
                    spacing_bps: spacing,
                    levels_up: levels,
                    levels_down: levels,
                    size_schedule: vec![self.config.size_per_level; levels as usize],
                    skew_bps: 0,
                    regime,
                    width_bps: i64::from(spacing) * i64::from(levels),
                    reset_action: ResetAction::Recenter,
                    reason_codes: vec!["VOLATILE_WIDEN".to_string()],
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ctx() -> PolicyContext {
        PolicyContext {
            mid_price: dec!(50000),
            spread_bps: 2,
            natr_bps: 10,
            range_score: 100,
            net_return_bps: 5,
            is_warmed_up: true,
        }
    }

    #[test]
    fn test_range_regime_quotes_full_grid() {
        let plan = SmartGridPolicy::with_defaults().evaluate(&ctx());
        assert_eq!(plan.regime, Regime::Range);
        assert_eq!(plan.mode, GridMode::Bilateral);
        assert_eq!(plan.levels_up, 5);
        assert_eq!(plan.spacing_bps, 10);
        assert_eq!(plan.skew_bps, 0);
    }

    #[test]
    fn test_uptrend_skews_down() {
        let mut c = ctx();
        c.net_return_bps = 80;
        let plan = SmartGridPolicy::with_defaults().evaluate(&c);
        assert_eq!(plan.regime, Regime::Trend);
        assert!(plan.skew_bps < 0);
        assert_eq!(plan.levels_up, 4);
        assert_eq!(plan.reset_action, ResetAction::Recenter);
    }

    #[test]
    fn test_downtrend_skews_up() {
        let mut c = ctx();
        c.net_return_bps = -80;
        let plan = SmartGridPolicy::with_defaults().evaluate(&c);
        assert!(plan.skew_bps > 0);
    }

    #[test]
    fn test_volatile_widens_and_trims() {
        let mut c = ctx();
        c.natr_bps = 50;
        let plan = SmartGridPolicy::with_defaults().evaluate(&c);
        assert_eq!(plan.regime, Regime::Volatile);
        assert_eq!(plan.spacing_bps, 20);
        assert_eq!(plan.levels_up, 2);
    }

    #[test]
    fn test_wide_spread_pauses() {
        let mut c = ctx();
        c.spread_bps = 60;
        let plan = SmartGridPolicy::with_defaults().evaluate(&c);
        assert_eq!(plan.mode, GridMode::Pause);
        assert_eq!(plan.reason_codes, vec!["SPREAD_TOO_WIDE".to_string()]);
    }

    #[test]
    fn test_unwarmed_pauses() {
        let mut c = ctx();
        c.is_warmed_up = false;
        let plan = SmartGridPolicy::with_defaults().evaluate(&c);
        assert_eq!(plan.mode, GridMode::Pause);
        assert_eq!(plan.regime, Regime::Unknown);
    }

    #[test]
    fn test_volatile_takes_priority_over_trend() {
        let mut c = ctx();
        c.natr_bps = 50;
        c.net_return_bps = 100;
        let plan = SmartGridPolicy::with_defaults().evaluate(&c);
        assert_eq!(plan.regime, Regime::Volatile);
    }
}
