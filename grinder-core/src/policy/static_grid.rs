//! Static symmetric grid policy

use super::{GridMode, GridPlan, GridPolicy, PolicyContext, Regime, ResetAction};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct StaticGridConfig {
    pub spacing_bps: u32,
    /// Levels on each side of the center.
    pub levels: u32,
    pub size_per_level: Decimal,
}

impl Default for StaticGridConfig {
    fn default() -> Self {
        Self {
            spacing_bps: 10,
            levels: 5,
            size_per_level: Decimal::from(100),
        }
    }
}

/// Uniform grid centered on the mid: `levels` on each side, identical size
/// per level, fixed spacing.
#[derive(Debug, Clone)]
pub struct StaticGridPolicy {
    config: StaticGridConfig,
}

impl StaticGridPolicy {
    pub fn new(config: StaticGridConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(StaticGridConfig::default())
    }
}

impl GridPolicy for StaticGridPolicy {
    fn name(&self) -> &str {
        "static"
    }

    fn evaluate(&self, ctx: &PolicyContext) -> GridPlan {
        let levels = self.config.levels;
        GridPlan {
            mode: GridMode::Bilateral,
            center_price: ctx.mid_price,
            spacing_bps: self.config.spacing_bps,
            levels_up: levels,
            levels_down: levels,
            size_schedule: vec![self.config.size_per_level; levels as usize],
            skew_bps: 0,
            regime: Regime::Unknown,
            width_bps: i64::from(self.config.spacing_bps) * i64::from(levels),
            reset_action: ResetAction::None,
            reason_codes: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_uniform_schedule() {
        let policy = StaticGridPolicy::with_defaults();
        let plan = policy.evaluate(&PolicyContext::from_mid(dec!(50000)));

        assert_eq!(plan.mode, GridMode::Bilateral);
        assert_eq!(plan.center_price, dec!(50000));
        assert_eq!(plan.levels_up, 5);
        assert_eq!(plan.levels_down, 5);
        assert_eq!(plan.size_schedule.len(), 5);
        assert!(plan.size_schedule.iter().all(|s| *s == dec!(100)));
    }

    #[test]
    fn test_same_input_same_plan() {
        let policy = StaticGridPolicy::with_defaults();
        let ctx = PolicyContext::from_mid(dec!(123.45));
        assert_eq!(policy.evaluate(&ctx), policy.evaluate(&ctx));
    }
}
