//! Drawdown guard with risk-intent classification
//!
//! Tracks the equity high-water mark. Past the drawdown threshold the
//! guard enters DRAWDOWN and blocks INCREASE_RISK actions; reducing and
//! cancelling stay allowed. Recovery requires regaining a configurable
//! fraction of the high-water mark.

use crate::execution::ExecutionAction;
use rust_decimal::Decimal;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskIntent {
    IncreaseRisk,
    ReduceRisk,
    Cancel,
}

impl RiskIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskIntent::IncreaseRisk => "INCREASE_RISK",
            RiskIntent::ReduceRisk => "REDUCE_RISK",
            RiskIntent::Cancel => "CANCEL",
        }
    }
}

/// Classify an action's effect on exposure. Placements and replacements
/// add or move exposure; cancels remove it; no-ops are harmless.
pub fn classify_intent(action: &ExecutionAction) -> RiskIntent {
    match action {
        ExecutionAction::Place { .. } | ExecutionAction::Replace { .. } => RiskIntent::IncreaseRisk,
        ExecutionAction::Cancel { .. } => RiskIntent::Cancel,
        ExecutionAction::Noop { .. } => RiskIntent::ReduceRisk,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Normal,
    Drawdown,
}

#[derive(Debug, Clone)]
pub struct DrawdownGuardConfig {
    /// Drawdown fraction (0.10 = 10%) that trips the guard.
    pub max_drawdown: Decimal,
    /// Fraction of the high-water mark equity must regain to recover.
    /// 1.0 means full recovery to the mark.
    pub recovery_fraction: Decimal,
}

impl Default for DrawdownGuardConfig {
    fn default() -> Self {
        Self {
            max_drawdown: Decimal::new(10, 2),       // 0.10
            recovery_fraction: Decimal::new(100, 2), // 1.00
        }
    }
}

#[derive(Debug)]
pub struct DrawdownGuardV1 {
    config: DrawdownGuardConfig,
    high_water_mark: Decimal,
    state: GuardState,
}

impl DrawdownGuardV1 {
    pub fn new(config: DrawdownGuardConfig) -> Self {
        Self {
            config,
            high_water_mark: Decimal::ZERO,
            state: GuardState::Normal,
        }
    }

    /// Feed the latest equity; returns the state after the update.
    pub fn update_equity(&mut self, equity: Decimal) -> GuardState {
        match self.state {
            GuardState::Normal => {
                if equity > self.high_water_mark {
                    self.high_water_mark = equity;
                }
                if self.current_drawdown(equity) > self.config.max_drawdown {
                    warn!(
                        equity = %equity,
                        hwm = %self.high_water_mark,
                        "drawdown guard tripped"
                    );
                    self.state = GuardState::Drawdown;
                }
            }
            GuardState::Drawdown => {
                // The mark is frozen while in drawdown.
                let recovery_level = self.high_water_mark * self.config.recovery_fraction;
                if equity >= recovery_level {
                    info!(equity = %equity, "drawdown guard recovered");
                    self.state = GuardState::Normal;
                    self.high_water_mark = equity.max(self.high_water_mark);
                }
            }
        }
        self.state
    }

    /// Drawdown fraction at the given equity.
    pub fn current_drawdown(&self, equity: Decimal) -> Decimal {
        if self.high_water_mark <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        ((self.high_water_mark - equity) / self.high_water_mark).max(Decimal::ZERO)
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    pub fn high_water_mark(&self) -> Decimal {
        self.high_water_mark
    }

    /// Whether an intent is allowed in the current state. Only
    /// INCREASE_RISK is ever blocked.
    pub fn allows(&self, intent: RiskIntent) -> bool {
        match self.state {
            GuardState::Normal => true,
            GuardState::Drawdown => intent != RiskIntent::IncreaseRisk,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn guard() -> DrawdownGuardV1 {
        DrawdownGuardV1::new(DrawdownGuardConfig::default())
    }

    #[test]
    fn test_tracks_high_water_mark() {
        let mut g = guard();
        g.update_equity(dec!(10000));
        g.update_equity(dec!(11000));
        g.update_equity(dec!(10500));
        assert_eq!(g.high_water_mark(), dec!(11000));
        assert_eq!(g.state(), GuardState::Normal);
    }

    #[test]
    fn test_trips_past_threshold() {
        let mut g = guard();
        g.update_equity(dec!(10000));
        // 11% drawdown.
        let state = g.update_equity(dec!(8900));
        assert_eq!(state, GuardState::Drawdown);
        assert!(!g.allows(RiskIntent::IncreaseRisk));
        assert!(g.allows(RiskIntent::ReduceRisk));
        assert!(g.allows(RiskIntent::Cancel));
    }

    #[test]
    fn test_recovers_at_high_water_mark() {
        let mut g = guard();
        g.update_equity(dec!(10000));
        g.update_equity(dec!(8900));
        assert_eq!(g.state(), GuardState::Drawdown);

        // Partway back: still in drawdown.
        g.update_equity(dec!(9500));
        assert_eq!(g.state(), GuardState::Drawdown);

        g.update_equity(dec!(10000));
        assert_eq!(g.state(), GuardState::Normal);
        assert!(g.allows(RiskIntent::IncreaseRisk));
    }

    #[test]
    fn test_hysteresis_fraction() {
        let mut g = DrawdownGuardV1::new(DrawdownGuardConfig {
            max_drawdown: dec!(0.10),
            recovery_fraction: dec!(0.95),
        });
        g.update_equity(dec!(10000));
        g.update_equity(dec!(8900));
        assert_eq!(g.state(), GuardState::Drawdown);

        // 95% of the mark is enough with 0.95 hysteresis.
        g.update_equity(dec!(9500));
        assert_eq!(g.state(), GuardState::Normal);
    }

    #[test]
    fn test_mark_frozen_in_drawdown() {
        let mut g = guard();
        g.update_equity(dec!(10000));
        g.update_equity(dec!(8000));
        g.update_equity(dec!(8500));
        assert_eq!(g.high_water_mark(), dec!(10000));
    }

    #[test]
    fn test_intent_classification() {
        let place = ExecutionAction::Place {
            symbol: "BTCUSDT".into(),
            side: crate::execution::Side::Buy,
            price: dec!(1),
            quantity: dec!(1),
            level_id: 1,
            order_id: "x".into(),
            reason: "r".into(),
        };
        let cancel = ExecutionAction::Cancel {
            symbol: "BTCUSDT".into(),
            order_id: "x".into(),
            reason: "r".into(),
        };
        let noop = ExecutionAction::Noop { reason: "r".into() };

        assert_eq!(classify_intent(&place), RiskIntent::IncreaseRisk);
        assert_eq!(classify_intent(&cancel), RiskIntent::Cancel);
        assert_eq!(classify_intent(&noop), RiskIntent::ReduceRisk);
    }
}
