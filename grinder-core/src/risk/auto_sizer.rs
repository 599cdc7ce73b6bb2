//! Adaptive position sizer
//!
//! Sizes grid levels so the worst-case loss (full inventory against an
//! adverse move) never exceeds the drawdown budget:
//! `worst_case_loss <= dd_budget * equity`. Quantities round DOWN so
//! rounding can only reduce risk.

use crate::core::errors::SizingError;
use rust_decimal::{Decimal, RoundingStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizingMode {
    /// Equal quantity at every level.
    Flat,
    /// Larger quantities near the center, tapering outward.
    InversePyramid,
}

/// Shape of the grid being sized.
#[derive(Debug, Clone)]
pub struct GridShape {
    pub levels: u32,
    pub step_bps: u32,
    /// Only the innermost `top_k` levels receive size (0 = all levels).
    pub top_k: u32,
}

impl GridShape {
    pub fn new(levels: u32, step_bps: u32) -> Self {
        Self {
            levels,
            step_bps,
            top_k: 0,
        }
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = top_k;
        self
    }

    fn effective_levels(&self) -> u32 {
        if self.top_k == 0 {
            self.levels
        } else {
            self.top_k.min(self.levels)
        }
    }
}

/// Sized schedule with its realized risk numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct SizeSchedule {
    pub qty_per_level: Vec<Decimal>,
    pub total_notional: Decimal,
    pub worst_case_loss: Decimal,
    /// `worst_case_loss / (dd_budget * equity)`, always <= 1.
    pub risk_utilization: Decimal,
    pub effective_levels: u32,
}

#[derive(Debug, Clone)]
pub struct AutoSizerConfig {
    pub mode: SizingMode,
    pub quantity_precision: u32,
}

impl Default for AutoSizerConfig {
    fn default() -> Self {
        Self {
            mode: SizingMode::Flat,
            quantity_precision: 3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AutoSizer {
    config: AutoSizerConfig,
}

impl AutoSizer {
    pub fn new(config: AutoSizerConfig) -> Self {
        Self { config }
    }

    /// Compute a schedule for `grid` at `ref_price` within the risk
    /// budget `dd_budget * equity` against `adverse_move`.
    pub fn compute_schedule(
        &self,
        equity: Decimal,
        dd_budget: Decimal,
        adverse_move: Decimal,
        ref_price: Decimal,
        grid: &GridShape,
    ) -> Result<SizeSchedule, SizingError> {
        if equity <= Decimal::ZERO {
            return Err(SizingError(format!("equity must be > 0, got {equity}")));
        }
        if dd_budget <= Decimal::ZERO {
            return Err(SizingError(format!("dd_budget must be > 0, got {dd_budget}")));
        }
        if dd_budget > Decimal::ONE {
            return Err(SizingError(format!(
                "dd_budget must be <= 1.0, got {dd_budget}"
            )));
        }
        if adverse_move <= Decimal::ZERO {
            return Err(SizingError(format!(
                "adverse_move must be > 0, got {adverse_move}"
            )));
        }
        if ref_price <= Decimal::ZERO {
            return Err(SizingError(format!(
                "ref_price must be > 0, got {ref_price}"
            )));
        }
        if grid.levels == 0 {
            return Err(SizingError("levels must be >= 1".into()));
        }

        let budget_usd = equity * dd_budget;
        // Worst case: the whole inventory moves adverse_move against us.
        let max_total_notional = budget_usd / adverse_move;

        let effective = grid.effective_levels();
        let weights = self.level_weights(grid.levels, effective);
        let weight_sum: Decimal = weights.iter().copied().sum();

        let mut qty_per_level = Vec::with_capacity(grid.levels as usize);
        let mut total_notional = Decimal::ZERO;
        for weight in &weights {
            if weight.is_zero() {
                qty_per_level.push(Decimal::ZERO);
                continue;
            }
            let level_notional = max_total_notional * *weight / weight_sum;
            let qty = (level_notional / ref_price).round_dp_with_strategy(
                self.config.quantity_precision,
                RoundingStrategy::ToZero,
            );
            total_notional += qty * ref_price;
            qty_per_level.push(qty);
        }

        let worst_case_loss = total_notional * adverse_move;
        let risk_utilization = if budget_usd > Decimal::ZERO {
            worst_case_loss / budget_usd
        } else {
            Decimal::ZERO
        };

        Ok(SizeSchedule {
            qty_per_level,
            total_notional,
            worst_case_loss,
            risk_utilization,
            effective_levels: effective,
        })
    }

    fn level_weights(&self, levels: u32, effective: u32) -> Vec<Decimal> {
        (1..=levels)
            .map(|level| {
                if level > effective {
                    return Decimal::ZERO;
                }
                match self.config.mode {
                    SizingMode::Flat => Decimal::ONE,
                    // Innermost level heaviest: weight = effective - level + 1.
                    SizingMode::InversePyramid => Decimal::from(effective - level + 1),
                }
            })
            .collect()
    }
}
