//! Grid policy: the desired shape of quotes around a center price
//!
//! A policy turns the current feature view into a `GridPlan`. The static
//! grid here is the baseline; adaptive policies plug in behind the same
//! trait (see the policies crate).

pub mod static_grid;

pub use static_grid::StaticGridPolicy;

use crate::core::digest::dec_value;
use rust_decimal::Decimal;
use serde_json::{json, Value};

/// Which sides of the grid are live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridMode {
    Bilateral,
    BuyOnly,
    SellOnly,
    Pause,
}

impl GridMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GridMode::Bilateral => "BILATERAL",
            GridMode::BuyOnly => "BUY_ONLY",
            GridMode::SellOnly => "SELL_ONLY",
            GridMode::Pause => "PAUSE",
        }
    }
}

/// Market regime attached to a plan for observability and policy logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    Range,
    Trend,
    Volatile,
    Unknown,
}

impl Regime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::Range => "RANGE",
            Regime::Trend => "TREND",
            Regime::Volatile => "VOLATILE",
            Regime::Unknown => "UNKNOWN",
        }
    }
}

/// What the execution engine should do with existing orders when the plan
/// shape changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetAction {
    None,
    Recenter,
    CancelAll,
}

impl ResetAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResetAction::None => "NONE",
            ResetAction::Recenter => "RECENTER",
            ResetAction::CancelAll => "CANCEL_ALL",
        }
    }
}

/// Desired grid: symmetric levels around a center price.
///
/// The size schedule has one entry per level indexed from the center
/// outward; a zero entry means "do not place this level".
#[derive(Debug, Clone, PartialEq)]
pub struct GridPlan {
    pub mode: GridMode,
    pub center_price: Decimal,
    pub spacing_bps: u32,
    pub levels_up: u32,
    pub levels_down: u32,
    pub size_schedule: Vec<Decimal>,
    pub skew_bps: i64,
    pub regime: Regime,
    pub width_bps: i64,
    pub reset_action: ResetAction,
    pub reason_codes: Vec<String>,
}

impl GridPlan {
    /// Inert plan used when the policy wants no orders.
    pub fn pause(center_price: Decimal, reason: impl Into<String>) -> Self {
        Self {
            mode: GridMode::Pause,
            center_price,
            spacing_bps: 0,
            levels_up: 0,
            levels_down: 0,
            size_schedule: Vec::new(),
            skew_bps: 0,
            regime: Regime::Unknown,
            width_bps: 0,
            reset_action: ResetAction::None,
            reason_codes: vec![reason.into()],
        }
    }

    pub fn to_value(&self) -> Value {
        json!({
            "mode": self.mode.as_str(),
            "center_price": dec_value(&self.center_price),
            "spacing_bps": self.spacing_bps,
            "levels_up": self.levels_up,
            "levels_down": self.levels_down,
            "size_schedule": self.size_schedule.iter().map(dec_value).collect::<Vec<_>>(),
            "skew_bps": self.skew_bps,
            "regime": self.regime.as_str(),
            "width_bps": self.width_bps,
            "reset_action": self.reset_action.as_str(),
            "reason_codes": self.reason_codes,
        })
    }
}

/// Feature view handed to policies. The static grid only needs the mid;
/// adaptive policies read the bar-derived fields.
#[derive(Debug, Clone, Default)]
pub struct PolicyContext {
    pub mid_price: Decimal,
    pub spread_bps: i64,
    pub natr_bps: i64,
    pub range_score: i64,
    pub net_return_bps: i64,
    pub is_warmed_up: bool,
}

impl PolicyContext {
    pub fn from_mid(mid_price: Decimal) -> Self {
        Self {
            mid_price,
            ..Default::default()
        }
    }
}

pub trait GridPolicy {
    /// Policy name used in the strategy token of client order ids.
    fn name(&self) -> &str;

    fn evaluate(&self, ctx: &PolicyContext) -> GridPlan;
}
