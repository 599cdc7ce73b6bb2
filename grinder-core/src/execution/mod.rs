//! Order execution: data model, exchange filters, plan reconciler

pub mod engine;
pub mod filters;
pub mod types;

pub use engine::{
    EvalResult, ExecutionEngine, ExecutionEngineConfig, REASON_GRID_LEVEL, REASON_LEVEL_ZEROED,
    REASON_PLAN_PAUSE, REASON_PLAN_UNCHANGED, SKIP_MIN_NOTIONAL, SKIP_MIN_QTY,
};
pub use filters::ExchangeFilters;
pub use types::{
    level_token, ExecutionAction, ExecutionEvent, ExecutionState, Fill, OrderRecord, OrderState,
    Side,
};
