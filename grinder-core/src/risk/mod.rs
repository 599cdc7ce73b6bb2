//! Risk controls: drawdown guard, consecutive-loss guard, budget
//! allocator, adaptive sizer

pub mod auto_sizer;
pub mod consecutive_loss;
pub mod dd_allocator;
pub mod drawdown;

pub use auto_sizer::{AutoSizer, AutoSizerConfig, GridShape, SizeSchedule, SizingMode};
pub use consecutive_loss::{
    load_state, save_state, write_trip_evidence, ConsecutiveLossConfig, ConsecutiveLossGuard,
    ConsecutiveLossService, ConsecutiveLossTrip, PersistedGuardState,
};
pub use dd_allocator::{
    AllocationResult, DdAllocator, DdAllocatorConfig, RiskTier, SymbolCandidate,
};
pub use drawdown::{
    classify_intent, DrawdownGuardConfig, DrawdownGuardV1, GuardState, RiskIntent,
};
