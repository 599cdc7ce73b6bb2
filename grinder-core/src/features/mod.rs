//! Feature extraction, hard prefilter, Top-K selection

pub mod engine;
pub mod prefilter;
pub mod topk;

pub use engine::{Bar, FeatureEngine, FeatureEngineConfig, FeatureSnapshot, WARMUP_BARS_MIN};
pub use prefilter::{
    hard_filter, PrefilterConfig, PrefilterInput, PrefilterReason, PrefilterResult,
};
pub use topk::{
    ilog10, select_topk, SelectionCandidate, SymbolScore, TopKConfig, TopKResult, TopKSelector,
};
