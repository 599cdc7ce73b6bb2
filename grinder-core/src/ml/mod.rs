//! ML: fill-probability model, dataset, evaluation, online gate

pub mod dataset;
pub mod eval;
pub mod gate;
pub mod model;
pub mod threshold;

pub use dataset::{build_fill_dataset, load_fill_dataset, COLUMNS, DATASET_SCHEMA_VERSION};
pub use eval::{evaluate_fill_model, write_eval_report, CalibrationBin, EvalReport, SweepEntry};
pub use gate::{
    extract_online_features, resolve_enforcement, FillProbGate, FillProbGateConfig, GateDecision,
    GateVerdict, DEFAULT_THRESHOLD_BPS,
};
pub use model::{
    extract_features, BucketThresholds, FillModelFeatures, FillModelV0, DEFAULT_PRIOR_BPS,
    MODEL_SCHEMA_VERSION,
};
pub use threshold::{resolve_threshold, ThresholdResolution};
