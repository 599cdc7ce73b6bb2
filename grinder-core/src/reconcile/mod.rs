//! Reconciliation: expected vs observed state, classification, gated
//! remediation, data-quality gating

pub mod data_quality;
pub mod engine;
pub mod expected;
pub mod observed;
pub mod remediation;
pub mod snapshot_client;

pub use data_quality::{DataQualityConfig, DataQualityEngine, DataQualityVerdict};
pub use engine::{Mismatch, MismatchType, ReconcileEngine, ReconcileEngineConfig};
pub use expected::{ExpectedOrder, ExpectedStateStore};
pub use observed::{ObservedOrder, ObservedPosition, ObservedStateStore};
pub use remediation::{
    RemediationAction, RemediationBlockReason, RemediationConfig, RemediationExecutor,
    RemediationResult, RemediationStatus,
};
pub use snapshot_client::SnapshotClient;
