//! Metrics registry and label taxonomy guard

pub mod metrics;

pub use metrics::{assert_label_names_allowed, MetricsRegistry, FORBIDDEN_LABEL_NAMES};
