//! Grid policy implementations beyond the built-in static grid
//!
//! Policies here plug into the engine behind the same `GridPolicy`
//! trait the static grid uses.

pub mod smart_grid;

pub use smart_grid::{SmartGridConfig, SmartGridPolicy};
