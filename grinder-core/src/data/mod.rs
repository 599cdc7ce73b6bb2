//! Market data: snapshots, depth, fixture replay

pub mod fixture;
pub mod snapshot;

pub use fixture::{event_symbol, event_ts, load_fixture, parse_snapshot, FixtureError};
pub use snapshot::{BookLevel, L2Snapshot, Snapshot, SnapshotError};
