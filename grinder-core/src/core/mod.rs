//! Core primitives: time, ids, digests, error taxonomy

pub mod digest;
pub mod errors;
pub mod ids;
pub mod time;

pub use errors::{AllocationError, ArtifactError, ConfigError, ExchangeError, SizingError};
pub use ids::{OrderIdGenerator, OrderIdPolicy, DEFAULT_ID_PREFIX, DEFAULT_ID_SEPARATOR};
pub use time::{Clock, FakeClock, SharedClock, SystemClock, TsMs};
