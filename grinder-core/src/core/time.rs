//! Millisecond timestamps and injectable clocks
//!
//! Every timestamp in the engine is a `TsMs`: signed milliseconds since the
//! Unix epoch. Components that need "now" (circuit breaker, rate limiter,
//! remediation cooldown, keepalive loop) take a `Clock` so tests can advance
//! time without sleeping.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub type TsMs = i64;

/// Source of wall-clock time in milliseconds.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> TsMs;
}

/// Production clock backed by `SystemTime`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> TsMs {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as TsMs)
            .unwrap_or(0)
    }
}

/// Manually advanced clock for tests.
///
/// Cloning shares the underlying time source, so a component holding a
/// clone observes `advance_ms` calls made by the test.
#[derive(Clone, Default)]
pub struct FakeClock {
    now: Arc<Mutex<TsMs>>,
}

impl FakeClock {
    pub fn new(start_ms: TsMs) -> Self {
        Self {
            now: Arc::new(Mutex::new(start_ms)),
        }
    }

    /// Move time forward. Negative deltas are rejected; time never rewinds.
    pub fn advance_ms(&self, delta_ms: TsMs) {
        debug_assert!(delta_ms >= 0, "FakeClock never rewinds");
        let mut now = self.now.lock();
        *now += delta_ms.max(0);
    }

    pub fn set_ms(&self, ts: TsMs) {
        *self.now.lock() = ts;
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> TsMs {
        *self.now.lock()
    }
}

/// Shared handle to a clock implementation.
pub type SharedClock = Arc<dyn Clock>;
