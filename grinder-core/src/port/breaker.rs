//! Per-operation circuit breaker
//!
//! Three-state machine (CLOSED -> OPEN -> HALF_OPEN) keyed by operation
//! name, so a failing `place_order` never blocks `cancel_order`. Time
//! comes from an injectable clock; tests advance it without sleeping.
//!
//! ```text
//!     CLOSED ──fail(threshold)──▶ OPEN ──interval elapsed──▶ HALF_OPEN
//!        ▲                                                      │
//!        │                success(success_threshold)            │
//!        └──────────────────────────────────────────────────────┘
//!                                │
//!                              fail
//!                                ▼
//!                              OPEN
//! ```

use crate::core::errors::ExchangeError;
use crate::core::time::{SharedClock, TsMs};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Time spent OPEN before probing.
    pub open_interval_ms: i64,
    /// Successes in HALF_OPEN required to close.
    pub success_threshold: u32,
    /// Probe calls allowed while HALF_OPEN.
    pub half_open_probe_count: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_interval_ms: 30_000,
            success_threshold: 2,
            half_open_probe_count: 3,
        }
    }
}

#[derive(Debug, Default)]
struct OpState {
    state: OpStateKind,
    consecutive_failures: u32,
    opened_at_ms: TsMs,
    half_open_successes: u32,
    half_open_probes_used: u32,
    rejected_calls: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum OpStateKind {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

type TripPredicate = Arc<dyn Fn(&ExchangeError) -> bool + Send + Sync>;

/// Breaker registry shared by the idempotent port and the live engine.
#[derive(Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    clock: SharedClock,
    ops: Arc<Mutex<HashMap<String, OpState>>>,
    trip_on: TripPredicate,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig, clock: SharedClock) -> Self {
        Self {
            config,
            clock,
            ops: Arc::new(Mutex::new(HashMap::new())),
            trip_on: Arc::new(ExchangeError::trips_breaker),
        }
    }

    /// Override which errors count as breaker failures.
    pub fn with_trip_predicate(
        mut self,
        predicate: impl Fn(&ExchangeError) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.trip_on = Arc::new(predicate);
        self
    }

    /// Whether a call for `op` may proceed. OPEN (and exhausted
    /// HALF_OPEN) reject and count the rejection.
    pub fn allow(&self, op: &str) -> bool {
        let now = self.clock.now_ms();
        let mut ops = self.ops.lock();
        let entry = ops.entry(op.to_string()).or_default();
        Self::poll(entry, now, &self.config, op);

        match entry.state {
            OpStateKind::Closed => true,
            OpStateKind::Open => {
                entry.rejected_calls += 1;
                false
            }
            OpStateKind::HalfOpen => {
                if entry.half_open_probes_used < self.config.half_open_probe_count {
                    entry.half_open_probes_used += 1;
                    true
                } else {
                    entry.rejected_calls += 1;
                    false
                }
            }
        }
    }

    pub fn record_success(&self, op: &str) {
        let now = self.clock.now_ms();
        let mut ops = self.ops.lock();
        let entry = ops.entry(op.to_string()).or_default();
        Self::poll(entry, now, &self.config, op);

        match entry.state {
            OpStateKind::Closed => {
                entry.consecutive_failures = 0;
            }
            OpStateKind::HalfOpen => {
                entry.half_open_successes += 1;
                if entry.half_open_successes >= self.config.success_threshold {
                    debug!(op, "circuit HALF_OPEN -> CLOSED");
                    *entry = OpState::default();
                }
            }
            OpStateKind::Open => {}
        }
    }

    /// Record a failure for `op`. Errors rejected by the trip predicate
    /// (non-retryable, circuit-open, idempotency conflicts) are ignored.
    pub fn record_failure(&self, op: &str, error: &ExchangeError) {
        if !(self.trip_on)(error) {
            return;
        }
        let now = self.clock.now_ms();
        let mut ops = self.ops.lock();
        let entry = ops.entry(op.to_string()).or_default();
        Self::poll(entry, now, &self.config, op);

        match entry.state {
            OpStateKind::Closed => {
                entry.consecutive_failures += 1;
                if entry.consecutive_failures >= self.config.failure_threshold {
                    warn!(op, failures = entry.consecutive_failures, "circuit CLOSED -> OPEN");
                    entry.state = OpStateKind::Open;
                    entry.opened_at_ms = now;
                }
            }
            OpStateKind::HalfOpen => {
                warn!(op, "circuit HALF_OPEN -> OPEN (probe failed)");
                entry.state = OpStateKind::Open;
                entry.opened_at_ms = now;
                entry.half_open_successes = 0;
                entry.half_open_probes_used = 0;
            }
            OpStateKind::Open => {}
        }
    }

    pub fn state(&self, op: &str) -> CircuitState {
        let now = self.clock.now_ms();
        let mut ops = self.ops.lock();
        let entry = ops.entry(op.to_string()).or_default();
        Self::poll(entry, now, &self.config, op);
        match entry.state {
            OpStateKind::Closed => CircuitState::Closed,
            OpStateKind::Open => CircuitState::Open,
            OpStateKind::HalfOpen => CircuitState::HalfOpen,
        }
    }

    pub fn rejected_calls(&self, op: &str) -> u64 {
        self.ops
            .lock()
            .get(op)
            .map(|e| e.rejected_calls)
            .unwrap_or(0)
    }

    /// Apply the time-based OPEN -> HALF_OPEN transition.
    fn poll(entry: &mut OpState, now: TsMs, config: &CircuitBreakerConfig, op: &str) {
        if entry.state == OpStateKind::Open && now - entry.opened_at_ms >= config.open_interval_ms {
            debug!(op, "circuit OPEN -> HALF_OPEN (interval elapsed)");
            entry.state = OpStateKind::HalfOpen;
            entry.half_open_successes = 0;
            entry.half_open_probes_used = 0;
        }
    }
}
