//! Error taxonomy for exchange I/O and pure validation
//!
//! Transports classify raw failures into `ExchangeError`; everything above
//! the transport layer matches on this taxonomy and never inspects platform
//! errors. The retry policy consults `ExchangeError::is_transient` /
//! `is_timeout`; the circuit breaker consults its own trip predicate.

use thiserror::Error;

/// Classified failure from an exchange port or transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    /// Retryable I/O failure: 5xx, rate limit, connection reset.
    #[error("transient exchange error: {0}")]
    Transient(String),

    /// Operation exceeded its deadline. Retryable only when the retry
    /// policy enables `retry_on_timeout`.
    #[error("timeout after {timeout_ms}ms: {context}")]
    Timeout { context: String, timeout_ms: i64 },

    /// 4xx, auth failure, invalid argument, policy violation. Never retried.
    #[error("non-retryable exchange error: {0}")]
    NonRetryable(String),

    /// Transport or connector was shut down. Never retried.
    #[error("connector closed: {0}")]
    Closed(String),

    /// Circuit breaker refused the call before it reached the port.
    #[error("circuit open for operation {op}")]
    CircuitOpen { op: String },

    /// Another in-flight call holds the same idempotency key.
    #[error("idempotency conflict for key {key}")]
    IdempotencyConflict { key: String },
}

impl ExchangeError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ExchangeError::Transient(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ExchangeError::Timeout { .. })
    }

    /// Errors that should count against the circuit breaker's failure
    /// threshold. Circuit-open and idempotency rejections are produced by
    /// the wrapper itself and must not feed back into the breaker.
    pub fn trips_breaker(&self) -> bool {
        matches!(
            self,
            ExchangeError::Transient(_) | ExchangeError::Timeout { .. }
        )
    }
}

/// Invalid configuration detected in a constructor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid configuration: {0}")]
pub struct ConfigError(pub String);

/// Invalid input to the adaptive position sizer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("sizing error: {0}")]
pub struct SizingError(pub String);

/// Invalid input to the drawdown-budget allocator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("allocation error: {0}")]
pub struct AllocationError(pub String);

/// Failure writing or verifying a persisted artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sha256 mismatch for {path}: expected {expected}, got {actual}")]
    ShaMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("malformed artifact {path}: {reason}")]
    Malformed { path: String, reason: String },
}
