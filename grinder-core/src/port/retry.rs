//! Retry policy: bounded exponential backoff
//!
//! Delays are deterministic (`base * multiplier^attempt`, capped); the
//! sleep function is injected so tests run in bounded time.

use crate::core::errors::{ConfigError, ExchangeError};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: i64,
    pub max_delay_ms: i64,
    pub backoff_multiplier: f64,
    pub retry_on_timeout: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
            retry_on_timeout: true,
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts < 1 {
            return Err(ConfigError("max_attempts must be >= 1".into()));
        }
        if self.base_delay_ms < 0 {
            return Err(ConfigError("base_delay_ms must be >= 0".into()));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(ConfigError("max_delay_ms must be >= base_delay_ms".into()));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(ConfigError("backoff_multiplier must be >= 1.0".into()));
        }
        Ok(())
    }

    /// Delay before the retry following `attempt` (0-indexed).
    pub fn compute_delay_ms(&self, attempt: u32) -> i64 {
        let raw = self.base_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        if raw >= self.max_delay_ms as f64 {
            self.max_delay_ms
        } else {
            raw as i64
        }
    }
}

/// Whether an error is worth retrying under this policy. Closed
/// connectors, circuit-open and idempotency rejections never retry.
pub fn is_retryable(error: &ExchangeError, policy: &RetryPolicy) -> bool {
    match error {
        ExchangeError::Transient(_) => true,
        ExchangeError::Timeout { .. } => policy.retry_on_timeout,
        ExchangeError::NonRetryable(_)
        | ExchangeError::Closed(_)
        | ExchangeError::CircuitOpen { .. }
        | ExchangeError::IdempotencyConflict { .. } => false,
    }
}

/// Run `op` under the policy, sleeping via `sleep_ms` between attempts.
/// Re-raises the last error after exhausting attempts.
pub fn retry_with_policy<T>(
    policy: &RetryPolicy,
    sleep_ms: &mut dyn FnMut(i64),
    op: &mut dyn FnMut(u32) -> Result<T, ExchangeError>,
) -> Result<T, ExchangeError> {
    let mut attempt = 0;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) => {
                let attempts_left = attempt + 1 < policy.max_attempts;
                if !attempts_left || !is_retryable(&err, policy) {
                    return Err(err);
                }
                sleep_ms(policy.compute_delay_ms(attempt));
                attempt += 1;
            }
        }
    }
}
