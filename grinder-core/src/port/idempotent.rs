//! Idempotent exchange port
//!
//! Wraps an `ExchangePort` with per-request idempotency, retry with
//! exponential backoff, and the per-operation circuit breaker. The
//! idempotency key is derived from the operation inputs *before* any
//! retry, so every retry of one logical request shares one key and the
//! effect at the exchange is at-most-once.

use crate::core::errors::ExchangeError;
use crate::port::breaker::CircuitBreaker;
use crate::port::retry::{is_retryable, RetryPolicy};
use crate::port::{
    CancelAck, ExchangePort, OrderAck, PlaceOrderRequest, ReplaceOrderRequest, OP_CANCEL_ORDER,
    OP_PLACE_ORDER,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub const OP_REPLACE_ORDER: &str = "replace_order";

/// Cached result of a completed write.
#[derive(Debug, Clone, PartialEq)]
pub enum PortResult {
    Place(OrderAck),
    Cancel(CancelAck),
    Replace(OrderAck),
}

#[derive(Debug, Clone)]
enum Entry {
    Inflight,
    Completed(PortResult),
}

/// In-memory idempotency store shared across retries and tasks.
#[derive(Clone, Default)]
pub struct IdempotencyStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl IdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check prior state for `key`. Returns the cached result when the
    /// key already completed, marks the key INFLIGHT and returns `None`
    /// when it is fresh, and fails when another call is in flight.
    pub fn check_or_mark(&self, key: &str) -> Result<Option<PortResult>, ExchangeError> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(Entry::Completed(result)) => Ok(Some(result.clone())),
            Some(Entry::Inflight) => Err(ExchangeError::IdempotencyConflict {
                key: key.to_string(),
            }),
            None => {
                entries.insert(key.to_string(), Entry::Inflight);
                Ok(None)
            }
        }
    }

    pub fn complete(&self, key: &str, result: PortResult) {
        self.entries
            .lock()
            .insert(key.to_string(), Entry::Completed(result));
    }

    /// Drop an INFLIGHT mark after a failed attempt so the same key can
    /// be retried. Completed entries are never cleared.
    pub fn clear_inflight(&self, key: &str) {
        let mut entries = self.entries.lock();
        if matches!(entries.get(key), Some(Entry::Inflight)) {
            entries.remove(key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Injectable sleep used between retry attempts.
pub type SleepFn = Box<dyn FnMut(i64) + Send>;

pub struct IdempotentExchangePort<P: ExchangePort> {
    inner: P,
    store: IdempotencyStore,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    sleep: SleepFn,
}

impl<P: ExchangePort> IdempotentExchangePort<P> {
    pub fn new(inner: P, breaker: CircuitBreaker, retry: RetryPolicy) -> Self {
        Self {
            inner,
            store: IdempotencyStore::new(),
            breaker,
            retry,
            sleep: Box::new(|ms| std::thread::sleep(std::time::Duration::from_millis(ms as u64))),
        }
    }

    /// Replace the inter-attempt sleep (tests pass a recorder).
    pub fn with_sleep(mut self, sleep: SleepFn) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn store(&self) -> &IdempotencyStore {
        &self.store
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut P {
        &mut self.inner
    }

    pub fn place_order(&mut self, req: &PlaceOrderRequest) -> Result<OrderAck, ExchangeError> {
        // The client order id is already deterministic, so it is the key.
        let key = format!("{OP_PLACE_ORDER}:{}", req.client_order_id);
        let result = self.execute(OP_PLACE_ORDER, &key, |inner| {
            inner.place_order(req).map(PortResult::Place)
        })?;
        match result {
            PortResult::Place(ack) => Ok(ack),
            other => unreachable!("place key returned {other:?}"),
        }
    }

    pub fn cancel_order(
        &mut self,
        symbol: &str,
        client_order_id: &str,
    ) -> Result<CancelAck, ExchangeError> {
        let key = format!("{OP_CANCEL_ORDER}:{client_order_id}");
        let result = self.execute(OP_CANCEL_ORDER, &key, |inner| {
            inner.cancel_order(symbol, client_order_id).map(PortResult::Cancel)
        })?;
        match result {
            PortResult::Cancel(ack) => Ok(ack),
            other => unreachable!("cancel key returned {other:?}"),
        }
    }

    pub fn replace_order(&mut self, req: &ReplaceOrderRequest) -> Result<OrderAck, ExchangeError> {
        // Replace touches both the old order and the new one.
        let key = format!(
            "{OP_REPLACE_ORDER}:{}:{}:{}",
            req.client_order_id, req.new_price, req.new_quantity
        );
        let result = self.execute(OP_REPLACE_ORDER, &key, |inner| {
            inner.replace_order(req).map(PortResult::Replace)
        })?;
        match result {
            PortResult::Replace(ack) => Ok(ack),
            other => unreachable!("replace key returned {other:?}"),
        }
    }

    /// The shared write path: idempotency check, breaker gate, call,
    /// retry on transient errors with the same key.
    fn execute(
        &mut self,
        op: &str,
        key: &str,
        mut call: impl FnMut(&mut P) -> Result<PortResult, ExchangeError>,
    ) -> Result<PortResult, ExchangeError> {
        let mut attempt = 0u32;
        loop {
            match self.store.check_or_mark(key)? {
                Some(cached) => {
                    debug!(op, key, "idempotency cache hit");
                    return Ok(cached);
                }
                None => {}
            }

            if !self.breaker.allow(op) {
                self.store.clear_inflight(key);
                return Err(ExchangeError::CircuitOpen { op: op.to_string() });
            }

            match call(&mut self.inner) {
                Ok(result) => {
                    self.breaker.record_success(op);
                    self.store.complete(key, result.clone());
                    return Ok(result);
                }
                Err(err) => {
                    self.breaker.record_failure(op, &err);
                    self.store.clear_inflight(key);
                    let attempts_left = attempt + 1 < self.retry.max_attempts;
                    if !attempts_left || !is_retryable(&err, &self.retry) {
                        return Err(err);
                    }
                    (self.sleep)(self.retry.compute_delay_ms(attempt));
                    attempt += 1;
                }
            }
        }
    }
}
