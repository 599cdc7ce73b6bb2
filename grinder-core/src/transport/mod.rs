//! Transport contracts
//!
//! The core never owns a socket: it consumes injectable WebSocket and
//! HTTP capabilities and a fake implementation for tests. Transports
//! classify raw failures into the `ExchangeError` taxonomy; nothing above
//! this layer sees a platform error.

pub mod fake;
pub mod user_data;

pub use fake::FakeWsTransport;
pub use user_data::{
    run_keepalive_loop, ListenKeyManagerProtocol, UserDataEvent,
};

use crate::core::errors::ExchangeError;
use serde_json::Value;

/// WebSocket capability: explicit lifecycle, pull-based reads.
pub trait WsTransport {
    fn connect(&mut self, url: &str) -> Result<(), ExchangeError>;

    /// Blocking read of the next text frame. Raises `Closed` after
    /// `close` (or when the peer is gone).
    fn recv(&mut self) -> Result<String, ExchangeError>;

    /// Idempotent; aborts any in-flight `recv`.
    fn close(&mut self);

    fn is_connected(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub json: Value,
}

/// HTTP capability. `op` is drawn from the nine-operation taxonomy and
/// is the only dimension exported as a metric label.
pub trait HttpClient {
    #[allow(clippy::too_many_arguments)]
    fn request(
        &mut self,
        method: &str,
        url: &str,
        params: &[(String, String)],
        headers: &[(String, String)],
        timeout_ms: i64,
        op: &str,
    ) -> Result<HttpResponse, ExchangeError>;
}

/// Classify an HTTP status into the error taxonomy. 2xx is success;
/// 429 and 5xx are transient; other 4xx never retry.
pub fn classify_http_status(status: u16, context: &str) -> Result<(), ExchangeError> {
    match status {
        200..=299 => Ok(()),
        429 => Err(ExchangeError::Transient(format!("{context}: rate limited"))),
        500..=599 => Err(ExchangeError::Transient(format!("{context}: HTTP {status}"))),
        _ => Err(ExchangeError::NonRetryable(format!(
            "{context}: HTTP {status}"
        ))),
    }
}
