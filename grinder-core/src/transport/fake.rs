//! Fake WebSocket transport for tests
//!
//! Yields pre-canned messages and can inject connect or read failures.
//! After the queue drains it reports the connection closed.

use super::WsTransport;
use crate::core::errors::ExchangeError;
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct FakeWsTransport {
    messages: VecDeque<String>,
    connect_failures: u32,
    read_failures: u32,
    connected: bool,
    pub connect_calls: u32,
    pub recv_calls: u32,
}

impl FakeWsTransport {
    pub fn new(messages: impl IntoIterator<Item = String>) -> Self {
        Self {
            messages: messages.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Fail the next `n` connect attempts with a transient error.
    pub fn with_connect_failures(mut self, n: u32) -> Self {
        self.connect_failures = n;
        self
    }

    /// Fail the next `n` reads with a transient error.
    pub fn with_read_failures(mut self, n: u32) -> Self {
        self.read_failures = n;
        self
    }

    pub fn push_message(&mut self, message: impl Into<String>) {
        self.messages.push_back(message.into());
    }
}

impl WsTransport for FakeWsTransport {
    fn connect(&mut self, url: &str) -> Result<(), ExchangeError> {
        self.connect_calls += 1;
        if self.connect_failures > 0 {
            self.connect_failures -= 1;
            return Err(ExchangeError::Transient(format!(
                "injected connect failure for {url}"
            )));
        }
        self.connected = true;
        Ok(())
    }

    fn recv(&mut self) -> Result<String, ExchangeError> {
        self.recv_calls += 1;
        if !self.connected {
            return Err(ExchangeError::Closed("not connected".into()));
        }
        if self.read_failures > 0 {
            self.read_failures -= 1;
            return Err(ExchangeError::Transient("injected read failure".into()));
        }
        match self.messages.pop_front() {
            Some(message) => Ok(message),
            None => {
                self.connected = false;
                Err(ExchangeError::Closed("message queue drained".into()))
            }
        }
    }

    fn close(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
