//! Exchange port: the write/read surface the engine drives
//!
//! `ExchangePort` is the injectable capability; production wires a venue
//! implementation behind the idempotent wrapper, tests wire the mock.

pub mod breaker;
pub mod idempotent;
pub mod retry;

pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use idempotent::{IdempotencyStore, IdempotentExchangePort, PortResult};
pub use retry::{is_retryable, retry_with_policy, RetryPolicy};

use crate::core::errors::ExchangeError;
use crate::execution::Side;
use crate::reconcile::observed::{ObservedOrder, ObservedPosition};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Operation keys, the only values allowed as an `op=` metric label.
pub const OP_PLACE_ORDER: &str = "place_order";
pub const OP_CANCEL_ORDER: &str = "cancel_order";
pub const OP_CANCEL_ALL: &str = "cancel_all";
pub const OP_GET_OPEN_ORDERS: &str = "get_open_orders";
pub const OP_GET_POSITIONS: &str = "get_positions";
pub const OP_GET_ACCOUNT: &str = "get_account";
pub const OP_EXCHANGE_INFO: &str = "exchange_info";
pub const OP_PING_TIME: &str = "ping_time";
pub const OP_GET_USER_TRADES: &str = "get_user_trades";

/// The closed operation taxonomy.
pub const OP_TAXONOMY: [&str; 9] = [
    OP_PLACE_ORDER,
    OP_CANCEL_ORDER,
    OP_CANCEL_ALL,
    OP_GET_OPEN_ORDERS,
    OP_GET_POSITIONS,
    OP_GET_ACCOUNT,
    OP_EXCHANGE_INFO,
    OP_PING_TIME,
    OP_GET_USER_TRADES,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    pub symbol: String,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub client_order_id: String,
}

/// Replace carries the original side so the replacement never has to
/// guess it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplaceOrderRequest {
    pub symbol: String,
    pub client_order_id: String,
    pub side: Side,
    pub new_price: Decimal,
    pub new_quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelAck {
    pub client_order_id: String,
}

/// Injectable exchange capability. Implementations classify raw venue
/// errors into the `ExchangeError` taxonomy; callers never see transport
/// details.
pub trait ExchangePort {
    fn place_order(&mut self, req: &PlaceOrderRequest) -> Result<OrderAck, ExchangeError>;

    fn cancel_order(
        &mut self,
        symbol: &str,
        client_order_id: &str,
    ) -> Result<CancelAck, ExchangeError>;

    fn replace_order(&mut self, req: &ReplaceOrderRequest) -> Result<OrderAck, ExchangeError>;

    fn get_open_orders(&mut self, symbol: Option<&str>)
        -> Result<Vec<ObservedOrder>, ExchangeError>;

    fn get_positions(&mut self) -> Result<Vec<ObservedPosition>, ExchangeError>;

    /// Market-flatten a position; the remediation path. Ports that
    /// cannot flatten refuse with a non-retryable error.
    fn flatten_position(
        &mut self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
    ) -> Result<OrderAck, ExchangeError> {
        let _ = (symbol, side, quantity);
        Err(ExchangeError::NonRetryable(
            "flatten not supported by this port".into(),
        ))
    }

    /// Whether the venue supports in-place amendment (the smart order
    /// router consults this).
    fn supports_amend(&self) -> bool {
        false
    }
}

/// Port that acknowledges everything and records the calls. The paper
/// engine's sink, and a convenient test double.
#[derive(Debug, Default)]
pub struct NoOpExchangePort {
    pub placed: Vec<PlaceOrderRequest>,
    pub cancelled: Vec<String>,
    pub replaced: Vec<ReplaceOrderRequest>,
}

impl NoOpExchangePort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.placed.clear();
        self.cancelled.clear();
        self.replaced.clear();
    }
}

impl ExchangePort for NoOpExchangePort {
    fn place_order(&mut self, req: &PlaceOrderRequest) -> Result<OrderAck, ExchangeError> {
        self.placed.push(req.clone());
        Ok(OrderAck {
            client_order_id: req.client_order_id.clone(),
            exchange_order_id: None,
        })
    }

    fn cancel_order(
        &mut self,
        _symbol: &str,
        client_order_id: &str,
    ) -> Result<CancelAck, ExchangeError> {
        self.cancelled.push(client_order_id.to_string());
        Ok(CancelAck {
            client_order_id: client_order_id.to_string(),
        })
    }

    fn replace_order(&mut self, req: &ReplaceOrderRequest) -> Result<OrderAck, ExchangeError> {
        self.replaced.push(req.clone());
        Ok(OrderAck {
            client_order_id: req.client_order_id.clone(),
            exchange_order_id: None,
        })
    }

    fn get_open_orders(
        &mut self,
        _symbol: Option<&str>,
    ) -> Result<Vec<ObservedOrder>, ExchangeError> {
        Ok(Vec::new())
    }

    fn get_positions(&mut self) -> Result<Vec<ObservedPosition>, ExchangeError> {
        Ok(Vec::new())
    }
}

/// Scripted port for retry/idempotency/breaker tests: queue errors per
/// operation, count underlying calls.
#[derive(Debug, Default)]
pub struct MockExchangePort {
    pub place_errors: VecDeque<ExchangeError>,
    pub cancel_errors: VecDeque<ExchangeError>,
    pub replace_errors: VecDeque<ExchangeError>,
    pub flatten_errors: VecDeque<ExchangeError>,
    pub place_calls: usize,
    pub cancel_calls: usize,
    pub replace_calls: usize,
    pub flatten_calls: usize,
    pub open_orders: Vec<ObservedOrder>,
    pub positions: Vec<ObservedPosition>,
}

impl MockExchangePort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_place_with(&mut self, errors: impl IntoIterator<Item = ExchangeError>) {
        self.place_errors.extend(errors);
    }
}

impl ExchangePort for MockExchangePort {
    fn place_order(&mut self, req: &PlaceOrderRequest) -> Result<OrderAck, ExchangeError> {
        self.place_calls += 1;
        if let Some(err) = self.place_errors.pop_front() {
            return Err(err);
        }
        Ok(OrderAck {
            client_order_id: req.client_order_id.clone(),
            exchange_order_id: Some(format!("x-{}", self.place_calls)),
        })
    }

    fn cancel_order(
        &mut self,
        _symbol: &str,
        client_order_id: &str,
    ) -> Result<CancelAck, ExchangeError> {
        self.cancel_calls += 1;
        if let Some(err) = self.cancel_errors.pop_front() {
            return Err(err);
        }
        Ok(CancelAck {
            client_order_id: client_order_id.to_string(),
        })
    }

    fn replace_order(&mut self, req: &ReplaceOrderRequest) -> Result<OrderAck, ExchangeError> {
        self.replace_calls += 1;
        if let Some(err) = self.replace_errors.pop_front() {
            return Err(err);
        }
        Ok(OrderAck {
            client_order_id: req.client_order_id.clone(),
            exchange_order_id: Some(format!("x-{}", self.replace_calls)),
        })
    }

    fn get_open_orders(
        &mut self,
        symbol: Option<&str>,
    ) -> Result<Vec<ObservedOrder>, ExchangeError> {
        Ok(self
            .open_orders
            .iter()
            .filter(|o| symbol.is_none() || symbol == Some(o.symbol.as_str()))
            .cloned()
            .collect())
    }

    fn get_positions(&mut self) -> Result<Vec<ObservedPosition>, ExchangeError> {
        Ok(self.positions.clone())
    }

    fn flatten_position(
        &mut self,
        symbol: &str,
        _side: Side,
        _quantity: Decimal,
    ) -> Result<OrderAck, ExchangeError> {
        self.flatten_calls += 1;
        if let Some(err) = self.flatten_errors.pop_front() {
            return Err(err);
        }
        Ok(OrderAck {
            client_order_id: format!("flatten-{symbol}-{}", self.flatten_calls),
            exchange_order_id: None,
        })
    }
}
