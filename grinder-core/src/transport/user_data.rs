//! User-data stream events and listenKey keepalive
//!
//! Parses futures user-data frames (order trade updates, account
//! position updates, listenKey expiry) into normalized events the
//! observed-state store can apply. The keepalive loop runs as its own
//! task and exits cleanly when the stop flag is raised.

use crate::core::errors::ExchangeError;
use crate::core::time::TsMs;
use crate::execution::Side;
use crate::reconcile::observed::{ObservedOrder, ObservedPosition};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Normalized user-data stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum UserDataEvent {
    OrderUpdate(ObservedOrder),
    PositionUpdate(ObservedPosition),
    ListenKeyExpired,
    /// Recognized JSON we do not consume.
    Ignored(String),
}

/// Parse one raw text frame. Unknown event types are reported as
/// `Ignored` with the event tag; malformed JSON is an error.
pub fn parse_user_data_event(text: &str) -> Result<UserDataEvent, ExchangeError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| ExchangeError::NonRetryable(format!("bad user-data frame: {e}")))?;
    let event_type = value.get("e").and_then(Value::as_str).unwrap_or("");
    let event_ts = value.get("E").and_then(Value::as_i64).unwrap_or(0);

    match event_type {
        "ORDER_TRADE_UPDATE" => {
            let order = value
                .get("o")
                .ok_or_else(|| ExchangeError::NonRetryable("missing order payload".into()))?;
            Ok(UserDataEvent::OrderUpdate(parse_order(order, event_ts)?))
        }
        "ACCOUNT_UPDATE" => {
            // Single-position normalization: emit the first position in
            // the payload; multi-position frames arrive one per symbol
            // from the venue normalizer.
            let positions = value
                .get("a")
                .and_then(|a| a.get("P"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            match positions.first() {
                Some(p) => Ok(UserDataEvent::PositionUpdate(parse_position(p, event_ts)?)),
                None => Ok(UserDataEvent::Ignored("ACCOUNT_UPDATE".into())),
            }
        }
        "listenKeyExpired" => Ok(UserDataEvent::ListenKeyExpired),
        other => {
            debug!(event = other, "ignoring user-data event");
            Ok(UserDataEvent::Ignored(other.to_string()))
        }
    }
}

fn field_str<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("")
}

fn field_decimal(value: &Value, key: &str) -> Result<Decimal, ExchangeError> {
    let raw = field_str(value, key);
    Decimal::from_str(raw)
        .map_err(|_| ExchangeError::NonRetryable(format!("bad decimal field {key}: {raw:?}")))
}

fn parse_order(order: &Value, ts: TsMs) -> Result<ObservedOrder, ExchangeError> {
    let side = match field_str(order, "S") {
        "BUY" => Side::Buy,
        "SELL" => Side::Sell,
        other => {
            return Err(ExchangeError::NonRetryable(format!(
                "unknown order side {other:?}"
            )))
        }
    };
    Ok(ObservedOrder {
        client_order_id: field_str(order, "c").to_string(),
        symbol: field_str(order, "s").to_string(),
        side,
        price: field_decimal(order, "p")?,
        orig_qty: field_decimal(order, "q")?,
        executed_qty: field_decimal(order, "z")?,
        status: field_str(order, "X").to_string(),
        ts_observed: ts,
    })
}

fn parse_position(position: &Value, ts: TsMs) -> Result<ObservedPosition, ExchangeError> {
    Ok(ObservedPosition {
        symbol: field_str(position, "s").to_string(),
        position_amt: field_decimal(position, "pa")?,
        entry_price: field_decimal(position, "ep")?,
        ts_observed: ts,
    })
}

/// listenKey lifecycle capability.
pub trait ListenKeyManagerProtocol {
    fn create(&mut self) -> Result<String, ExchangeError>;
    fn keepalive(&mut self, listen_key: &str) -> Result<(), ExchangeError>;
    fn close(&mut self, listen_key: &str) -> Result<(), ExchangeError>;
}

/// Drive keepalives until `stop` is raised. The sleep is injected so
/// tests run in bounded time; keepalive failures are logged and the loop
/// continues (the stream reconnect path handles a dead key).
pub fn run_keepalive_loop<M: ListenKeyManagerProtocol>(
    manager: &mut M,
    listen_key: &str,
    interval_ms: i64,
    stop: &Arc<AtomicBool>,
    sleep_ms: &mut dyn FnMut(i64),
) -> u64 {
    let mut keepalives_sent = 0;
    loop {
        sleep_ms(interval_ms);
        if stop.load(Ordering::SeqCst) {
            debug!("keepalive loop stopping");
            return keepalives_sent;
        }
        match manager.keepalive(listen_key) {
            Ok(()) => {
                keepalives_sent += 1;
                debug!(keepalives_sent, "listenKey keepalive ok");
            }
            Err(ExchangeError::Closed(reason)) => {
                warn!(%reason, "keepalive loop: connector closed");
                return keepalives_sent;
            }
            Err(err) => warn!(%err, "listenKey keepalive failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const ORDER_FRAME: &str = r#"{
        "e": "ORDER_TRADE_UPDATE",
        "E": 1700000000000,
        "o": {
            "s": "BTCUSDT",
            "c": "grinder_static_BTCUSDT_B1_1_0",
            "S": "BUY",
            "p": "49900.00",
            "q": "0.100",
            "z": "0.000",
            "X": "NEW"
        }
    }"#;

    #[test]
    fn test_parse_order_update() {
        let event = parse_user_data_event(ORDER_FRAME).unwrap();
        let UserDataEvent::OrderUpdate(order) = event else {
            panic!("expected order update");
        };
        assert_eq!(order.symbol, "BTCUSDT");
        assert_eq!(order.side, Side::Buy);
        assert_eq!(order.price, dec!(49900.00));
        assert_eq!(order.status, "NEW");
        assert_eq!(order.ts_observed, 1_700_000_000_000);
    }

    #[test]
    fn test_parse_account_update() {
        let frame = r#"{
            "e": "ACCOUNT_UPDATE",
            "E": 1700000000001,
            "a": {"P": [{"s": "ETHUSDT", "pa": "-1.5", "ep": "2000.00"}]}
        }"#;
        let event = parse_user_data_event(frame).unwrap();
        let UserDataEvent::PositionUpdate(position) = event else {
            panic!("expected position update");
        };
        assert_eq!(position.symbol, "ETHUSDT");
        assert_eq!(position.position_amt, dec!(-1.5));
    }

    #[test]
    fn test_listen_key_expired() {
        let event =
            parse_user_data_event(r#"{"e":"listenKeyExpired","E":1}"#).unwrap();
        assert_eq!(event, UserDataEvent::ListenKeyExpired);
    }

    #[test]
    fn test_unknown_event_ignored() {
        let event = parse_user_data_event(r#"{"e":"MARGIN_CALL","E":1}"#).unwrap();
        assert_eq!(event, UserDataEvent::Ignored("MARGIN_CALL".into()));
    }

    #[test]
    fn test_malformed_frame_rejected() {
        assert!(parse_user_data_event("not json").is_err());
        assert!(parse_user_data_event(r#"{"e":"ORDER_TRADE_UPDATE"}"#).is_err());
    }

    struct ScriptedManager {
        keepalive_results: std::collections::VecDeque<Result<(), ExchangeError>>,
        calls: u32,
    }

    impl ListenKeyManagerProtocol for ScriptedManager {
        fn create(&mut self) -> Result<String, ExchangeError> {
            Ok("lk".into())
        }
        fn keepalive(&mut self, _listen_key: &str) -> Result<(), ExchangeError> {
            self.calls += 1;
            self.keepalive_results.pop_front().unwrap_or(Ok(()))
        }
        fn close(&mut self, _listen_key: &str) -> Result<(), ExchangeError> {
            Ok(())
        }
    }

    #[test]
    fn test_keepalive_loop_stops_on_flag() {
        let mut manager = ScriptedManager {
            keepalive_results: Default::default(),
            calls: 0,
        };
        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_sleep = stop.clone();
        let mut ticks = 0;
        let sent = run_keepalive_loop(
            &mut manager,
            "lk",
            30_000,
            &stop,
            &mut move |_| {
                ticks += 1;
                if ticks >= 3 {
                    stop_for_sleep.store(true, Ordering::SeqCst);
                }
            },
        );
        assert_eq!(sent, 2);
        assert_eq!(manager.calls, 2);
    }

    #[test]
    fn test_keepalive_loop_exits_on_closed_connector() {
        let mut manager = ScriptedManager {
            keepalive_results: [
                Ok(()),
                Err(ExchangeError::Closed("shutdown".into())),
            ]
            .into_iter()
            .collect(),
            calls: 0,
        };
        let stop = Arc::new(AtomicBool::new(false));
        let sent = run_keepalive_loop(&mut manager, "lk", 1, &stop, &mut |_| {});
        assert_eq!(sent, 1);
        assert_eq!(manager.calls, 2);
    }

    #[test]
    fn test_keepalive_failures_logged_and_continue() {
        let mut manager = ScriptedManager {
            keepalive_results: [Err(ExchangeError::Transient("503".into())), Ok(())]
                .into_iter()
                .collect(),
            calls: 0,
        };
        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_sleep = stop.clone();
        let mut ticks = 0;
        let sent = run_keepalive_loop(
            &mut manager,
            "lk",
            1,
            &stop,
            &mut move |_| {
                ticks += 1;
                if ticks >= 3 {
                    stop_for_sleep.store(true, Ordering::SeqCst);
                }
            },
        );
        // First attempt failed transiently, second succeeded.
        assert_eq!(sent, 1);
        assert_eq!(manager.calls, 2);
    }
}
