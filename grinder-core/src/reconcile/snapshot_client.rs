//! Snapshot client: periodic REST refresh of observed state

use crate::core::errors::ExchangeError;
use crate::core::time::SharedClock;
use crate::port::ExchangePort;
use crate::reconcile::observed::ObservedStateStore;
use tracing::debug;

/// Pulls open orders and positions through the port and replaces the
/// observed view. Retries and timeouts are the wrapped port's business.
pub struct SnapshotClient<P: ExchangePort> {
    port: P,
    clock: SharedClock,
}

impl<P: ExchangePort> SnapshotClient<P> {
    pub fn new(port: P, clock: SharedClock) -> Self {
        Self { port, clock }
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Refresh `observed` from the exchange. On error the previous view
    /// is left untouched (better stale than half-replaced).
    pub fn refresh(&mut self, observed: &mut ObservedStateStore) -> Result<(), ExchangeError> {
        let orders = self.port.get_open_orders(None)?;
        let positions = self.port.get_positions()?;
        let now = self.clock.now_ms();
        debug!(
            orders = orders.len(),
            positions = positions.len(),
            "observed snapshot refresh"
        );
        observed.apply_snapshot(orders, positions, now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::FakeClock;
    use crate::execution::Side;
    use crate::port::MockExchangePort;
    use crate::reconcile::observed::{ObservedOrder, ObservedPosition};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn observed_order(id: &str) -> ObservedOrder {
        ObservedOrder {
            client_order_id: id.into(),
            symbol: "BTCUSDT".into(),
            side: Side::Buy,
            price: dec!(50000),
            orig_qty: dec!(0.1),
            executed_qty: dec!(0),
            status: "NEW".into(),
            ts_observed: 0,
        }
    }

    #[test]
    fn test_refresh_replaces_view_and_stamps_time() {
        let mut mock = MockExchangePort::new();
        mock.open_orders.push(observed_order("a"));
        mock.positions.push(ObservedPosition {
            symbol: "ETHUSDT".into(),
            position_amt: dec!(1),
            entry_price: dec!(2000),
            ts_observed: 0,
        });
        let clock = FakeClock::new(5_000);
        let mut client = SnapshotClient::new(mock, Arc::new(clock));

        let mut observed = ObservedStateStore::new();
        client.refresh(&mut observed).unwrap();

        assert!(observed.order("a").is_some());
        assert!(observed.position("ETHUSDT").is_some());
        assert_eq!(observed.last_refresh_ms(), 5_000);
    }

    #[test]
    fn test_refresh_error_leaves_view_untouched() {
        let mut mock = MockExchangePort::new();
        mock.open_orders.push(observed_order("a"));
        let mut client = SnapshotClient::new(mock, Arc::new(FakeClock::new(5_000)));

        let mut observed = ObservedStateStore::new();
        client.refresh(&mut observed).unwrap();

        // Wrapper whose get_positions fails: a refresh through it must
        // not clobber the existing view.
        struct FailingReads<P>(P, bool);
        impl<P: ExchangePort> ExchangePort for FailingReads<P> {
            fn place_order(
                &mut self,
                req: &crate::port::PlaceOrderRequest,
            ) -> Result<crate::port::OrderAck, ExchangeError> {
                self.0.place_order(req)
            }
            fn cancel_order(
                &mut self,
                symbol: &str,
                id: &str,
            ) -> Result<crate::port::CancelAck, ExchangeError> {
                self.0.cancel_order(symbol, id)
            }
            fn replace_order(
                &mut self,
                req: &crate::port::ReplaceOrderRequest,
            ) -> Result<crate::port::OrderAck, ExchangeError> {
                self.0.replace_order(req)
            }
            fn get_open_orders(
                &mut self,
                symbol: Option<&str>,
            ) -> Result<Vec<ObservedOrder>, ExchangeError> {
                self.0.get_open_orders(symbol)
            }
            fn get_positions(&mut self) -> Result<Vec<ObservedPosition>, ExchangeError> {
                if self.1 {
                    return Err(ExchangeError::Timeout {
                        context: "get_positions".into(),
                        timeout_ms: 1_000,
                    });
                }
                self.0.get_positions()
            }
        }

        let mut failing = SnapshotClient::new(
            FailingReads(MockExchangePort::new(), true),
            Arc::new(FakeClock::new(9_000)),
        );
        let err = failing.refresh(&mut observed).unwrap_err();
        assert!(err.is_timeout());
        // Old view intact.
        assert!(observed.order("a").is_some());
        assert_eq!(observed.last_refresh_ms(), 5_000);
    }
}
