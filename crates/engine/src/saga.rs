use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use common::{Exchange, OrderSide, OrderStatus, Result};

/// How many times a compensating cancel is retried before the order id is
/// reported as orphaned for manual intervention.
const CANCEL_RETRIES: u32 = 3;

/// Outcome of a completed limit + stop-loss placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SagaOutcome {
    /// The limit order filled; the paired stop-loss was cancelled.
    Filled,
    /// The limit order did not fill; both orders were unwound.
    NotFilled,
}

/// Two-step entry placement with explicit compensation.
///
/// Places a limit order, pairs it with a stop-loss-limit order, then
/// monitors the limit order until it fills or a terminal state, the
/// monitoring deadline, or shutdown. Whatever is still open at the end is
/// cancelled; cancels are retried and, failing that, the orphaned order id
/// is logged for manual intervention.
pub struct OrderSaga {
    exchange: Arc<dyn Exchange>,
    /// Give up monitoring after this long and unwind.
    pub monitor_deadline: Duration,
    /// Delay between order-status polls.
    pub poll_interval: Duration,
    /// Delay between compensating-cancel retries.
    pub cancel_retry_delay: Duration,
}

impl OrderSaga {
    pub fn new(exchange: Arc<dyn Exchange>, monitor_deadline: Duration) -> Self {
        Self {
            exchange,
            monitor_deadline,
            poll_interval: Duration::from_secs(5),
            cancel_retry_delay: Duration::from_secs(1),
        }
    }

    /// Run the full placement. Returns `Err` only when the entry could not
    /// be established (the error is tick-local to the caller); compensation
    /// has already happened by then.
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        limit_price: f64,
        stop_price: f64,
        stop_limit_price: f64,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SagaOutcome> {
        let limit_id = self
            .exchange
            .place_limit_order(symbol, side, quantity, limit_price)
            .await?;
        info!(pair = %symbol, %side, order_id = limit_id, price = limit_price, "Limit order placed");

        let stop_id = match self
            .exchange
            .place_stop_loss_limit_order(symbol, side, quantity, stop_price, stop_limit_price)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!(pair = %symbol, error = %e, "Stop-loss placement failed — cancelling limit order");
                self.cancel_with_retry(symbol, limit_id).await;
                return Err(e);
            }
        };
        info!(pair = %symbol, order_id = stop_id, stop = stop_price, "Stop-loss order placed");

        match self.monitor(symbol, limit_id, shutdown).await {
            Ok(MonitorResult::Filled) => {
                self.cancel_with_retry(symbol, stop_id).await;
                Ok(SagaOutcome::Filled)
            }
            Ok(MonitorResult::Terminal(status)) => {
                info!(pair = %symbol, order_id = limit_id, ?status, "Limit order did not fill");
                self.cancel_with_retry(symbol, stop_id).await;
                Ok(SagaOutcome::NotFilled)
            }
            Ok(MonitorResult::GaveUp) => {
                info!(pair = %symbol, order_id = limit_id, "Monitoring ended — unwinding both orders");
                self.cancel_with_retry(symbol, limit_id).await;
                self.cancel_with_retry(symbol, stop_id).await;
                Ok(SagaOutcome::NotFilled)
            }
            Err(e) => {
                warn!(pair = %symbol, error = %e, "Order monitoring failed — cancelling stop-loss");
                self.cancel_with_retry(symbol, stop_id).await;
                Err(e)
            }
        }
    }

    /// Poll the order status every `poll_interval` until it is terminal, the
    /// deadline lapses, or shutdown is requested.
    async fn monitor(
        &self,
        symbol: &str,
        order_id: i64,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<MonitorResult> {
        let deadline = tokio::time::Instant::now() + self.monitor_deadline;

        loop {
            let status = self.exchange.order_status(symbol, order_id).await?;
            match status {
                OrderStatus::Filled => return Ok(MonitorResult::Filled),
                s if s.is_terminal() => return Ok(MonitorResult::Terminal(s)),
                _ => {}
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = tokio::time::sleep_until(deadline) => return Ok(MonitorResult::GaveUp),
                changed = shutdown.changed() => {
                    // A dropped sender means the controller is gone: unwind.
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(MonitorResult::GaveUp);
                    }
                }
            }
        }
    }

    /// Compensating cancel: retried a fixed number of times; a final failure
    /// names the orphaned order for manual intervention.
    async fn cancel_with_retry(&self, symbol: &str, order_id: i64) {
        for attempt in 1..=CANCEL_RETRIES {
            match self.exchange.cancel_order(symbol, order_id).await {
                Ok(()) => {
                    info!(pair = %symbol, order_id, "Order cancelled");
                    return;
                }
                Err(e) if attempt < CANCEL_RETRIES => {
                    warn!(pair = %symbol, order_id, attempt, error = %e, "Cancel failed — retrying");
                    tokio::time::sleep(self.cancel_retry_delay).await;
                }
                Err(e) => {
                    error!(
                        pair = %symbol,
                        order_id,
                        error = %e,
                        "Cancel failed after retries — order orphaned, manual intervention required"
                    );
                }
            }
        }
    }
}

enum MonitorResult {
    Filled,
    Terminal(OrderStatus),
    GaveUp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::{Candle, Error, PairMeta};
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex;

    /// Scriptable exchange stub recording order activity.
    #[derive(Default)]
    struct StubExchange {
        next_id: AtomicI64,
        fail_stop_loss: bool,
        /// Status sequence returned by successive `order_status` polls.
        statuses: Mutex<Vec<OrderStatus>>,
        cancelled: Mutex<Vec<i64>>,
        fail_cancels: AtomicI64,
    }

    impl StubExchange {
        fn with_statuses(statuses: Vec<OrderStatus>) -> Self {
            Self {
                statuses: Mutex::new(statuses),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl Exchange for StubExchange {
        async fn pair_metadata(&self, _: &str) -> common::Result<PairMeta> {
            unimplemented!()
        }
        async fn fetch_candles(&self, _: &str, _: &str, _: u32) -> common::Result<Vec<Candle>> {
            unimplemented!()
        }
        async fn balance(&self, _: &str) -> common::Result<f64> {
            Ok(0.0)
        }
        async fn current_price(&self, _: &str) -> common::Result<f64> {
            Ok(0.0)
        }
        async fn place_limit_order(
            &self,
            _: &str,
            _: OrderSide,
            _: f64,
            _: f64,
        ) -> common::Result<i64> {
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
        }
        async fn place_market_order(&self, _: &str, _: OrderSide, _: f64) -> common::Result<i64> {
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
        }
        async fn place_stop_loss_limit_order(
            &self,
            _: &str,
            _: OrderSide,
            _: f64,
            _: f64,
            _: f64,
        ) -> common::Result<i64> {
            if self.fail_stop_loss {
                return Err(Error::Exchange("stop rejected".into()));
            }
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
        }
        async fn order_status(&self, _: &str, _: i64) -> common::Result<OrderStatus> {
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.is_empty() {
                Ok(OrderStatus::New)
            } else {
                Ok(statuses.remove(0))
            }
        }
        async fn cancel_order(&self, _: &str, order_id: i64) -> common::Result<()> {
            if self.fail_cancels.load(Ordering::SeqCst) > 0 {
                self.fail_cancels.fetch_sub(1, Ordering::SeqCst);
                return Err(Error::Exchange("cancel rejected".into()));
            }
            self.cancelled.lock().unwrap().push(order_id);
            Ok(())
        }
        async fn fee_rate(&self) -> common::Result<f64> {
            Ok(0.001)
        }
    }

    fn fast_saga(exchange: Arc<StubExchange>) -> OrderSaga {
        let mut saga = OrderSaga::new(exchange, Duration::from_millis(200));
        saga.poll_interval = Duration::from_millis(5);
        saga.cancel_retry_delay = Duration::from_millis(1);
        saga
    }

    fn shutdown_pair() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    #[tokio::test]
    async fn fill_cancels_the_paired_stop() {
        let exchange = Arc::new(StubExchange::with_statuses(vec![OrderStatus::Filled]));
        let saga = fast_saga(exchange.clone());
        let (_tx, mut rx) = shutdown_pair();

        let outcome = saga
            .run("BTCUSDT", OrderSide::Buy, 1.0, 102.0, 98.0, 97.0, &mut rx)
            .await
            .unwrap();

        assert_eq!(outcome, SagaOutcome::Filled);
        // Order 1 = limit, order 2 = stop; only the stop is cancelled
        assert_eq!(*exchange.cancelled.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn stop_loss_failure_cancels_the_limit_order() {
        let exchange = Arc::new(StubExchange {
            fail_stop_loss: true,
            ..Default::default()
        });
        let saga = fast_saga(exchange.clone());
        let (_tx, mut rx) = shutdown_pair();

        let result = saga
            .run("BTCUSDT", OrderSide::Buy, 1.0, 102.0, 98.0, 97.0, &mut rx)
            .await;

        assert!(result.is_err());
        assert_eq!(*exchange.cancelled.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn cancelled_limit_order_unwinds_the_stop() {
        let exchange = Arc::new(StubExchange::with_statuses(vec![
            OrderStatus::New,
            OrderStatus::Canceled,
        ]));
        let saga = fast_saga(exchange.clone());
        let (_tx, mut rx) = shutdown_pair();

        let outcome = saga
            .run("BTCUSDT", OrderSide::Sell, 1.0, 98.0, 102.0, 101.0, &mut rx)
            .await
            .unwrap();

        assert_eq!(outcome, SagaOutcome::NotFilled);
        assert_eq!(*exchange.cancelled.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn deadline_unwinds_both_orders() {
        // Status never leaves New; the 200ms deadline fires first
        let exchange = Arc::new(StubExchange::default());
        let saga = fast_saga(exchange.clone());
        let (_tx, mut rx) = shutdown_pair();

        let outcome = saga
            .run("BTCUSDT", OrderSide::Buy, 1.0, 102.0, 98.0, 97.0, &mut rx)
            .await
            .unwrap();

        assert_eq!(outcome, SagaOutcome::NotFilled);
        assert_eq!(*exchange.cancelled.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn shutdown_interrupts_monitoring() {
        let exchange = Arc::new(StubExchange::default());
        let mut saga = fast_saga(exchange.clone());
        saga.monitor_deadline = Duration::from_secs(60);
        let (tx, mut rx) = shutdown_pair();

        let handle = tokio::spawn(async move {
            saga.run("BTCUSDT", OrderSide::Buy, 1.0, 102.0, 98.0, 97.0, &mut rx)
                .await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome, SagaOutcome::NotFilled);
        assert_eq!(*exchange.cancelled.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn cancel_is_retried_after_transient_failure() {
        let exchange = Arc::new(StubExchange::with_statuses(vec![OrderStatus::Filled]));
        exchange.fail_cancels.store(1, Ordering::SeqCst);
        let saga = fast_saga(exchange.clone());
        let (_tx, mut rx) = shutdown_pair();

        let outcome = saga
            .run("BTCUSDT", OrderSide::Buy, 1.0, 102.0, 98.0, 97.0, &mut rx)
            .await
            .unwrap();

        assert_eq!(outcome, SagaOutcome::Filled);
        // First cancel attempt failed, the retry landed
        assert_eq!(*exchange.cancelled.lock().unwrap(), vec![2]);
    }
}
