use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use common::{Candle, Error, Result, Signal, TradeStore};
use risk::ExitPolicy;

use crate::indicators::{MacdIndicator, RsiIndicator};
use crate::{Strategy, Workflow};

/// RSI + MACD compound strategy for the candle-polling workflow.
///
/// Fresh entries need both indicators to agree. Once a position is open for
/// the symbol, the exit policy drives the decision instead of the entry
/// logic, except that a fresh strong-buy agreement still adds to the
/// position.
pub struct CompoundStrategy {
    rsi: RsiIndicator,
    macd: MacdIndicator,
    exit: ExitPolicy,
    store: Arc<dyn TradeStore>,
}

impl CompoundStrategy {
    pub fn new(
        rsi: RsiIndicator,
        macd: MacdIndicator,
        exit: ExitPolicy,
        store: Arc<dyn TradeStore>,
    ) -> Self {
        Self {
            rsi,
            macd,
            exit,
            store,
        }
    }

    /// Agreement of the two raw indicator signals.
    fn entry_signal(&self, rsi_signal: Signal, macd_signal: Signal) -> Signal {
        match (rsi_signal, macd_signal) {
            (Signal::Buy, Signal::Buy) => Signal::Buy,
            (Signal::Sell, Signal::Sell) => Signal::Sell,
            _ => Signal::Hold,
        }
    }
}

#[async_trait]
impl Strategy for CompoundStrategy {
    fn name(&self) -> &str {
        "rsi-macd"
    }

    fn workflow(&self) -> Workflow {
        Workflow::CandlePolling
    }

    async fn evaluate(&self, candles: &[Candle], symbol: &str, trend: bool) -> Result<Signal> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let current_price = *closes
            .last()
            .ok_or_else(|| Error::Strategy("empty candle window".into()))?;

        let (rsi_value, rsi_signal) = self.rsi.signal(&closes)?;
        let (macd_out, macd_signal) = self.macd.signal(&closes)?;

        let entry = self.entry_signal(rsi_signal, macd_signal);
        if entry == Signal::Buy {
            info!(
                pair = %symbol,
                rsi = rsi_value,
                macd = macd_out.macd_line,
                trend,
                "Strong buy"
            );
            return Ok(Signal::Buy);
        }

        // With an open position the exit rules decide, not the entry logic.
        if let Some(open) = self.store.active_trade(symbol).await? {
            let decision = self
                .exit
                .evaluate(symbol, open.buy_price, current_price)
                .await;
            debug!(
                pair = %symbol,
                buy_price = open.buy_price,
                price = current_price,
                ?decision,
                "Exit evaluation"
            );
            return Ok(if decision.is_sell() {
                Signal::Sell
            } else {
                Signal::Hold
            });
        }

        if entry == Signal::Sell {
            info!(
                pair = %symbol,
                rsi = rsi_value,
                macd = macd_out.macd_line,
                trend,
                "Strong sell"
            );
        }
        Ok(entry)
    }

    async fn on_position_closed(&self, symbol: &str) {
        self.exit.clear(symbol).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use common::ActiveTrade;
    use std::sync::Mutex;

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .map(|&close| Candle {
                open_time: Utc::now(),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
            })
            .collect()
    }

    /// In-memory store stub: holds a fixed set of open lots.
    struct StubStore {
        lots: Mutex<Vec<ActiveTrade>>,
    }

    impl StubStore {
        fn empty() -> Arc<Self> {
            Arc::new(Self {
                lots: Mutex::new(Vec::new()),
            })
        }

        fn with_lot(symbol: &str, buy_price: f64) -> Arc<Self> {
            Arc::new(Self {
                lots: Mutex::new(vec![ActiveTrade {
                    id: 1,
                    symbol: symbol.to_string(),
                    buy_price,
                    quantity: 1.0,
                    created_at: Utc::now(),
                }]),
            })
        }
    }

    #[async_trait]
    impl TradeStore for StubStore {
        async fn log_active_trade(&self, symbol: &str, buy_price: f64, quantity: f64) -> Result<i64> {
            let mut lots = self.lots.lock().unwrap();
            let id = lots.len() as i64 + 1;
            lots.push(ActiveTrade {
                id,
                symbol: symbol.to_string(),
                buy_price,
                quantity,
                created_at: Utc::now(),
            });
            Ok(id)
        }

        async fn active_trade(&self, symbol: &str) -> Result<Option<ActiveTrade>> {
            Ok(self
                .lots
                .lock()
                .unwrap()
                .iter()
                .find(|t| t.symbol == symbol)
                .cloned())
        }

        async fn active_trades(&self, symbol: &str) -> Result<Vec<ActiveTrade>> {
            Ok(self
                .lots
                .lock()
                .unwrap()
                .iter()
                .filter(|t| t.symbol == symbol)
                .cloned()
                .collect())
        }

        async fn all_active_trades(&self) -> Result<Vec<ActiveTrade>> {
            Ok(self.lots.lock().unwrap().clone())
        }

        async fn remove_active_trade(&self, id: i64) -> Result<()> {
            self.lots.lock().unwrap().retain(|t| t.id != id);
            Ok(())
        }

        async fn log_completed_trade(
            &self,
            _symbol: &str,
            _buy_price: f64,
            _sell_price: f64,
            _quantity: f64,
            _profit_loss: f64,
        ) -> Result<()> {
            Ok(())
        }

        async fn total_realized_pnl(&self) -> Result<f64> {
            Ok(0.0)
        }
    }

    fn strategy(store: Arc<StubStore>) -> CompoundStrategy {
        CompoundStrategy::new(
            RsiIndicator::new(14, 70.0, 30.0),
            MacdIndicator::new(3, 6, 3),
            ExitPolicy::new(0.001, 5.0, Some(2.0)),
            store,
        )
    }

    #[tokio::test]
    async fn agreement_required_for_entry() {
        let s = strategy(StubStore::empty());
        // Flat prices: both indicators hold
        let candles = candles_from_closes(&vec![100.0; 60]);
        let signal = s.evaluate(&candles, "BTCUSDT", false).await.unwrap();
        assert_eq!(signal, Signal::Hold);
    }

    #[tokio::test]
    async fn disagreement_holds() {
        let s = strategy(StubStore::empty());
        // A steady rise puts RSI overbought (sell) while MACD trends up
        // (buy): the indicators disagree, so no entry.
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let signal = s
            .evaluate(&candles_from_closes(&closes), "BTCUSDT", true)
            .await
            .unwrap();
        assert_eq!(signal, Signal::Hold);
    }

    #[tokio::test]
    async fn open_position_defers_to_exit_policy() {
        let s = strategy(StubStore::with_lot("BTCUSDT", 100.0));
        // Flat closes at 101: above breakeven, below desired profit -> hold
        let signal = s
            .evaluate(&candles_from_closes(&vec![101.0; 60]), "BTCUSDT", false)
            .await
            .unwrap();
        assert_eq!(signal, Signal::Hold);

        // Flat closes at 110: 10% profit clears the 5% threshold -> sell
        let signal = s
            .evaluate(&candles_from_closes(&vec![110.0; 60]), "BTCUSDT", false)
            .await
            .unwrap();
        assert_eq!(signal, Signal::Sell);
    }

    #[tokio::test]
    async fn position_close_clears_exit_state() {
        let s = strategy(StubStore::with_lot("BTCUSDT", 100.0));
        let _ = s
            .evaluate(&candles_from_closes(&vec![104.0; 60]), "BTCUSDT", false)
            .await
            .unwrap();
        s.on_position_closed("BTCUSDT").await;
        assert_eq!(s.exit.high_water_mark("BTCUSDT").await, None);
    }
}
