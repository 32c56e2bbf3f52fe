use async_trait::async_trait;

use common::{Candle, Error, Result, Signal};
use tracing::info;

use crate::indicators::{average_candle_range, detect_spike, is_bearish_reversal};
use crate::{Strategy, Workflow};

/// Volatility-spike strategy for the price-polling workflow.
///
/// The candle evaluation buys when the latest candle's range blows out to 3x
/// the recent average on real volume, and sells on a bearish reversal. The
/// trading loop additionally reacts to raw 1-second price jumps; see the
/// price-polling worker.
pub struct SpikeStrategy {
    /// Candle window used for the average range.
    pub avg_period: usize,
    /// Minimum candle volume to confirm a spike.
    pub volume_threshold: f64,
}

impl SpikeStrategy {
    pub fn new(avg_period: usize, volume_threshold: f64) -> Self {
        Self {
            avg_period,
            volume_threshold,
        }
    }
}

#[async_trait]
impl Strategy for SpikeStrategy {
    fn name(&self) -> &str {
        "spike-detection"
    }

    fn workflow(&self) -> Workflow {
        Workflow::PricePolling
    }

    async fn evaluate(&self, candles: &[Candle], symbol: &str, _trend: bool) -> Result<Signal> {
        if candles.len() < self.avg_period + 1 {
            return Err(Error::Strategy(format!(
                "not enough candles for spike detection: need {}, got {}",
                self.avg_period + 1,
                candles.len()
            )));
        }

        let avg_range = average_candle_range(&candles[..candles.len() - 1], self.avg_period);
        if detect_spike(candles, avg_range, self.volume_threshold) {
            info!(pair = %symbol, "Spike detected");
            return Ok(Signal::Buy);
        }

        if is_bearish_reversal(candles) {
            info!(pair = %symbol, "Bearish reversal");
            return Ok(Signal::Sell);
        }

        Ok(Signal::Hold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candle(open: f64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
        Candle {
            open_time: Utc::now(),
            open,
            high,
            low,
            close,
            volume,
        }
    }

    #[tokio::test]
    async fn buys_on_range_spike_with_volume() {
        let s = SpikeStrategy::new(20, 5000.0);
        let mut candles = vec![candle(10.0, 10.2, 9.8, 10.1, 100.0); 20];
        candles.push(candle(10.0, 13.0, 9.9, 12.8, 8000.0));
        let signal = s.evaluate(&candles, "DOGEUSDT", false).await.unwrap();
        assert_eq!(signal, Signal::Buy);
    }

    #[tokio::test]
    async fn sells_on_bearish_reversal() {
        let s = SpikeStrategy::new(20, 5000.0);
        let mut candles = vec![candle(10.0, 10.2, 9.8, 10.1, 100.0); 20];
        candles.push(candle(10.1, 10.2, 9.5, 9.6, 100.0));
        let signal = s.evaluate(&candles, "DOGEUSDT", false).await.unwrap();
        assert_eq!(signal, Signal::Sell);
    }

    #[tokio::test]
    async fn quiet_market_holds() {
        let s = SpikeStrategy::new(20, 5000.0);
        let mut candles = vec![candle(10.0, 10.2, 9.8, 10.1, 100.0); 20];
        candles.push(candle(10.0, 10.2, 9.8, 10.1, 100.0));
        let signal = s.evaluate(&candles, "DOGEUSDT", false).await.unwrap();
        assert_eq!(signal, Signal::Hold);
    }

    #[tokio::test]
    async fn short_window_is_an_error() {
        let s = SpikeStrategy::new(20, 5000.0);
        let candles = vec![candle(10.0, 10.2, 9.8, 10.1, 100.0); 10];
        assert!(s.evaluate(&candles, "DOGEUSDT", false).await.is_err());
    }
}
