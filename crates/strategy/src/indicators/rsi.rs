use common::{Error, Result, Signal};

/// RSI (Relative Strength Index) indicator.
///
/// Uses Wilder's smoothed moving average (same as TradingView / standard RSI).
/// Needs at least `period + 1` close prices for one value.
#[derive(Debug, Clone)]
pub struct RsiIndicator {
    pub period: usize,
    pub overbought: f64,
    pub oversold: f64,
}

impl RsiIndicator {
    pub fn new(period: usize, overbought: f64, oversold: f64) -> Self {
        assert!(period >= 2, "RSI period must be >= 2");
        Self {
            period,
            overbought,
            oversold,
        }
    }

    /// Latest RSI value over a slice of close prices (oldest first).
    pub fn compute(&self, closes: &[f64]) -> Result<f64> {
        if closes.len() < self.period + 1 {
            return Err(Error::Strategy(format!(
                "not enough data for RSI: need {} closes, got {}",
                self.period + 1,
                closes.len()
            )));
        }

        let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
        let initial = &changes[..self.period];

        let mut avg_gain = initial.iter().filter(|&&c| c > 0.0).sum::<f64>() / self.period as f64;
        let mut avg_loss = initial
            .iter()
            .filter(|&&c| c < 0.0)
            .map(|c| c.abs())
            .sum::<f64>()
            / self.period as f64;

        // Wilder smoothing over the remaining changes
        for &change in &changes[self.period..] {
            let gain = change.max(0.0);
            let loss = (-change).max(0.0);
            avg_gain = (avg_gain * (self.period - 1) as f64 + gain) / self.period as f64;
            avg_loss = (avg_loss * (self.period - 1) as f64 + loss) / self.period as f64;
        }

        if avg_loss == 0.0 {
            return Ok(100.0);
        }

        let rs = avg_gain / avg_loss;
        Ok(100.0 - 100.0 / (1.0 + rs))
    }

    /// Latest RSI value plus the raw threshold signal.
    pub fn signal(&self, closes: &[f64]) -> Result<(f64, Signal)> {
        let rsi = self.compute(closes)?;
        let signal = if rsi > self.overbought {
            Signal::Sell
        } else if rsi < self.oversold {
            Signal::Buy
        } else {
            Signal::Hold
        };
        Ok((rsi, signal))
    }
}
