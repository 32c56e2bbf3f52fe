use common::{Candle, Error, Result, Signal};

/// Stochastic oscillator: %K of the latest close against the lowest-low /
/// highest-high range over the lookback period, and %D as a 3-bar average.
#[derive(Debug, Clone)]
pub struct StochasticOscillator {
    pub period: usize,
    pub overbought: f64,
    pub oversold: f64,
}

impl StochasticOscillator {
    pub fn new(period: usize, overbought: f64, oversold: f64) -> Self {
        assert!(period >= 2, "stochastic period must be >= 2");
        Self {
            period,
            overbought,
            oversold,
        }
    }

    /// Compute (%K, %D) over the candle window. With fewer than `period + 3`
    /// candles %D falls back to %K.
    pub fn compute(&self, candles: &[Candle]) -> Result<(f64, f64)> {
        if candles.len() < self.period {
            return Err(Error::Strategy(format!(
                "not enough data for stochastic oscillator: need {} candles, got {}",
                self.period,
                candles.len()
            )));
        }

        let window = &candles[candles.len() - self.period..];
        let highest_high = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let lowest_low = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        let range = highest_high - lowest_low;
        if range == 0.0 {
            // Flat window: treat as mid-scale rather than dividing by zero
            return Ok((50.0, 50.0));
        }

        let last_close = window[window.len() - 1].close;
        let k = (last_close - lowest_low) / range * 100.0;

        if candles.len() < self.period + 3 {
            return Ok((k, k));
        }

        // %D: average %K over the last three bars, each against its own window
        let mut sum_k = 0.0;
        for back in 0..3 {
            let end = candles.len() - back;
            let window = &candles[end - self.period..end];
            let hh = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
            let ll = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
            let close = window[window.len() - 1].close;
            let range = hh - ll;
            sum_k += if range == 0.0 {
                50.0
            } else {
                (close - ll) / range * 100.0
            };
        }
        Ok((k, sum_k / 3.0))
    }

    /// Raw threshold signal from (%K, %D).
    pub fn signal(&self, candles: &[Candle]) -> Result<Signal> {
        let (k, d) = self.compute(candles)?;
        if k > self.overbought && d > self.overbought {
            Ok(Signal::Sell)
        } else if k < self.oversold && d < self.oversold {
            Ok(Signal::Buy)
        } else {
            Ok(Signal::Hold)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            open_time: Utc::now(),
            open,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn errors_when_insufficient_data() {
        let stoch = StochasticOscillator::new(14, 80.0, 20.0);
        let candles = vec![candle(1.0, 2.0, 0.5, 1.5); 10];
        assert!(stoch.compute(&candles).is_err());
    }

    #[test]
    fn close_at_high_gives_k_100() {
        let stoch = StochasticOscillator::new(5, 80.0, 20.0);
        let mut candles = vec![candle(10.0, 12.0, 8.0, 10.0); 4];
        candles.push(candle(10.0, 12.0, 8.0, 12.0));
        let (k, _) = stoch.compute(&candles).unwrap();
        assert!((k - 100.0).abs() < 1e-6);
    }

    #[test]
    fn close_at_low_signals_buy() {
        let stoch = StochasticOscillator::new(5, 80.0, 20.0);
        // Three closes pinned to the bottom of the range
        let mut candles = vec![candle(10.0, 12.0, 8.0, 10.0); 5];
        candles.extend(vec![candle(10.0, 12.0, 8.0, 8.0); 3]);
        assert_eq!(stoch.signal(&candles).unwrap(), Signal::Buy);
    }

    #[test]
    fn flat_window_is_mid_scale() {
        let stoch = StochasticOscillator::new(5, 80.0, 20.0);
        let candles = vec![candle(10.0, 10.0, 10.0, 10.0); 10];
        let (k, d) = stoch.compute(&candles).unwrap();
        assert_eq!((k, d), (50.0, 50.0));
    }
}
