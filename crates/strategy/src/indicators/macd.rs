use common::{Error, Result, Signal};

/// MACD (Moving Average Convergence/Divergence) indicator.
///
/// MACD line = EMA(fast) − EMA(slow); signal line = EMA(MACD line, signal
/// period); histogram = MACD line − signal line.
#[derive(Debug, Clone)]
pub struct MacdIndicator {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

/// Latest values of the three MACD series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdOutput {
    pub macd_line: f64,
    pub signal_line: f64,
    pub histogram: f64,
}

impl MacdIndicator {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        assert!(fast < slow, "MACD fast period must be less than slow period");
        Self { fast, slow, signal }
    }

    /// Compute the latest MACD values from close prices (oldest first).
    pub fn compute(&self, closes: &[f64]) -> Result<MacdOutput> {
        if closes.len() < self.slow {
            return Err(Error::Strategy(format!(
                "not enough data for MACD: need {} closes, got {}",
                self.slow,
                closes.len()
            )));
        }

        let fast_ema = ema_series(closes, self.fast);
        let slow_ema = ema_series(closes, self.slow);

        // Both series are anchored at the end of the input; drop the extra
        // leading values of the fast series so the indices line up.
        if fast_ema.len() < slow_ema.len() {
            return Err(Error::Strategy(format!(
                "misaligned EMA lengths: fast={}, slow={}",
                fast_ema.len(),
                slow_ema.len()
            )));
        }
        let fast_ema = &fast_ema[fast_ema.len() - slow_ema.len()..];

        let macd_values: Vec<f64> = fast_ema
            .iter()
            .zip(slow_ema.iter())
            .map(|(f, s)| f - s)
            .collect();

        let signal_series = ema_series(&macd_values, self.signal);
        let (Some(&macd_line), Some(&signal_line)) = (macd_values.last(), signal_series.last())
        else {
            return Err(Error::Strategy(format!(
                "not enough data for MACD signal line: need {} MACD values, got {}",
                self.signal,
                macd_values.len()
            )));
        };

        Ok(MacdOutput {
            macd_line,
            signal_line,
            histogram: macd_line - signal_line,
        })
    }

    /// Latest MACD values plus the raw signal.
    pub fn signal(&self, closes: &[f64]) -> Result<(MacdOutput, Signal)> {
        let out = self.compute(closes)?;
        let signal = if out.macd_line > out.signal_line && out.histogram > 0.0 {
            Signal::Buy
        } else if out.macd_line < out.signal_line && out.histogram < 0.0 {
            Signal::Sell
        } else {
            Signal::Hold
        };
        Ok((out, signal))
    }
}

/// EMA series of `values` for the given period, seeded with the SMA of the
/// first `period` values. Empty when there is not enough data.
fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed: f64 = values[..period].iter().sum::<f64>() / period as f64;

    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(seed);
    for &value in &values[period..] {
        let prev = *out.last().unwrap_or(&seed);
        out.push((value - prev) * multiplier + prev);
    }
    out
}
