use common::Candle;

/// Average high-low range over the last `period` candles.
/// Returns 0.0 when there are fewer than `period` candles.
pub fn average_candle_range(candles: &[Candle], period: usize) -> f64 {
    if period == 0 || candles.len() < period {
        return 0.0;
    }
    let total: f64 = candles[candles.len() - period..]
        .iter()
        .map(|c| (c.high - c.low).abs())
        .sum();
    total / period as f64
}

/// True when the latest candle's range exceeds 3x the average range and its
/// volume clears the configured threshold.
pub fn detect_spike(candles: &[Candle], avg_range: f64, volume_threshold: f64) -> bool {
    let Some(latest) = candles.last() else {
        return false;
    };
    let range = (latest.high - latest.low).abs();
    range > 3.0 * avg_range && latest.volume > volume_threshold
}

/// True when the latest candle is a bearish reversal: it closed below its
/// open and below the previous candle's close.
pub fn is_bearish_reversal(candles: &[Candle]) -> bool {
    if candles.len() < 2 {
        return false;
    }
    let latest = &candles[candles.len() - 1];
    let previous = &candles[candles.len() - 2];
    latest.close < latest.open && latest.close < previous.close
}
