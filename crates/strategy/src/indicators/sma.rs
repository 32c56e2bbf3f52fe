use common::Candle;

/// Simple moving average series over `values` for the given period.
/// Returns `None` if there are fewer than `period` values.
pub fn sma(values: &[f64], period: usize) -> Option<Vec<f64>> {
    if period == 0 || values.len() < period {
        return None;
    }
    let out = values
        .windows(period)
        .map(|w| w.iter().sum::<f64>() / period as f64)
        .collect();
    Some(out)
}

/// SMA-crossover trend flag: 20-period SMA of closes above the 50-period SMA.
///
/// Fewer than 50 candles is treated conservatively as not an uptrend.
pub fn is_uptrend(candles: &[Candle]) -> bool {
    if candles.len() < 50 {
        return false;
    }
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

    let (Some(short), Some(long)) = (sma(&closes, 20), sma(&closes, 50)) else {
        return false;
    };
    match (short.last(), long.last()) {
        (Some(s), Some(l)) => s > l,
        _ => false,
    }
}
