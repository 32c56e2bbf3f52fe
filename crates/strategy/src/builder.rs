use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use common::{Error, Result, TradeStore};
use risk::ExitPolicy;

use crate::config::StrategyConfig;
use crate::indicators::{MacdIndicator, RsiIndicator};
use crate::{CompoundStrategy, SpikeStrategy, Strategy};

/// Build the configured strategy. An unknown type is a startup error, the
/// only fatal failure in the signal path.
pub fn build_strategy(
    cfg: &StrategyConfig,
    store: Arc<dyn TradeStore>,
) -> Result<Arc<dyn Strategy>> {
    match cfg.strategy_type.as_str() {
        "rsi-macd" => {
            let rsi = RsiIndicator::new(
                param_usize(&cfg.params, "rsi_period", 18),
                param_f64(&cfg.params, "rsi_overbought", 65.0),
                param_f64(&cfg.params, "rsi_oversold", 40.0),
            );
            let macd = MacdIndicator::new(
                param_usize(&cfg.params, "macd_fast", 15),
                param_usize(&cfg.params, "macd_slow", 30),
                param_usize(&cfg.params, "macd_signal", 10),
            );
            let exit = ExitPolicy::new(
                param_f64(&cfg.params, "fee_rate", 0.001),
                param_f64(&cfg.params, "desired_profit_pct", 50.0),
                Some(param_f64(&cfg.params, "fall_off_margin_pct", 2.0)),
            );
            let strategy = Arc::new(CompoundStrategy::new(rsi, macd, exit, store));
            info!(name = %strategy.name(), "Strategy configured");
            Ok(strategy)
        }
        "spike-detection" => {
            let strategy = Arc::new(SpikeStrategy::new(
                param_usize(&cfg.params, "avg_period", 20),
                param_f64(&cfg.params, "volume_threshold", 5000.0),
            ));
            info!(name = %strategy.name(), "Strategy configured");
            Ok(strategy)
        }
        other => Err(Error::Strategy(format!("unknown strategy type '{other}'"))),
    }
}

fn param_f64(params: &HashMap<String, toml::Value>, key: &str, default: f64) -> f64 {
    params
        .get(key)
        .and_then(|v| v.as_float().or_else(|| v.as_integer().map(|i| i as f64)))
        .unwrap_or(default)
}

fn param_usize(params: &HashMap<String, toml::Value>, key: &str, default: usize) -> usize {
    params
        .get(key)
        .and_then(|v| v.as_integer())
        .map(|v| v as usize)
        .unwrap_or(default)
}
