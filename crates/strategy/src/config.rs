use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Top-level bot config file (TOML).
///
/// Example `config/bot.toml`:
/// ```toml
/// interval = "15m"
/// pairs = ["BTCUSDT", "ETHUSDT", "DOGEUSDT"]
///
/// [strategy]
/// type = "rsi-macd"
///
/// [strategy.params]
/// rsi_period = 18
/// rsi_overbought = 65.0
/// rsi_oversold = 40.0
///
/// [trader]
/// daily_trade_cap = 25
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BotConfig {
    /// Candle interval for the candle-polling workflow, e.g. "15m".
    pub interval: String,
    /// Symbols to trade. Each gets its own worker.
    pub pairs: Vec<String>,
    /// Quote asset every symbol ends in.
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub trader: TraderConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyConfig {
    /// Strategy type identifier: "rsi-macd" or "spike-detection".
    #[serde(rename = "type")]
    pub strategy_type: String,
    /// Indicator-specific parameters.
    #[serde(default)]
    pub params: HashMap<String, toml::Value>,
}

fn default_quote_asset() -> String {
    "USDT".to_string()
}

/// Trading-loop knobs, all defaulted.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TraderConfig {
    /// Main tick for candle-polling workers, in seconds.
    pub candle_tick_secs: u64,
    /// Main tick for price-polling workers, in seconds.
    pub price_tick_secs: u64,
    /// How long to monitor an unfilled limit order before unwinding.
    pub monitor_deadline_secs: u64,
    /// Limit order offset from the current price, percent.
    pub limit_offset_pct: f64,
    /// Stop-loss offset on the opposite side, percent.
    pub stop_gap_pct: f64,
    /// Maximum trades per symbol per calendar day.
    pub daily_trade_cap: u32,
    /// 1-second price change that counts as an upward spike, percent.
    pub spike_threshold_pct: f64,
    /// Fraction of the quote balance committed per buy.
    pub trade_fraction: f64,
}

impl Default for TraderConfig {
    fn default() -> Self {
        Self {
            candle_tick_secs: 10,
            price_tick_secs: 1,
            monitor_deadline_secs: 900,
            limit_offset_pct: 2.0,
            stop_gap_pct: 2.0,
            daily_trade_cap: 25,
            spike_threshold_pct: 1.0,
            trade_fraction: 0.25,
        }
    }
}

impl BotConfig {
    /// Load from a TOML file. Exits process on error.
    pub fn load(path: &str) -> Self {
        let content = std::fs::read_to_string(path)
            .unwrap_or_else(|e| panic!("Failed to read bot config at '{path}': {e}"));
        toml::from_str(&content)
            .unwrap_or_else(|e| panic!("Failed to parse bot config at '{path}': {e}"))
    }
}
