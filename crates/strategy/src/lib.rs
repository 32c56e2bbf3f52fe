pub mod builder;
pub mod compound;
pub mod config;
pub mod indicators;
pub mod spike;

pub use builder::build_strategy;
pub use compound::CompoundStrategy;
pub use config::{BotConfig, StrategyConfig, TraderConfig};
pub use spike::SpikeStrategy;

use async_trait::async_trait;

use common::{Candle, Result, Signal};

/// How the trading loop should drive a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workflow {
    /// Fetch candles on a slow tick and evaluate indicators over them.
    CandlePolling,
    /// Poll the current price every second and react to spikes.
    PricePolling,
}

/// All strategy implementations must satisfy this trait.
///
/// The trading loop picks its per-pair tick behavior by matching on
/// [`Strategy::workflow`]; `evaluate` is the only signal source.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Human-readable name of this strategy instance, shown in logs.
    fn name(&self) -> &str;

    /// Which trading-loop behavior drives this strategy.
    fn workflow(&self) -> Workflow;

    /// Turn the latest candle window into a trade signal.
    ///
    /// `trend` is the SMA-crossover uptrend flag computed by the loop;
    /// a short candle window is an error, handled tick-locally by the caller.
    async fn evaluate(&self, candles: &[Candle], symbol: &str, trend: bool) -> Result<Signal>;

    /// Notify the strategy that the open position for `symbol` was closed,
    /// so any per-symbol exit state can be dropped.
    async fn on_position_closed(&self, _symbol: &str) {}
}
