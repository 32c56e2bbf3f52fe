pub mod macd;
pub mod rsi;
pub mod sma;
pub mod spike;
pub mod stochastic;

pub use macd::{MacdIndicator, MacdOutput};
pub use rsi::RsiIndicator;
pub use sma::{is_uptrend, sma};
pub use spike::{average_candle_range, detect_spike, is_bearish_reversal};
pub use stochastic::StochasticOscillator;
