pub mod binance;
pub mod perf;
pub mod saga;
pub mod sizing;
pub mod trader;

pub use binance::BinanceClient;
pub use perf::PerformanceMonitor;
pub use saga::{OrderSaga, SagaOutcome};
pub use trader::Trader;
