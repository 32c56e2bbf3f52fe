pub mod config;
pub mod error;
pub mod exchange;
pub mod store;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use exchange::Exchange;
pub use store::TradeStore;
pub use types::*;
