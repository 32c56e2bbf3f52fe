use async_trait::async_trait;

use crate::{ActiveTrade, Result};

/// Persistence for open position lots and the completed-trade audit log.
///
/// A symbol may hold multiple open lots at once; callers that only care
/// about "the" position use the oldest lot. "Not found" is an expected
/// outcome and surfaces as `None` or an empty vec, never as an error.
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Record a freshly opened lot. Returns the row id.
    async fn log_active_trade(&self, symbol: &str, buy_price: f64, quantity: f64) -> Result<i64>;

    /// The oldest open lot for a symbol, if any.
    async fn active_trade(&self, symbol: &str) -> Result<Option<ActiveTrade>>;

    /// All open lots for a symbol, oldest first.
    async fn active_trades(&self, symbol: &str) -> Result<Vec<ActiveTrade>>;

    /// Every open lot across all symbols, oldest first.
    async fn all_active_trades(&self) -> Result<Vec<ActiveTrade>>;

    /// Delete a closed lot.
    async fn remove_active_trade(&self, id: i64) -> Result<()>;

    /// Append one completed-trade audit record.
    async fn log_completed_trade(
        &self,
        symbol: &str,
        buy_price: f64,
        sell_price: f64,
        quantity: f64,
        profit_loss: f64,
    ) -> Result<()>;

    /// Sum of realized profit/loss over all completed trades.
    async fn total_realized_pnl(&self) -> Result<f64>;
}
