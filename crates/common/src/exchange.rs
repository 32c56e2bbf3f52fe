use async_trait::async_trait;

use crate::{Candle, OrderSide, OrderStatus, PairMeta, Result};

/// Abstraction over the exchange connection.
///
/// `BinanceClient` implements this for live trading.
/// `PaperExchange` implements this for simulation.
///
/// Every call may fail; the trading loop treats each failure as local to the
/// current tick and never fatal.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Fetch the trading rules (precisions and filters) for a symbol.
    async fn pair_metadata(&self, symbol: &str) -> Result<PairMeta>;

    /// Fetch the last `limit` candles for a symbol, oldest first.
    async fn fetch_candles(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>>;

    /// Free balance of a single asset.
    async fn balance(&self, asset: &str) -> Result<f64>;

    /// Latest traded price for a symbol.
    async fn current_price(&self, symbol: &str) -> Result<f64>;

    /// Place a GTC limit order. Returns the exchange order id.
    async fn place_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
    ) -> Result<i64>;

    /// Place a market order. Returns the exchange order id.
    async fn place_market_order(&self, symbol: &str, side: OrderSide, quantity: f64) -> Result<i64>;

    /// Place a GTC stop-loss-limit order. Returns the exchange order id.
    async fn place_stop_loss_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        stop_price: f64,
        limit_price: f64,
    ) -> Result<i64>;

    /// Query the current status of an order.
    async fn order_status(&self, symbol: &str, order_id: i64) -> Result<OrderStatus>;

    /// Cancel an open order.
    async fn cancel_order(&self, symbol: &str, order_id: i64) -> Result<()>;

    /// Maker commission rate as a fraction (0.001 = 0.1%).
    async fn fee_rate(&self) -> Result<f64>;
}
