use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{Candle, Error, Exchange, OrderSide, OrderStatus, PairMeta, Result};

/// Simulated exchange for paper trading.
///
/// Market data (metadata, candles, prices) is delegated to a real inner
/// exchange; balances and orders are simulated locally. Market fills apply
/// configurable slippage, limit orders fill on the first status poll, and
/// stop-loss orders rest until cancelled. No real orders are ever sent.
pub struct PaperExchange {
    market: Arc<dyn Exchange>,
    quote_asset: String,
    balances: RwLock<HashMap<String, f64>>,
    orders: RwLock<HashMap<i64, PaperOrder>>,
    next_id: AtomicI64,
    /// Slippage in basis points applied to market fills.
    slippage_bps: f64,
}

#[derive(Debug, Clone)]
struct PaperOrder {
    symbol: String,
    side: OrderSide,
    quantity: f64,
    /// Fill price for limit orders; `None` for resting stop-loss orders.
    limit_price: Option<f64>,
    status: OrderStatus,
}

impl PaperExchange {
    pub fn new(
        market: Arc<dyn Exchange>,
        quote_asset: impl Into<String>,
        quote_balance: f64,
        slippage_bps: f64,
    ) -> Self {
        let quote_asset = quote_asset.into();
        info!(
            quote = %quote_asset,
            balance = quote_balance,
            slippage_bps,
            "Paper exchange initialized"
        );
        let mut balances = HashMap::new();
        balances.insert(quote_asset.clone(), quote_balance);
        Self {
            market,
            quote_asset,
            balances: RwLock::new(balances),
            orders: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(0),
            slippage_bps,
        }
    }

    fn base_asset(&self, symbol: &str) -> String {
        symbol
            .strip_suffix(self.quote_asset.as_str())
            .unwrap_or(symbol)
            .to_string()
    }

    fn next_order_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Move quantity and notional between the base and quote balances.
    async fn settle(&self, symbol: &str, side: OrderSide, quantity: f64, price: f64) {
        let base = self.base_asset(symbol);
        let notional = quantity * price;
        let mut balances = self.balances.write().await;
        let quote_entry = balances.entry(self.quote_asset.clone()).or_insert(0.0);
        match side {
            OrderSide::Buy => {
                *quote_entry -= notional;
                *balances.entry(base).or_insert(0.0) += quantity;
            }
            OrderSide::Sell => {
                *quote_entry += notional;
                *balances.entry(base).or_insert(0.0) -= quantity;
            }
        }
        debug!(pair = %symbol, %side, qty = quantity, price, "Paper fill settled");
    }
}

#[async_trait]
impl Exchange for PaperExchange {
    async fn pair_metadata(&self, symbol: &str) -> Result<PairMeta> {
        self.market.pair_metadata(symbol).await
    }

    async fn fetch_candles(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        self.market.fetch_candles(symbol, interval, limit).await
    }

    async fn balance(&self, asset: &str) -> Result<f64> {
        Ok(self.balances.read().await.get(asset).copied().unwrap_or(0.0))
    }

    async fn current_price(&self, symbol: &str) -> Result<f64> {
        self.market.current_price(symbol).await
    }

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
    ) -> Result<i64> {
        let id = self.next_order_id();
        self.orders.write().await.insert(
            id,
            PaperOrder {
                symbol: symbol.to_string(),
                side,
                quantity,
                limit_price: Some(price),
                status: OrderStatus::New,
            },
        );
        Ok(id)
    }

    /// Fills immediately at the live price with slippage: buys pay more,
    /// sells receive less.
    async fn place_market_order(&self, symbol: &str, side: OrderSide, quantity: f64) -> Result<i64> {
        let mid_price = self.market.current_price(symbol).await?;
        let fill_price = match side {
            OrderSide::Buy => mid_price * (1.0 + self.slippage_bps / 10_000.0),
            OrderSide::Sell => mid_price * (1.0 - self.slippage_bps / 10_000.0),
        };
        self.settle(symbol, side, quantity, fill_price).await;

        let id = self.next_order_id();
        self.orders.write().await.insert(
            id,
            PaperOrder {
                symbol: symbol.to_string(),
                side,
                quantity,
                limit_price: Some(fill_price),
                status: OrderStatus::Filled,
            },
        );
        Ok(id)
    }

    /// Stop-loss orders rest unfilled until cancelled.
    async fn place_stop_loss_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        _stop_price: f64,
        _limit_price: f64,
    ) -> Result<i64> {
        let id = self.next_order_id();
        self.orders.write().await.insert(
            id,
            PaperOrder {
                symbol: symbol.to_string(),
                side,
                quantity,
                limit_price: None,
                status: OrderStatus::New,
            },
        );
        Ok(id)
    }

    /// Limit orders fill at their limit price on the first poll; resting
    /// stop-loss orders stay `New`.
    async fn order_status(&self, _symbol: &str, order_id: i64) -> Result<OrderStatus> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(&order_id)
            .ok_or_else(|| Error::Exchange(format!("unknown paper order {order_id}")))?;
        if order.status == OrderStatus::New {
            if let Some(price) = order.limit_price {
                order.status = OrderStatus::Filled;
                let (symbol, side, quantity) = (order.symbol.clone(), order.side, order.quantity);
                drop(orders);
                self.settle(&symbol, side, quantity, price).await;
                return Ok(OrderStatus::Filled);
            }
        }
        Ok(order.status)
    }

    async fn cancel_order(&self, _symbol: &str, order_id: i64) -> Result<()> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(&order_id)
            .ok_or_else(|| Error::Exchange(format!("unknown paper order {order_id}")))?;
        if order.status.is_terminal() {
            return Err(Error::Exchange(format!(
                "paper order {order_id} already {:?}",
                order.status
            )));
        }
        order.status = OrderStatus::Canceled;
        Ok(())
    }

    async fn fee_rate(&self) -> Result<f64> {
        Ok(0.001)
    }
}
