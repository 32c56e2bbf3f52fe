use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV aggregate fetched from the exchange.
/// Sequences are always ordered oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Exchange-side trading rules for one symbol, fetched once at startup
/// from exchange metadata and read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairMeta {
    /// Decimal places used when formatting prices.
    pub price_precision: u32,
    /// Decimal places used when formatting quantities.
    pub qty_precision: u32,
    /// Minimum order value in quote-currency terms.
    pub min_notional: f64,
    /// Quantity granularity (LOT_SIZE stepSize). Quantities are floored to it.
    pub lot_step: f64,
    /// Price granularity (PRICE_FILTER tickSize). Prices are floored to it.
    pub price_tick: f64,
}

/// A trading pair with its enriched exchange metadata.
/// Created at startup and shared read-only with the pair's worker.
#[derive(Debug, Clone)]
pub struct TradingPair {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub meta: PairMeta,
}

impl TradingPair {
    /// Build a pair from a symbol ending in the given quote asset plus
    /// its exchange metadata. Symbols that do not end in the quote asset
    /// are rejected by the caller before reaching here.
    pub fn new(symbol: impl Into<String>, quote_asset: &str, meta: PairMeta) -> Self {
        let symbol = symbol.into();
        let base_asset = symbol
            .strip_suffix(quote_asset)
            .unwrap_or(&symbol)
            .to_string();
        Self {
            symbol,
            base_asset,
            quote_asset: quote_asset.to_string(),
            meta,
        }
    }
}

/// Side of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Exchange-reported lifecycle state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

impl OrderStatus {
    /// True once the order can no longer fill.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }
}

/// The ternary contract between the strategy engine and the trading loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Buy => write!(f, "BUY"),
            Signal::Sell => write!(f, "SELL"),
            Signal::Hold => write!(f, "HOLD"),
        }
    }
}

/// An open position lot awaiting exit, persisted in the trade store.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActiveTrade {
    pub id: i64,
    pub symbol: String,
    pub buy_price: f64,
    pub quantity: f64,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit record written once per closed lot.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CompletedTrade {
    pub id: i64,
    pub symbol: String,
    pub buy_price: f64,
    pub sell_price: f64,
    pub quantity: f64,
    pub profit_loss: f64,
    pub created_at: DateTime<Utc>,
}

/// Hourly account summary appended to the metrics CSV.
/// Both unrealized columns are positive magnitudes.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSnapshot {
    pub timestamp: DateTime<Utc>,
    pub total_profit_loss: f64,
    pub unrealized_profit: f64,
    pub unrealized_loss: f64,
}

/// Whether the bot is running against the real exchange or simulating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}
