use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use common::{Candle, Error, Exchange, OrderSide, OrderStatus, PairMeta, Result};

const BASE_URL: &str = "https://api.binance.com";

/// Attempts for public candle fetches; no other call retries.
const CANDLE_RETRIES: u32 = 3;
const CANDLE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// REST API client for Binance spot. Implements the exchange trait for live
/// trading: market data, account queries and order placement.
///
/// Per-symbol metadata is cached after the first lookup so order quantities
/// and prices can be formatted to the pair's precisions.
pub struct BinanceClient {
    api_key: String,
    secret: String,
    http: Client,
    meta_cache: RwLock<HashMap<String, PairMeta>>,
}

impl BinanceClient {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret: secret.into(),
            http: Client::builder()
                .use_rustls_tls()
                .build()
                .expect("Failed to build HTTP client"),
            meta_cache: RwLock::new(HashMap::new()),
        }
    }

    fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_millis() as u64
    }

    fn sign(&self, query: &str) -> String {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    async fn public_get(&self, path: &str, params: &str) -> Result<String> {
        let url = if params.is_empty() {
            format!("{BASE_URL}{path}")
        } else {
            format!("{BASE_URL}{path}?{params}")
        };
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {body}")));
        }
        Ok(body)
    }

    async fn signed_request(&self, method: reqwest::Method, path: &str, params: &str) -> Result<String> {
        let ts = Self::timestamp_ms();
        let query = if params.is_empty() {
            format!("timestamp={ts}")
        } else {
            format!("{params}&timestamp={ts}")
        };
        let signature = self.sign(&query);
        let url = format!("{BASE_URL}{path}?{query}&signature={signature}");

        let resp = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {body}")));
        }
        Ok(body)
    }

    /// Cached pair metadata, fetched on first use.
    async fn meta_for(&self, symbol: &str) -> Result<PairMeta> {
        if let Some(meta) = self.meta_cache.read().await.get(symbol) {
            return Ok(meta.clone());
        }
        self.pair_metadata(symbol).await
    }

    fn format_qty(meta: &PairMeta, quantity: f64) -> String {
        format!("{:.prec$}", quantity, prec = meta.qty_precision as usize)
    }

    fn format_price(meta: &PairMeta, price: f64) -> String {
        format!("{:.prec$}", price, prec = meta.price_precision as usize)
    }

    async fn post_order(&self, params: &str) -> Result<i64> {
        let body = self
            .signed_request(reqwest::Method::POST, "/api/v3/order", params)
            .await?;
        let resp: OrderResponse = serde_json::from_str(&body)?;
        Ok(resp.order_id)
    }
}

#[async_trait]
impl Exchange for BinanceClient {
    async fn pair_metadata(&self, symbol: &str) -> Result<PairMeta> {
        let body = self
            .public_get("/api/v3/exchangeInfo", &format!("symbol={symbol}"))
            .await?;
        let info: ExchangeInfo = serde_json::from_str(&body)?;
        let sym = info
            .symbols
            .into_iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| Error::Exchange(format!("symbol {symbol} not in exchange info")))?;

        let mut meta = PairMeta {
            price_precision: sym.quote_precision,
            qty_precision: sym.base_asset_precision,
            min_notional: 0.0,
            lot_step: 0.0,
            price_tick: 0.0,
        };

        for filter in &sym.filters {
            match filter.filter_type.as_str() {
                // older symbols report MIN_NOTIONAL, newer ones NOTIONAL
                "MIN_NOTIONAL" | "NOTIONAL" => {
                    if let Some(v) = filter.min_notional.as_deref().and_then(|v| v.parse().ok()) {
                        meta.min_notional = v;
                    }
                }
                "LOT_SIZE" => {
                    if let Some(v) = filter.step_size.as_deref().and_then(|v| v.parse().ok()) {
                        meta.lot_step = v;
                    }
                }
                "PRICE_FILTER" => {
                    if let Some(v) = filter.tick_size.as_deref().and_then(|v| v.parse().ok()) {
                        meta.price_tick = v;
                    }
                }
                _ => {}
            }
        }

        debug!(pair = %symbol, ?meta, "Pair metadata fetched");
        self.meta_cache
            .write()
            .await
            .insert(symbol.to_string(), meta.clone());
        Ok(meta)
    }

    async fn fetch_candles(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        let params = format!("symbol={symbol}&interval={interval}&limit={limit}");

        let mut last_err = None;
        for attempt in 1..=CANDLE_RETRIES {
            match self.public_get("/api/v3/klines", &params).await {
                Ok(body) => {
                    let raw: Vec<Vec<serde_json::Value>> = serde_json::from_str(&body)?;
                    let mut candles = Vec::with_capacity(raw.len());
                    for k in raw {
                        candles.push(parse_kline(&k)?);
                    }
                    return Ok(candles);
                }
                Err(e) => {
                    warn!(pair = %symbol, attempt, error = %e, "Candle fetch failed");
                    last_err = Some(e);
                    if attempt < CANDLE_RETRIES {
                        tokio::time::sleep(CANDLE_RETRY_DELAY).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Exchange("candle fetch failed".into())))
    }

    async fn balance(&self, asset: &str) -> Result<f64> {
        let body = self
            .signed_request(reqwest::Method::GET, "/api/v3/account", "")
            .await?;
        let account: AccountResponse = serde_json::from_str(&body)?;
        account
            .balances
            .iter()
            .find(|b| b.asset == asset)
            .map(|b| b.free.parse::<f64>().unwrap_or(0.0))
            .ok_or_else(|| Error::Exchange(format!("asset {asset} not found in account")))
    }

    async fn current_price(&self, symbol: &str) -> Result<f64> {
        let body = self
            .public_get("/api/v3/ticker/price", &format!("symbol={symbol}"))
            .await?;
        let ticker: PriceTicker = serde_json::from_str(&body)?;
        ticker
            .price
            .parse::<f64>()
            .map_err(|e| Error::Exchange(e.to_string()))
    }

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
    ) -> Result<i64> {
        let meta = self.meta_for(symbol).await?;
        let params = format!(
            "symbol={symbol}&side={side}&type=LIMIT&timeInForce=GTC&quantity={}&price={}",
            Self::format_qty(&meta, quantity),
            Self::format_price(&meta, price),
        );
        self.post_order(&params).await
    }

    async fn place_market_order(&self, symbol: &str, side: OrderSide, quantity: f64) -> Result<i64> {
        let meta = self.meta_for(symbol).await?;
        let params = format!(
            "symbol={symbol}&side={side}&type=MARKET&quantity={}",
            Self::format_qty(&meta, quantity),
        );
        self.post_order(&params).await
    }

    async fn place_stop_loss_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        stop_price: f64,
        limit_price: f64,
    ) -> Result<i64> {
        let meta = self.meta_for(symbol).await?;
        let params = format!(
            "symbol={symbol}&side={side}&type=STOP_LOSS_LIMIT&timeInForce=GTC&quantity={}&price={}&stopPrice={}",
            Self::format_qty(&meta, quantity),
            Self::format_price(&meta, limit_price),
            Self::format_price(&meta, stop_price),
        );
        self.post_order(&params).await
    }

    async fn order_status(&self, symbol: &str, order_id: i64) -> Result<OrderStatus> {
        let body = self
            .signed_request(
                reqwest::Method::GET,
                "/api/v3/order",
                &format!("symbol={symbol}&orderId={order_id}"),
            )
            .await?;
        let resp: OrderStatusResponse = serde_json::from_str(&body)?;
        parse_status(&resp.status)
    }

    async fn cancel_order(&self, symbol: &str, order_id: i64) -> Result<()> {
        self.signed_request(
            reqwest::Method::DELETE,
            "/api/v3/order",
            &format!("symbol={symbol}&orderId={order_id}"),
        )
        .await?;
        Ok(())
    }

    async fn fee_rate(&self) -> Result<f64> {
        let body = self
            .signed_request(reqwest::Method::GET, "/api/v3/account", "")
            .await?;
        let account: AccountResponse = serde_json::from_str(&body)?;
        // makerCommission is reported in basis points
        Ok(account.maker_commission as f64 / 10_000.0)
    }
}

fn parse_kline(k: &[serde_json::Value]) -> Result<Candle> {
    if k.len() < 6 {
        return Err(Error::Exchange(format!("short kline row: {} fields", k.len())));
    }
    let open_time_ms = k[0]
        .as_i64()
        .ok_or_else(|| Error::Exchange("kline open time not an integer".into()))?;
    let field = |i: usize| -> Result<f64> {
        k[i].as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| Error::Exchange(format!("kline field {i} not a decimal string")))
    };
    Ok(Candle {
        open_time: Utc
            .timestamp_millis_opt(open_time_ms)
            .single()
            .ok_or_else(|| Error::Exchange("kline open time out of range".into()))?,
        open: field(1)?,
        high: field(2)?,
        low: field(3)?,
        close: field(4)?,
        volume: field(5)?,
    })
}

fn parse_status(status: &str) -> Result<OrderStatus> {
    match status {
        "NEW" => Ok(OrderStatus::New),
        "PARTIALLY_FILLED" => Ok(OrderStatus::PartiallyFilled),
        "FILLED" => Ok(OrderStatus::Filled),
        "CANCELED" => Ok(OrderStatus::Canceled),
        "REJECTED" => Ok(OrderStatus::Rejected),
        "EXPIRED" | "EXPIRED_IN_MATCH" => Ok(OrderStatus::Expired),
        other => Err(Error::Exchange(format!("unknown order status '{other}'"))),
    }
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    quote_precision: u32,
    base_asset_precision: u32,
    filters: Vec<SymbolFilter>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolFilter {
    filter_type: String,
    #[serde(default)]
    min_notional: Option<String>,
    #[serde(default)]
    step_size: Option<String>,
    #[serde(default)]
    tick_size: Option<String>,
}

#[derive(Deserialize)]
struct PriceTicker {
    price: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderStatusResponse {
    status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    maker_commission: i64,
    balances: Vec<Balance>,
}

#[derive(Deserialize)]
struct Balance {
    asset: String,
    free: String,
}
