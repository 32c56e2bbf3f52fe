use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use common::{Error, Exchange, OrderSide, Result, Signal, TradeStore, TradingPair};
use risk::SpikeExit;
use strategy::indicators::is_uptrend;
use strategy::{Strategy, TraderConfig, Workflow};

use crate::saga::{OrderSaga, SagaOutcome};
use crate::sizing;

/// Candle window fetched per tick; enough for the 50-period trend SMA.
const CANDLE_LIMIT: u32 = 100;

/// Percent drop from the high-water mark that closes a spike-entry lot.
const SPIKE_DROP_THRESHOLD_PCT: f64 = 0.5;

/// Drives one worker per trading pair until shutdown.
///
/// Workers are independent: an error in one pair's tick is logged and never
/// reaches another pair. The workflow reported by the strategy decides
/// whether a pair runs the candle-polling or the price-polling loop.
pub struct Trader {
    exchange: Arc<dyn Exchange>,
    store: Arc<dyn TradeStore>,
    strategy: Arc<dyn Strategy>,
    interval: String,
    cfg: TraderConfig,
    shutdown: watch::Receiver<bool>,
}

impl Trader {
    pub fn new(
        exchange: Arc<dyn Exchange>,
        store: Arc<dyn TradeStore>,
        strategy: Arc<dyn Strategy>,
        interval: impl Into<String>,
        cfg: TraderConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            exchange,
            store,
            strategy,
            interval: interval.into(),
            cfg,
            shutdown,
        }
    }

    /// Start all pair workers and wait for them to finish. Returns once every
    /// worker has observed the shutdown signal and exited.
    pub async fn run(self, pairs: Vec<TradingPair>) {
        let fee_rate = match self.exchange.fee_rate().await {
            Ok(rate) => rate,
            Err(e) => {
                warn!(error = %e, "Could not fetch fee rate — using 0.1% default");
                0.001
            }
        };
        let spike_exit = Arc::new(SpikeExit::new(fee_rate, SPIKE_DROP_THRESHOLD_PCT));

        let workflow = self.strategy.workflow();
        info!(
            strategy = %self.strategy.name(),
            pairs = pairs.len(),
            ?workflow,
            "Starting pair workers"
        );

        let mut workers = JoinSet::new();
        for pair in pairs {
            let worker = PairWorker {
                exchange: self.exchange.clone(),
                store: self.store.clone(),
                strategy: self.strategy.clone(),
                interval: self.interval.clone(),
                cfg: self.cfg.clone(),
                shutdown: self.shutdown.clone(),
                pair,
            };
            match workflow {
                Workflow::CandlePolling => {
                    workers.spawn(worker.run_candle_loop());
                }
                Workflow::PricePolling => {
                    let exit = spike_exit.clone();
                    workers.spawn(worker.run_price_loop(exit));
                }
            }
        }

        while workers.join_next().await.is_some() {}
        info!("All pair workers stopped");
    }
}

/// One pair's trading loop state.
struct PairWorker {
    exchange: Arc<dyn Exchange>,
    store: Arc<dyn TradeStore>,
    strategy: Arc<dyn Strategy>,
    interval: String,
    cfg: TraderConfig,
    shutdown: watch::Receiver<bool>,
    pair: TradingPair,
}

impl PairWorker {
    /// Candle-polling loop: fetch candles on each tick, evaluate the
    /// strategy, and run the limit + stop-loss saga on a non-hold signal.
    async fn run_candle_loop(mut self) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.cfg.candle_tick_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut rollover = tokio::time::interval(Duration::from_secs(60));

        let mut trades_today: u32 = 0;
        let mut last_day = Utc::now().date_naive();

        info!(pair = %self.pair.symbol, "Candle worker started");
        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                _ = rollover.tick() => {
                    let today = Utc::now().date_naive();
                    if today != last_day {
                        info!(pair = %self.pair.symbol, trades = trades_today, "Daily trade counter reset");
                        trades_today = 0;
                        last_day = today;
                    }
                }
                _ = ticker.tick() => {
                    if trades_today >= self.cfg.daily_trade_cap {
                        debug!(pair = %self.pair.symbol, "Daily trade cap reached — skipping tick");
                        continue;
                    }
                    match self.candle_tick().await {
                        Ok(true) => trades_today += 1,
                        Ok(false) => {}
                        Err(e) => warn!(pair = %self.pair.symbol, error = %e, "Tick failed"),
                    }
                }
            }
        }
        info!(pair = %self.pair.symbol, "Candle worker stopped");
    }

    /// One candle-polling tick. `Ok(true)` when a trade was executed.
    async fn candle_tick(&mut self) -> Result<bool> {
        let symbol = self.pair.symbol.clone();

        let candles = self
            .exchange
            .fetch_candles(&symbol, &self.interval, CANDLE_LIMIT)
            .await?;
        let trend = is_uptrend(&candles);
        let signal = self.strategy.evaluate(&candles, &symbol, trend).await?;
        if signal == Signal::Hold {
            return Ok(false);
        }

        let current_price = candles
            .last()
            .map(|c| c.close)
            .ok_or_else(|| Error::Exchange("empty candle response".into()))?;
        let quote_balance = self.exchange.balance(&self.pair.quote_asset).await?;
        let base_balance = self.exchange.balance(&self.pair.base_asset).await?;

        let meta = &self.pair.meta;
        let (side, quantity) = match signal {
            Signal::Buy => (
                OrderSide::Buy,
                sizing::buy_quantity(quote_balance, current_price, self.cfg.trade_fraction, meta),
            ),
            Signal::Sell => (
                OrderSide::Sell,
                sizing::sell_quantity(base_balance, current_price, meta),
            ),
            Signal::Hold => unreachable!("hold handled above"),
        };
        // Sizing returns lot-step-floored, notional-safe quantities.
        let Some(quantity) = quantity else {
            info!(pair = %symbol, %side, "Insufficient balance — skipping trade");
            return Ok(false);
        };

        let offset = self.cfg.limit_offset_pct / 100.0;
        let gap = self.cfg.stop_gap_pct / 100.0;
        // Take-profit framing: limit beyond the current price, stop behind it
        let (limit_price, stop_price, stop_limit_price) = match side {
            OrderSide::Buy => {
                let stop = current_price * (1.0 - gap);
                (current_price * (1.0 + offset), stop, stop * 0.99)
            }
            OrderSide::Sell => {
                let stop = current_price * (1.0 + gap);
                (current_price * (1.0 - offset), stop, stop * 1.01)
            }
        };
        let limit_price = sizing::floor_to_tick(limit_price, meta.price_tick);
        let stop_price = sizing::floor_to_tick(stop_price, meta.price_tick);
        let stop_limit_price = sizing::floor_to_tick(stop_limit_price, meta.price_tick);

        info!(
            pair = %symbol,
            %side,
            qty = quantity,
            limit = limit_price,
            stop = stop_price,
            "Placing entry orders"
        );
        let saga = OrderSaga::new(
            self.exchange.clone(),
            Duration::from_secs(self.cfg.monitor_deadline_secs),
        );
        let outcome = saga
            .run(
                &symbol,
                side,
                quantity,
                limit_price,
                stop_price,
                stop_limit_price,
                &mut self.shutdown,
            )
            .await?;
        if outcome == SagaOutcome::NotFilled {
            return Ok(false);
        }

        match side {
            OrderSide::Buy => {
                self.store
                    .log_active_trade(&symbol, limit_price, quantity)
                    .await?;
                info!(pair = %symbol, price = limit_price, qty = quantity, "Position opened");
            }
            OrderSide::Sell => {
                // A sell of the full base balance closes every open lot.
                let lots = self.store.active_trades(&symbol).await?;
                if lots.is_empty() {
                    info!(pair = %symbol, "Sell filled with no recorded lots");
                }
                for lot in lots {
                    let profit_loss = (limit_price - lot.buy_price) * lot.quantity;
                    self.store
                        .log_completed_trade(
                            &symbol,
                            lot.buy_price,
                            limit_price,
                            lot.quantity,
                            profit_loss,
                        )
                        .await?;
                    self.store.remove_active_trade(lot.id).await?;
                    info!(
                        pair = %symbol,
                        buy = lot.buy_price,
                        sell = limit_price,
                        pnl = profit_loss,
                        "Position closed"
                    );
                }
                self.strategy.on_position_closed(&symbol).await;
            }
        }

        Ok(true)
    }

    /// Price-polling loop: react to 1-second price spikes and re-evaluate
    /// open lots against the spike exit rule on every tick. Only entries
    /// count against the daily cap; exits always run.
    async fn run_price_loop(mut self, exit: Arc<SpikeExit>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.cfg.price_tick_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut rollover = tokio::time::interval(Duration::from_secs(60));

        let mut last_price = 0.0_f64;
        let mut trades_today: u32 = 0;
        let mut last_day = Utc::now().date_naive();

        info!(pair = %self.pair.symbol, "Price worker started");
        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                _ = rollover.tick() => {
                    let today = Utc::now().date_naive();
                    if today != last_day {
                        info!(pair = %self.pair.symbol, trades = trades_today, "Daily trade counter reset");
                        trades_today = 0;
                        last_day = today;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.price_tick(&exit, &mut last_price, &mut trades_today).await {
                        warn!(pair = %self.pair.symbol, error = %e, "Tick failed");
                    }
                }
            }
        }
        info!(pair = %self.pair.symbol, "Price worker stopped");
    }

    async fn price_tick(
        &mut self,
        exit: &SpikeExit,
        last_price: &mut f64,
        trades_today: &mut u32,
    ) -> Result<()> {
        let symbol = self.pair.symbol.clone();
        let current_price = self.exchange.current_price(&symbol).await?;

        let change_pct = if *last_price > 0.0 {
            (current_price - *last_price) / *last_price * 100.0
        } else {
            0.0
        };
        *last_price = current_price;

        // Exit sweep first, every tick, cap or no cap. A lot entered on
        // this tick is only evaluated from the next tick onwards.
        let lots = self.store.active_trades(&symbol).await?;
        let mut remaining = lots.len();
        for lot in lots {
            if exit.should_sell(&symbol, lot.buy_price, current_price).await {
                let order_id = self
                    .exchange
                    .place_market_order(&symbol, OrderSide::Sell, lot.quantity)
                    .await?;
                let profit_loss = (current_price - lot.buy_price) * lot.quantity;
                self.store
                    .log_completed_trade(
                        &symbol,
                        lot.buy_price,
                        current_price,
                        lot.quantity,
                        profit_loss,
                    )
                    .await?;
                self.store.remove_active_trade(lot.id).await?;
                remaining -= 1;
                info!(
                    pair = %symbol,
                    order_id,
                    buy = lot.buy_price,
                    sell = current_price,
                    pnl = profit_loss,
                    "Spike lot closed"
                );
            }
        }
        if remaining == 0 {
            exit.clear(&symbol).await;
        }

        if change_pct > self.cfg.spike_threshold_pct {
            if *trades_today >= self.cfg.daily_trade_cap {
                debug!(pair = %symbol, "Daily trade cap reached — skipping spike entry");
            } else {
                info!(pair = %symbol, change_pct, "Upward spike detected");
                self.spike_entry(&symbol, current_price, trades_today).await?;
            }
        }

        Ok(())
    }

    async fn spike_entry(
        &self,
        symbol: &str,
        current_price: f64,
        trades_today: &mut u32,
    ) -> Result<()> {
        let quote_balance = self.exchange.balance(&self.pair.quote_asset).await?;
        let Some(quantity) =
            sizing::spike_entry_quantity(quote_balance, current_price, &self.pair.meta)
        else {
            info!(pair = %symbol, "Spike entry skipped — balance below minimum notional");
            return Ok(());
        };

        let order_id = self
            .exchange
            .place_market_order(symbol, OrderSide::Buy, quantity)
            .await?;
        self.store
            .log_active_trade(symbol, current_price, quantity)
            .await?;
        *trades_today += 1;
        info!(pair = %symbol, order_id, price = current_price, qty = quantity, "Spike entry filled");
        Ok(())
    }
}
