use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use common::{Config, Exchange, TradeStore, TradingMode, TradingPair};
use engine::{BinanceClient, PerformanceMonitor, Trader};
use paper::PaperExchange;
use store::SqliteStore;
use strategy::{build_strategy, BotConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // ── Config ───────────────────────────────────────────────────────────────
    let cfg = Config::from_env();
    let bot = BotConfig::load(&cfg.bot_config_path);
    info!(mode = %cfg.trading_mode, pairs = bot.pairs.len(), "PairBot starting");

    // ── Database ─────────────────────────────────────────────────────────────
    let store: Arc<dyn TradeStore> = Arc::new(
        SqliteStore::connect(&cfg.database_url)
            .await
            .context("failed to open trade store")?,
    );

    // ── Exchange (injected based on TRADING_MODE) ────────────────────────────
    let binance = Arc::new(BinanceClient::new(&cfg.binance_api_key, &cfg.binance_secret));
    let exchange: Arc<dyn Exchange> = match cfg.trading_mode {
        TradingMode::Live => {
            info!("Live trading mode — orders go to Binance");
            binance
        }
        TradingMode::Paper => {
            info!(
                balance = cfg.paper_quote_balance,
                slippage_bps = cfg.paper_slippage_bps,
                "Paper trading mode — orders are simulated"
            );
            Arc::new(PaperExchange::new(
                binance,
                bot.quote_asset.clone(),
                cfg.paper_quote_balance,
                cfg.paper_slippage_bps,
            ))
        }
    };

    // ── Pair enrichment ──────────────────────────────────────────────────────
    // A pair whose metadata cannot be fetched is skipped, not fatal.
    let mut pairs = Vec::new();
    for symbol in &bot.pairs {
        match exchange.pair_metadata(symbol).await {
            Ok(meta) => pairs.push(TradingPair::new(symbol.clone(), &bot.quote_asset, meta)),
            Err(e) => warn!(pair = %symbol, error = %e, "Skipping pair — metadata fetch failed"),
        }
    }
    anyhow::ensure!(!pairs.is_empty(), "no tradable pairs left after enrichment");

    // ── Strategy ─────────────────────────────────────────────────────────────
    let strategy =
        build_strategy(&bot.strategy, store.clone()).context("failed to build strategy")?;

    // ── Workers ──────────────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let trader = Trader::new(
        exchange.clone(),
        store.clone(),
        strategy,
        bot.interval.clone(),
        bot.trader.clone(),
        shutdown_rx.clone(),
    );
    let trader_task = tokio::spawn(trader.run(pairs));

    let monitor = PerformanceMonitor::new(
        exchange.clone(),
        store.clone(),
        cfg.metrics_csv_path.clone(),
        shutdown_rx,
    );
    let monitor_task = tokio::spawn(monitor.run());

    // ── Shutdown ─────────────────────────────────────────────────────────────
    info!("All workers started. Waiting for shutdown signal.");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("Shutdown signal received — draining workers");
    let _ = shutdown_tx.send(true);

    let _ = trader_task.await;
    let _ = monitor_task.await;
    info!("PairBot stopped");
    Ok(())
}
