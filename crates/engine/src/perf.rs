use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{info, warn};

use common::{Error, Exchange, PerformanceSnapshot, Result, TradeStore};

/// Periodically summarises realized and unrealized performance and appends
/// each snapshot to a CSV file. Runs until shutdown.
pub struct PerformanceMonitor {
    exchange: Arc<dyn Exchange>,
    store: Arc<dyn TradeStore>,
    csv_path: PathBuf,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl PerformanceMonitor {
    pub fn new(
        exchange: Arc<dyn Exchange>,
        store: Arc<dyn TradeStore>,
        csv_path: impl Into<PathBuf>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            exchange,
            store,
            csv_path: csv_path.into(),
            interval: Duration::from_secs(3600),
            shutdown,
        }
    }

    /// Override the snapshot cadence.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(path = %self.csv_path.display(), "Performance monitor started");
        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.record().await {
                        warn!(error = %e, "Performance snapshot failed");
                    }
                }
            }
        }
        info!("Performance monitor stopped");
    }

    async fn record(&self) -> Result<()> {
        let snapshot = self.snapshot().await?;
        append_snapshot(&self.csv_path, &snapshot)?;
        info!(
            realized = snapshot.total_profit_loss,
            unrealized_profit = snapshot.unrealized_profit,
            unrealized_loss = snapshot.unrealized_loss,
            "Performance snapshot"
        );
        Ok(())
    }

    /// Realized total from the completed-trade log plus mark-to-market of
    /// every open lot. A lot whose price fetch fails is skipped with a
    /// warning rather than poisoning the snapshot.
    async fn snapshot(&self) -> Result<PerformanceSnapshot> {
        let total_profit_loss = self.store.total_realized_pnl().await?;

        let mut unrealized_profit = 0.0;
        let mut unrealized_loss = 0.0;
        for lot in self.store.all_active_trades().await? {
            let price = match self.exchange.current_price(&lot.symbol).await {
                Ok(price) => price,
                Err(e) => {
                    warn!(pair = %lot.symbol, error = %e, "Skipping lot in snapshot");
                    continue;
                }
            };
            let diff = (price - lot.buy_price) * lot.quantity;
            if diff >= 0.0 {
                unrealized_profit += diff;
            } else {
                // losses are reported as a positive magnitude
                unrealized_loss += -diff;
            }
        }

        Ok(PerformanceSnapshot {
            timestamp: Utc::now(),
            total_profit_loss,
            unrealized_profit,
            unrealized_loss,
        })
    }
}

/// Append one snapshot row, writing the header only when the file is new
/// or empty.
fn append_snapshot(path: &Path, snapshot: &PerformanceSnapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let needs_header = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_header)
        .from_writer(file);
    writer
        .serialize(snapshot)
        .map_err(|e| Error::Other(format!("csv write: {e}")))?;
    writer
        .flush()
        .map_err(|e| Error::Other(format!("csv flush: {e}")))?;
    Ok(())
}
