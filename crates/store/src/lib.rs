use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;

use common::{ActiveTrade, Result, TradeStore};

/// SQLite-backed implementation of the trade store.
///
/// Schema is created at startup; `active_trades` holds one row per open lot
/// and `completed_trades` is the append-only audit log.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect and create the schema if it does not exist yet.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS active_trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                buy_price REAL NOT NULL,
                quantity REAL NOT NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS completed_trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                buy_price REAL NOT NULL,
                sell_price REAL NOT NULL,
                quantity REAL NOT NULL,
                profit_loss REAL NOT NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&pool)
        .await?;

        info!("Trade store ready");
        Ok(Self { pool })
    }
}

#[async_trait]
impl TradeStore for SqliteStore {
    async fn log_active_trade(&self, symbol: &str, buy_price: f64, quantity: f64) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO active_trades (symbol, buy_price, quantity) VALUES (?1, ?2, ?3)",
        )
        .bind(symbol)
        .bind(buy_price)
        .bind(quantity)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn active_trade(&self, symbol: &str) -> Result<Option<ActiveTrade>> {
        let trade = sqlx::query_as::<_, ActiveTrade>(
            "SELECT id, symbol, buy_price, quantity, created_at
             FROM active_trades WHERE symbol = ?1 ORDER BY id ASC LIMIT 1",
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;
        Ok(trade)
    }

    async fn active_trades(&self, symbol: &str) -> Result<Vec<ActiveTrade>> {
        let trades = sqlx::query_as::<_, ActiveTrade>(
            "SELECT id, symbol, buy_price, quantity, created_at
             FROM active_trades WHERE symbol = ?1 ORDER BY id ASC",
        )
        .bind(symbol)
        .fetch_all(&self.pool)
        .await?;
        Ok(trades)
    }

    async fn all_active_trades(&self) -> Result<Vec<ActiveTrade>> {
        let trades = sqlx::query_as::<_, ActiveTrade>(
            "SELECT id, symbol, buy_price, quantity, created_at
             FROM active_trades ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(trades)
    }

    async fn remove_active_trade(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM active_trades WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn log_completed_trade(
        &self,
        symbol: &str,
        buy_price: f64,
        sell_price: f64,
        quantity: f64,
        profit_loss: f64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO completed_trades (symbol, buy_price, sell_price, quantity, profit_loss)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(symbol)
        .bind(buy_price)
        .bind(sell_price)
        .bind(quantity)
        .bind(profit_loss)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn total_realized_pnl(&self) -> Result<f64> {
        let total: f64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(profit_loss), 0.0) FROM completed_trades")
                .fetch_one(&self.pool)
                .await?;
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn missing_trade_is_none_not_error() {
        let store = memory_store().await;
        assert!(store.active_trade("BTCUSDT").await.unwrap().is_none());
        assert!(store.active_trades("BTCUSDT").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lots_come_back_oldest_first() {
        let store = memory_store().await;
        let first = store.log_active_trade("BTCUSDT", 100.0, 0.5).await.unwrap();
        let second = store.log_active_trade("BTCUSDT", 105.0, 0.3).await.unwrap();
        store.log_active_trade("ETHUSDT", 10.0, 2.0).await.unwrap();

        let lots = store.active_trades("BTCUSDT").await.unwrap();
        assert_eq!(lots.len(), 2);
        assert_eq!(lots[0].id, first);
        assert_eq!(lots[1].id, second);

        let oldest = store.active_trade("BTCUSDT").await.unwrap().unwrap();
        assert_eq!(oldest.id, first);
        assert_eq!(oldest.buy_price, 100.0);

        assert_eq!(store.all_active_trades().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn removing_a_lot_deletes_it() {
        let store = memory_store().await;
        let id = store.log_active_trade("BTCUSDT", 100.0, 0.5).await.unwrap();
        store.remove_active_trade(id).await.unwrap();
        assert!(store.active_trade("BTCUSDT").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn realized_pnl_sums_completed_trades() {
        let store = memory_store().await;
        assert_eq!(store.total_realized_pnl().await.unwrap(), 0.0);

        store
            .log_completed_trade("BTCUSDT", 100.0, 110.0, 0.5, 5.0)
            .await
            .unwrap();
        store
            .log_completed_trade("ETHUSDT", 10.0, 9.0, 1.0, -1.0)
            .await
            .unwrap();

        let total = store.total_realized_pnl().await.unwrap();
        assert!((total - 4.0).abs() < 1e-9);
    }
}
