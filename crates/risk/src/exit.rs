use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

/// Why an exit evaluation decided to sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDecision {
    Hold,
    /// Price fell off the high-water mark by more than the configured margin.
    SellFallOff,
    /// Profit over the entry price exceeded the desired-profit threshold.
    SellTakeProfit,
}

impl ExitDecision {
    pub fn is_sell(self) -> bool {
        !matches!(self, ExitDecision::Hold)
    }
}

/// Forced-exit rules for an open position on the candle-polling path.
///
/// Owns the per-symbol high-water-mark book. Evaluation updates the mark but
/// never clears it; the trading loop calls [`ExitPolicy::clear`] once the
/// position is actually closed, so a sell order that fails to fill keeps the
/// mark intact for the next tick.
pub struct ExitPolicy {
    /// Commission rate used for the breakeven price (0.001 = 0.1%).
    pub fee_rate: f64,
    /// Profit margin percentage over the entry price that triggers a sell.
    pub desired_profit_pct: f64,
    /// Percentage drop from the high-water mark that triggers a sell.
    /// `None` disables the trailing rule.
    pub fall_off_margin_pct: Option<f64>,
    high_water: RwLock<HashMap<String, f64>>,
}

impl ExitPolicy {
    pub fn new(fee_rate: f64, desired_profit_pct: f64, fall_off_margin_pct: Option<f64>) -> Self {
        Self {
            fee_rate,
            desired_profit_pct,
            fall_off_margin_pct,
            high_water: RwLock::new(HashMap::new()),
        }
    }

    /// Evaluate the exit rules for one open position.
    ///
    /// Rule precedence: fall-off from the high-water mark, then never-sell
    /// below breakeven, then take-profit. Calling twice with the same price
    /// returns the same decision and leaves the mark unchanged.
    pub async fn evaluate(&self, symbol: &str, buy_price: f64, current_price: f64) -> ExitDecision {
        let mark = self.update_mark(symbol, buy_price, current_price).await;

        if let Some(margin) = self.fall_off_margin_pct {
            let drop_pct = (mark - current_price) / mark * 100.0;
            if drop_pct > margin {
                debug!(
                    pair = %symbol,
                    mark,
                    price = current_price,
                    drop_pct,
                    "Fall-off margin breached"
                );
                return ExitDecision::SellFallOff;
            }
        }

        let breakeven = buy_price * (1.0 + self.fee_rate);
        if current_price < breakeven {
            return ExitDecision::Hold;
        }

        let profit_pct = (current_price - buy_price) / buy_price * 100.0;
        if profit_pct > self.desired_profit_pct {
            return ExitDecision::SellTakeProfit;
        }

        ExitDecision::Hold
    }

    /// Current high-water mark for a symbol, if a position is tracked.
    pub async fn high_water_mark(&self, symbol: &str) -> Option<f64> {
        self.high_water.read().await.get(symbol).copied()
    }

    /// Forget the high-water mark once the position is closed.
    pub async fn clear(&self, symbol: &str) {
        self.high_water.write().await.remove(symbol);
    }

    async fn update_mark(&self, symbol: &str, buy_price: f64, current_price: f64) -> f64 {
        let mut book = self.high_water.write().await;
        let mark = book.entry(symbol.to_string()).or_insert(buy_price);
        if current_price > *mark {
            *mark = current_price;
        }
        *mark
    }
}

/// Forced-exit rule for the price-polling (spike) path.
///
/// Sells a lot as soon as the price touches breakeven or drops from the
/// high-water mark by the configured threshold. The mark survives a failed
/// sell attempt; the loop clears it once no lots remain open.
pub struct SpikeExit {
    pub fee_rate: f64,
    /// Percentage drop from the high-water mark that triggers the sell.
    pub drop_threshold_pct: f64,
    high_water: RwLock<HashMap<String, f64>>,
}

impl SpikeExit {
    pub fn new(fee_rate: f64, drop_threshold_pct: f64) -> Self {
        Self {
            fee_rate,
            drop_threshold_pct,
            high_water: RwLock::new(HashMap::new()),
        }
    }

    /// True when the lot must be sold immediately.
    pub async fn should_sell(&self, symbol: &str, buy_price: f64, current_price: f64) -> bool {
        let mark = {
            let mut book = self.high_water.write().await;
            let mark = book.entry(symbol.to_string()).or_insert(buy_price);
            if current_price > *mark {
                *mark = current_price;
            }
            *mark
        };

        let breakeven = buy_price * (1.0 + self.fee_rate);
        let drop_pct = (mark - current_price) / mark * 100.0;

        current_price <= breakeven || drop_pct >= self.drop_threshold_pct
    }

    /// Forget the high-water mark once all lots for the symbol are closed.
    pub async fn clear(&self, symbol: &str) {
        self.high_water.write().await.remove(symbol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn holds_below_breakeven() {
        let policy = ExitPolicy::new(0.001, 5.0, None);
        // 100.05 is above entry but below breakeven 100.1
        let decision = policy.evaluate("BTCUSDT", 100.0, 100.05).await;
        assert_eq!(decision, ExitDecision::Hold);
    }

    #[tokio::test]
    async fn takes_profit_above_threshold() {
        let policy = ExitPolicy::new(0.001, 5.0, None);
        let decision = policy.evaluate("BTCUSDT", 100.0, 106.0).await;
        assert_eq!(decision, ExitDecision::SellTakeProfit);
    }

    #[tokio::test]
    async fn fall_off_takes_precedence_over_take_profit() {
        let policy = ExitPolicy::new(0.001, 5.0, Some(2.0));

        // Price path 100 -> 110 -> 107
        let _ = policy.evaluate("BTCUSDT", 100.0, 100.0).await;
        let _ = policy.evaluate("BTCUSDT", 100.0, 110.0).await;
        assert_eq!(policy.high_water_mark("BTCUSDT").await, Some(110.0));

        // 107 is 2.7% off the mark and still 7% in profit: fall-off wins.
        let decision = policy.evaluate("BTCUSDT", 100.0, 107.0).await;
        assert_eq!(decision, ExitDecision::SellFallOff);
    }

    #[tokio::test]
    async fn evaluation_is_idempotent_without_price_change() {
        let policy = ExitPolicy::new(0.001, 50.0, Some(2.0));

        let first = policy.evaluate("ETHUSDT", 100.0, 101.0).await;
        let mark = policy.high_water_mark("ETHUSDT").await;
        let second = policy.evaluate("ETHUSDT", 100.0, 101.0).await;

        assert_eq!(first, second);
        assert_eq!(policy.high_water_mark("ETHUSDT").await, mark);
    }

    #[tokio::test]
    async fn clear_forgets_the_mark() {
        let policy = ExitPolicy::new(0.001, 5.0, Some(2.0));
        let _ = policy.evaluate("BTCUSDT", 100.0, 120.0).await;
        policy.clear("BTCUSDT").await;
        assert_eq!(policy.high_water_mark("BTCUSDT").await, None);
    }

    #[tokio::test]
    async fn spike_exit_sells_at_breakeven() {
        let exit = SpikeExit::new(0.001, 0.5);
        // Current price equals breakeven exactly
        assert!(exit.should_sell("DOGEUSDT", 100.0, 100.1).await);
    }

    #[tokio::test]
    async fn spike_exit_sells_on_drop_from_mark() {
        let exit = SpikeExit::new(0.001, 0.5);
        assert!(!exit.should_sell("DOGEUSDT", 100.0, 102.0).await);
        // 101.0 is 0.98% below the 102.0 mark but well above breakeven
        assert!(exit.should_sell("DOGEUSDT", 100.0, 101.0).await);
    }

    #[tokio::test]
    async fn spike_exit_holds_while_climbing() {
        let exit = SpikeExit::new(0.001, 0.5);
        assert!(!exit.should_sell("DOGEUSDT", 100.0, 101.0).await);
        assert!(!exit.should_sell("DOGEUSDT", 100.0, 102.0).await);
        assert!(!exit.should_sell("DOGEUSDT", 100.0, 103.0).await);
    }
}
