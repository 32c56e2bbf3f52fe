use common::PairMeta;

/// Base-asset quantity for a BUY: commit `trade_fraction` of the quote
/// balance, corrected up to meet the minimum notional when the initial size
/// falls short. The result is floored to the lot step; when that flooring
/// drops the corrected size back below the notional, one step is added back
/// (still bounded by the quote balance). `None` when the balance cannot
/// cover the minimum notional at all.
pub fn buy_quantity(
    quote_balance: f64,
    current_price: f64,
    trade_fraction: f64,
    meta: &PairMeta,
) -> Option<f64> {
    if current_price <= 0.0 || quote_balance <= 0.0 {
        return None;
    }

    let quote_amount = (quote_balance * trade_fraction).min(quote_balance);
    let mut quantity = floor_to_step(quote_amount / current_price, meta.lot_step);

    if quantity * current_price < meta.min_notional {
        if quote_balance < meta.min_notional {
            return None;
        }
        quantity = floor_to_step(meta.min_notional / current_price, meta.lot_step);
        if quantity * current_price < meta.min_notional {
            quantity += meta.lot_step;
        }
        if quantity * current_price > quote_balance {
            return None;
        }
    }
    if quantity <= 0.0 {
        return None;
    }

    Some(quantity)
}

/// Base-asset quantity for a SELL: the full base balance floored to the lot
/// step. A balance whose notional falls below the minimum cannot be raised
/// (there is nothing more to sell), so it aborts with `None`.
pub fn sell_quantity(base_balance: f64, current_price: f64, meta: &PairMeta) -> Option<f64> {
    if current_price <= 0.0 || base_balance <= 0.0 {
        return None;
    }

    let quantity = floor_to_step(base_balance, meta.lot_step);
    if quantity <= 0.0 || quantity * current_price < meta.min_notional {
        return None;
    }

    Some(quantity)
}

/// Quantity for a spike-entry market BUY: exactly the minimum notional,
/// bounded by the quote balance. Flooring to the lot step can undershoot the
/// notional, so one extra step is added back when it does.
pub fn spike_entry_quantity(quote_balance: f64, current_price: f64, meta: &PairMeta) -> Option<f64> {
    if current_price <= 0.0 || quote_balance < meta.min_notional {
        return None;
    }

    let mut quantity = floor_to_step(meta.min_notional / current_price, meta.lot_step);
    if quantity * current_price < meta.min_notional {
        quantity += meta.lot_step;
    }
    if quantity * current_price > quote_balance {
        return None;
    }

    Some(quantity)
}

/// Floor a quantity to the exchange lot-size step. A non-positive step
/// leaves the value untouched.
pub fn floor_to_step(quantity: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return quantity;
    }
    (quantity / step).floor() * step
}

/// Floor a price to the exchange tick size. A non-positive tick leaves the
/// value untouched.
pub fn floor_to_tick(price: f64, tick: f64) -> f64 {
    if tick <= 0.0 {
        return price;
    }
    (price / tick).floor() * tick
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(min_notional: f64) -> PairMeta {
        PairMeta {
            price_precision: 2,
            qty_precision: 5,
            min_notional,
            lot_step: 0.00001,
            price_tick: 0.01,
        }
    }

    #[test]
    fn buy_commits_a_quarter_of_quote_balance() {
        // 25% of 100 at price 1.0 -> quantity ~25 (floored to the lot step)
        let qty = buy_quantity(100.0, 1.0, 0.25, &meta(5.0)).unwrap();
        assert!(qty <= 25.0);
        assert!(25.0 - qty < 2.0 * 0.00001);
        // never exceeds the quote balance
        assert!(qty * 1.0 <= 100.0);
    }

    #[test]
    fn buy_corrects_up_to_min_notional() {
        // 25% of 60 = 15 quote -> qty 1.5; notional 15 < 50 -> correct to ~5
        let qty = buy_quantity(60.0, 10.0, 0.25, &meta(50.0)).unwrap();
        assert!((qty - 5.0).abs() < 2.0 * 0.00001);
        assert!(qty * 10.0 <= 60.0);
    }

    #[test]
    fn corrected_buy_survives_lot_step_floor() {
        // min_notional / price = 5.0 floors to 4.99999 on the lot step;
        // the compensating step must bring the notional back over the line
        let qty = buy_quantity(60.0, 10.0, 0.25, &meta(50.0)).unwrap();
        assert!(
            qty * 10.0 >= 50.0,
            "submitted notional {} fell below min notional 50",
            qty * 10.0
        );
    }

    #[test]
    fn buy_aborts_when_balance_cannot_reach_min_notional() {
        assert!(buy_quantity(40.0, 10.0, 0.25, &meta(50.0)).is_none());
    }

    #[test]
    fn buy_rejects_degenerate_inputs() {
        assert!(buy_quantity(0.0, 10.0, 0.25, &meta(5.0)).is_none());
        assert!(buy_quantity(100.0, 0.0, 0.25, &meta(5.0)).is_none());
    }

    #[test]
    fn sell_uses_full_base_balance() {
        let qty = sell_quantity(2.0, 100.0, &meta(50.0)).unwrap();
        assert!(qty <= 2.0);
        assert!(2.0 - qty < 2.0 * 0.00001);
    }

    #[test]
    fn sell_below_min_notional_aborts() {
        // 0.4 * 100 = 40 < 50: nothing more to sell, no correction possible
        assert!(sell_quantity(0.4, 100.0, &meta(50.0)).is_none());
        assert!(sell_quantity(0.6, 50.0, &meta(50.0)).is_none());
        // 0.6 * 100 = 60 >= 50: full balance sells as-is
        let qty = sell_quantity(0.6, 100.0, &meta(50.0)).unwrap();
        assert!((qty - 0.6).abs() < 2.0 * 0.00001);
    }

    #[test]
    fn spike_entry_meets_min_notional_exactly() {
        let qty = spike_entry_quantity(100.0, 10.0, &meta(50.0)).unwrap();
        assert!(qty * 10.0 >= 50.0);
        assert!(qty * 10.0 <= 100.0);
    }

    #[test]
    fn spike_entry_aborts_on_thin_balance() {
        assert!(spike_entry_quantity(40.0, 10.0, &meta(50.0)).is_none());
    }

    #[test]
    fn flooring_to_step_and_tick() {
        assert!((floor_to_step(1.23456789, 0.001) - 1.234).abs() < 1e-9);
        assert!((floor_to_tick(123.456, 0.05) - 123.45).abs() < 1e-9);
        // degenerate steps leave values untouched
        assert_eq!(floor_to_step(1.5, 0.0), 1.5);
        assert_eq!(floor_to_tick(1.5, -1.0), 1.5);
    }
}
