// ===============================
// src/matching.rs (simulated fills vs top-of-book)
// ===============================
use rust_decimal::Decimal;
use tracing::{error, info};

use crate::domain::{BookSnapshot, Fill, Order, Side};
use crate::error::{BotError, BotResult};
use crate::ledger::Ledger;

/// Price at which `order` would trade against `book`, if it crosses.
/// BUY walks up to the best ask, SELL hits the best bid; never the order's own limit.
pub fn crossing_price(order: &Order, book: &BookSnapshot) -> Option<Decimal> {
    match order.side {
        Side::Buy if order.price >= book.best_ask => Some(book.best_ask),
        Side::Sell if order.price <= book.best_bid => Some(book.best_bid),
        _ => None,
    }
}

/// Evaluate every resting order independently against `book`.
/// Filled orders are settled in the ledger and removed; the rest stay untouched.
pub fn match_resting(book: &BookSnapshot, resting: &mut Vec<Order>, ledger: &mut Ledger) -> Vec<Fill> {
    let mut fills = Vec::new();
    resting.retain(|order| {
        let Some(fill_price) = crossing_price(order, book) else {
            return true;
        };
        match settle(order, fill_price, ledger) {
            Ok(()) => {
                info!(
                    order_id = order.id,
                    side = %order.side,
                    qty = %order.quantity,
                    limit = %order.price,
                    px = %fill_price,
                    "FILLED"
                );
                fills.push(Fill {
                    order_id: order.id,
                    symbol: order.symbol.clone(),
                    side: order.side,
                    quantity: order.quantity,
                    price: fill_price,
                });
                false
            }
            Err(e) => {
                // seharusnya tidak terjadi: reservasi dibuat saat order dipasang
                error!(order_id = order.id, ?e, "fill settlement rejected by ledger, order kept");
                true
            }
        }
    });
    fills
}

fn settle(order: &Order, fill_price: Decimal, ledger: &mut Ledger) -> BotResult<()> {
    if order.side == Side::Buy {
        // reserved at limit, paid at the ask: the difference goes back to free quote
        let reserved = ledger.locked(ledger.quote_asset());
        if reserved < order.notional() {
            return Err(BotError::InsufficientBalance {
                asset: format!("{} (locked)", ledger.quote_asset()),
                requested: order.notional(),
                available: reserved,
            });
        }
        ledger.credit_on_fill(order.side, order.quantity, fill_price)?;
        return ledger.release(Side::Buy, (order.price - fill_price) * order.quantity);
    }
    ledger.credit_on_fill(order.side, order.quantity, fill_price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order(id: u64, side: Side, price: Decimal, qty: Decimal) -> Order {
        Order { id, symbol: "LTCUSDT".into(), side, price, quantity: qty, ts_ms: 0 }
    }

    fn funded_ledger(orders: &[Order]) -> Ledger {
        let mut l = Ledger::new("LTC", "USDT", &[("USDT".into(), dec!(1000)), ("LTC".into(), dec!(10))]).unwrap();
        for o in orders {
            match o.side {
                Side::Buy => l.reserve_for_buy(o.notional()).unwrap(),
                Side::Sell => l.reserve_for_sell(o.quantity).unwrap(),
            }
        }
        l
    }

    #[test]
    fn buy_fills_at_best_ask_not_at_limit() {
        // skenario B: BUY 65.20, ask turun ke 65.10
        let mut resting = vec![order(1, Side::Buy, dec!(65.20), dec!(0.5))];
        let mut l = funded_ledger(&resting);
        let quote_before = l.quote_total();
        let book = BookSnapshot::new(dec!(65.00), dec!(65.10)).unwrap();

        let fills = match_resting(&book, &mut resting, &mut l);

        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].price, dec!(65.10));
        assert!(resting.is_empty());
        assert_eq!(l.base_total(), dec!(10.5));
        assert_eq!(quote_before - l.quote_total(), dec!(0.5) * dec!(65.10));
        assert_eq!(l.locked("USDT"), dec!(0));
    }

    #[test]
    fn sell_fills_at_best_bid() {
        let mut resting = vec![order(2, Side::Sell, dec!(64.90), dec!(1))];
        let mut l = funded_ledger(&resting);
        let book = BookSnapshot::new(dec!(65.00), dec!(65.10)).unwrap();

        let fills = match_resting(&book, &mut resting, &mut l);

        assert_eq!(fills[0].price, dec!(65.00));
        assert_eq!(l.free("USDT"), dec!(1065.00));
        assert_eq!(l.base_total(), dec!(9));
    }

    #[test]
    fn limit_equal_to_touch_fills() {
        let b = order(1, Side::Buy, dec!(65.10), dec!(1));
        let s = order(2, Side::Sell, dec!(65.00), dec!(1));
        let book = BookSnapshot::new(dec!(65.00), dec!(65.10)).unwrap();
        assert_eq!(crossing_price(&b, &book), Some(dec!(65.10)));
        assert_eq!(crossing_price(&s, &book), Some(dec!(65.00)));
    }

    #[test]
    fn non_crossing_orders_stay_resting() {
        let mut resting = vec![
            order(1, Side::Buy, dec!(64.80), dec!(0.1)),
            order(2, Side::Sell, dec!(65.40), dec!(0.1)),
        ];
        let mut l = funded_ledger(&resting);
        let snapshot = l.balances();
        let book = BookSnapshot::new(dec!(65.00), dec!(65.10)).unwrap();

        let fills = match_resting(&book, &mut resting, &mut l);

        assert!(fills.is_empty());
        assert_eq!(resting.len(), 2);
        assert_eq!(l.balances(), snapshot);
    }

    #[test]
    fn orders_are_evaluated_independently() {
        let mut resting = vec![
            order(1, Side::Buy, dec!(64.80), dec!(0.1)),
            order(2, Side::Sell, dec!(64.90), dec!(0.1)),
        ];
        let mut l = funded_ledger(&resting);
        let book = BookSnapshot::new(dec!(65.00), dec!(65.10)).unwrap();

        let fills = match_resting(&book, &mut resting, &mut l);

        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].order_id, 2);
        assert_eq!(resting[0].id, 1);
    }

    #[test]
    fn unreserved_order_is_kept_when_ledger_rejects() {
        let mut resting = vec![order(9, Side::Sell, dec!(60), dec!(1))];
        let mut l = Ledger::new("LTC", "USDT", &[("USDT".into(), dec!(10))]).unwrap();
        let book = BookSnapshot::new(dec!(65.00), dec!(65.10)).unwrap();

        let fills = match_resting(&book, &mut resting, &mut l);

        assert!(fills.is_empty());
        assert_eq!(resting.len(), 1);
        assert_eq!(l.free("USDT"), dec!(10));
    }
}
