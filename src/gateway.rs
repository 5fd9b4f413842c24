// ===============================
// src/gateway.rs (venue trait + simulated venue)
// ===============================
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::domain::{BookSnapshot, CancelOutcome, Fill, Inventory, Order, PlacedOrder, Side};
use crate::error::{BotError, BotResult};
use crate::ledger::Ledger;
use crate::matching::match_resting;
use crate::metrics::{EXECS, FILLS};

/// Capability set shared by the simulated and the live venue.
#[async_trait]
pub trait ExecutionVenue: Send {
    fn name(&self) -> &'static str;

    async fn place_order(&mut self, symbol: &str, side: Side, price: Decimal, quantity: Decimal)
        -> BotResult<PlacedOrder>;

    /// Idempotent: cancelling with nothing resting is a successful no-op.
    async fn cancel_all_orders(&mut self, symbol: &str) -> BotResult<CancelOutcome>;

    /// Base/quote holdings including capital locked in resting orders.
    async fn inventory(&mut self) -> BotResult<Inventory>;

    /// Simulated venues match resting orders against the snapshot; live venues report nothing.
    fn check_fills(&mut self, _book: &BookSnapshot) -> Vec<Fill> {
        Vec::new()
    }

    /// Local balance ledger, only known in simulation.
    fn ledger(&self) -> Option<&Ledger> {
        None
    }

    fn resting_orders(&self) -> usize {
        0
    }
}

/// Paper venue: debit at placement, credit at fill, release at cancel.
pub struct SimulatedVenue {
    ledger: Ledger,
    open_orders: Vec<Order>,
    next_id: u64,
}

impl SimulatedVenue {
    pub fn new(ledger: Ledger) -> Self {
        info!(balances = ?ledger.balances(), "simulated venue initialised");
        Self { ledger, open_orders: Vec::new(), next_id: 1 }
    }

    pub fn open_orders(&self) -> &[Order] { &self.open_orders }
}

#[async_trait]
impl ExecutionVenue for SimulatedVenue {
    fn name(&self) -> &'static str { "simulated" }

    async fn place_order(
        &mut self,
        symbol: &str,
        side: Side,
        price: Decimal,
        quantity: Decimal,
    ) -> BotResult<PlacedOrder> {
        if price <= Decimal::ZERO || quantity <= Decimal::ZERO {
            EXECS.with_label_values(&["invalid", side.as_str()]).inc();
            return Err(BotError::InvalidOrder(format!("price {price} / qty {quantity} must be positive")));
        }

        let reserved = match side {
            Side::Buy => self.ledger.reserve_for_buy(price * quantity),
            Side::Sell => self.ledger.reserve_for_sell(quantity),
        };
        if let Err(e) = reserved {
            EXECS.with_label_values(&["rejected", side.as_str()]).inc();
            warn!(%side, %price, qty = %quantity, error = %e, "simulated order rejected");
            return Err(e);
        }

        let order = Order {
            id: self.next_id,
            symbol: symbol.to_string(),
            side,
            price,
            quantity,
            ts_ms: Utc::now().timestamp_millis(),
        };
        self.next_id += 1;
        info!(
            order_id = order.id,
            %side,
            %price,
            qty = %quantity,
            free_quote = %self.ledger.free(self.ledger.quote_asset()),
            free_base = %self.ledger.free(self.ledger.base_asset()),
            "simulated order placed"
        );
        EXECS.with_label_values(&["placed", side.as_str()]).inc();
        let placed = PlacedOrder { order_id: order.id.to_string(), side, price, quantity };
        self.open_orders.push(order);
        Ok(placed)
    }

    async fn cancel_all_orders(&mut self, _symbol: &str) -> BotResult<CancelOutcome> {
        let cancelled = self.open_orders.len();
        for o in self.open_orders.drain(..) {
            let amount = match o.side {
                Side::Buy => o.notional(),
                Side::Sell => o.quantity,
            };
            // locked dikembalikan ke free
            if let Err(e) = self.ledger.release(o.side, amount) {
                warn!(order_id = o.id, ?e, "release on cancel failed");
            }
        }
        if cancelled > 0 {
            EXECS.with_label_values(&["cancelled", "all"]).inc_by(cancelled as u64);
        }
        Ok(CancelOutcome { cancelled, message: format!("{cancelled} simulated orders cancelled") })
    }

    async fn inventory(&mut self) -> BotResult<Inventory> {
        Ok(Inventory { base: self.ledger.base_total(), quote: self.ledger.quote_total() })
    }

    fn check_fills(&mut self, book: &BookSnapshot) -> Vec<Fill> {
        if self.open_orders.is_empty() {
            return Vec::new();
        }
        let fills = match_resting(book, &mut self.open_orders, &mut self.ledger);
        for f in &fills {
            FILLS.with_label_values(&[f.side.as_str()]).inc();
        }
        fills
    }

    fn ledger(&self) -> Option<&Ledger> { Some(&self.ledger) }

    fn resting_orders(&self) -> usize { self.open_orders.len() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn venue(usdt: Decimal, ltc: Decimal) -> SimulatedVenue {
        SimulatedVenue::new(Ledger::new("LTC", "USDT", &[("USDT".into(), usdt), ("LTC".into(), ltc)]).unwrap())
    }

    #[tokio::test]
    async fn ids_are_monotonic() {
        let mut v = venue(dec!(1000), dec!(10));
        let a = v.place_order("LTCUSDT", Side::Buy, dec!(64), dec!(0.1)).await.unwrap();
        let b = v.place_order("LTCUSDT", Side::Sell, dec!(66), dec!(0.1)).await.unwrap();
        v.cancel_all_orders("LTCUSDT").await.unwrap();
        let c = v.place_order("LTCUSDT", Side::Buy, dec!(64), dec!(0.1)).await.unwrap();
        assert_eq!((a.order_id.as_str(), b.order_id.as_str(), c.order_id.as_str()), ("1", "2", "3"));
    }

    #[tokio::test]
    async fn insufficient_balance_rejects_without_resting() {
        let mut v = venue(dec!(5), dec!(0));
        let err = v.place_order("LTCUSDT", Side::Buy, dec!(65), dec!(0.1)).await.unwrap_err();
        assert!(matches!(err, BotError::InsufficientBalance { .. }));
        assert!(v.place_order("LTCUSDT", Side::Sell, dec!(65), dec!(0.1)).await.is_err());
        assert_eq!(v.resting_orders(), 0);
        assert_eq!(v.ledger().unwrap().free("USDT"), dec!(5));
    }

    #[tokio::test]
    async fn cancel_on_empty_set_is_noop_success() {
        let mut v = venue(dec!(100), dec!(1));
        let before = v.ledger().unwrap().balances();
        let out = v.cancel_all_orders("LTCUSDT").await.unwrap();
        assert_eq!(out.cancelled, 0);
        assert_eq!(v.ledger().unwrap().balances(), before);
    }

    #[tokio::test]
    async fn cancel_releases_reserved_capital() {
        let mut v = venue(dec!(100), dec!(1));
        v.place_order("LTCUSDT", Side::Buy, dec!(64.9), dec!(0.5)).await.unwrap();
        v.place_order("LTCUSDT", Side::Sell, dec!(65.1), dec!(0.5)).await.unwrap();
        assert_eq!(v.ledger().unwrap().free("USDT"), dec!(67.55));

        let out = v.cancel_all_orders("LTCUSDT").await.unwrap();

        assert_eq!(out.cancelled, 2);
        let l = v.ledger().unwrap();
        assert_eq!(l.free("USDT"), dec!(100));
        assert_eq!(l.free("LTC"), dec!(1));
        assert_eq!(l.locked("USDT"), dec!(0));
    }

    #[tokio::test]
    async fn non_positive_order_is_invalid() {
        let mut v = venue(dec!(100), dec!(1));
        assert!(matches!(
            v.place_order("LTCUSDT", Side::Buy, dec!(0), dec!(1)).await,
            Err(BotError::InvalidOrder(_))
        ));
    }

    #[tokio::test]
    async fn fills_are_checked_before_cancel() {
        let mut v = venue(dec!(100), dec!(1));
        v.place_order("LTCUSDT", Side::Buy, dec!(65.20), dec!(0.1)).await.unwrap();
        v.place_order("LTCUSDT", Side::Sell, dec!(66.00), dec!(0.1)).await.unwrap();

        let fills = v.check_fills(&BookSnapshot::new(dec!(65.00), dec!(65.10)).unwrap());
        v.cancel_all_orders("LTCUSDT").await.unwrap();

        assert_eq!(fills.len(), 1);
        let l = v.ledger().unwrap();
        assert_eq!(l.free("LTC"), dec!(1.1));
        assert_eq!(l.free("USDT"), dec!(100) - dec!(6.51));
        assert_eq!(l.locked("LTC"), dec!(0));
    }

    #[tokio::test]
    async fn inventory_includes_locked_capital() {
        let mut v = venue(dec!(100), dec!(1));
        v.place_order("LTCUSDT", Side::Buy, dec!(60), dec!(1)).await.unwrap();
        let inv = v.inventory().await.unwrap();
        assert_eq!(inv, Inventory { base: dec!(1), quote: dec!(100) });
        assert_eq!(inv.valuation(dec!(65)), dec!(165));
    }
}
