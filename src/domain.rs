// ===============================
// src/domain.rs
// ===============================
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{BotError, BotResult};
use crate::quoting::Quote;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side { Buy, Sell }

impl Side {
    /// Wire representation used by the venue.
    pub fn as_str(&self) -> &'static str {
        match self { Side::Buy => "BUY", Side::Sell => "SELL" }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Resting limit order. Never mutated after creation; fills are all-or-nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub symbol: String,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub ts_ms: i64,
}

impl Order {
    /// Quote-asset value of the order at its own limit.
    pub fn notional(&self) -> Decimal { self.price * self.quantity }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill { pub order_id: u64, pub symbol: String, pub side: Side, pub quantity: Decimal, pub price: Decimal }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedOrder { pub order_id: String, pub side: Side, pub price: Decimal, pub quantity: Decimal }

/// Holdings used for quoting and valuation (free + locked).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Inventory { pub base: Decimal, pub quote: Decimal }

impl Inventory {
    /// Mark-to-market value in quote currency.
    pub fn valuation(&self, mid: Decimal) -> Decimal { self.quote + self.base * mid }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelOutcome { pub cancelled: usize, pub message: String }

/// Order book as delivered by a market data source: sides may be missing.
/// Levels are `[price, qty]`, exchanges send them as strings or numbers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawOrderBook {
    #[serde(default)]
    pub bids: Option<Vec<Vec<serde_json::Value>>>,
    #[serde(default)]
    pub asks: Option<Vec<Vec<serde_json::Value>>>,
}

impl RawOrderBook {
    pub fn from_top(best_bid: Decimal, best_ask: Decimal) -> Self {
        let level = |px: Decimal| vec![serde_json::Value::String(px.to_string()), serde_json::Value::String("1".into())];
        Self { bids: Some(vec![level(best_bid)]), asks: Some(vec![level(best_ask)]) }
    }
}

/// Top-of-book snapshot. Only constructed through validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot { pub best_bid: Decimal, pub best_ask: Decimal }

impl BookSnapshot {
    pub fn new(best_bid: Decimal, best_ask: Decimal) -> BotResult<Self> {
        if best_bid <= Decimal::ZERO || best_ask <= Decimal::ZERO {
            return Err(BotError::InvalidMarketData(format!(
                "non-positive top of book: bid={best_bid} ask={best_ask}"
            )));
        }
        Ok(Self { best_bid, best_ask })
    }

    pub fn from_raw(raw: &RawOrderBook) -> BotResult<Self> {
        let bid = top_price(raw.bids.as_deref(), "bids")?;
        let ask = top_price(raw.asks.as_deref(), "asks")?;
        Self::new(bid, ask)
    }

    pub fn mid(&self) -> Decimal { (self.best_bid + self.best_ask) / Decimal::TWO }
}

fn top_price(side: Option<&[Vec<serde_json::Value>]>, name: &str) -> BotResult<Decimal> {
    let levels = side.ok_or_else(|| BotError::InvalidMarketData(format!("missing {name}")))?;
    let first = levels
        .first()
        .and_then(|lvl| lvl.first())
        .ok_or_else(|| BotError::InvalidMarketData(format!("empty {name}")))?;
    let parsed = match first {
        serde_json::Value::String(s) => Decimal::from_str(s.trim()).ok(),
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    };
    parsed.ok_or_else(|| BotError::InvalidMarketData(format!("unparseable {name} price: {first}")))
}

// Journal events (recorder)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleRecord {
    pub ts_ms: i64,
    pub cycle: u64,
    pub mid: Option<Decimal>,
    pub portfolio_value: Option<Decimal>,
    pub pnl: Option<Decimal>,
    pub outcome: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    Quote(Quote),
    Placed(PlacedOrder),
    PlaceFailed { side: Side, reason: String },
    Fill(Fill),
    Cycle(CycleRecord),
    Note(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn snapshot_from_exchange_payload() {
        let raw: RawOrderBook = serde_json::from_str(
            r#"{"lastUpdateId":1,"bids":[["65.00","3.1"],["64.99","1"]],"asks":[["65.10","2"]]}"#,
        )
        .unwrap();
        let snap = BookSnapshot::from_raw(&raw).unwrap();
        assert_eq!(snap.best_bid, dec!(65.00));
        assert_eq!(snap.best_ask, dec!(65.10));
        assert_eq!(snap.mid(), dec!(65.05));
    }

    #[test]
    fn numeric_levels_are_accepted() {
        let raw: RawOrderBook = serde_json::from_str(r#"{"bids":[[10.5, 1]],"asks":[[10.7, 2]]}"#).unwrap();
        assert_eq!(BookSnapshot::from_raw(&raw).unwrap().mid(), dec!(10.6));
    }

    #[test]
    fn missing_asks_is_invalid_market_data() {
        let raw: RawOrderBook = serde_json::from_str(r#"{"bids":[["65.00","1"]]}"#).unwrap();
        let err = BookSnapshot::from_raw(&raw).unwrap_err();
        assert!(matches!(err, BotError::InvalidMarketData(ref m) if m.contains("asks")));
    }

    #[test]
    fn empty_side_is_invalid_market_data() {
        let raw: RawOrderBook = serde_json::from_str(r#"{"bids":[],"asks":[["65.1","1"]]}"#).unwrap();
        assert!(matches!(BookSnapshot::from_raw(&raw), Err(BotError::InvalidMarketData(_))));
    }

    #[test]
    fn garbage_price_is_invalid_market_data() {
        let raw: RawOrderBook = serde_json::from_str(r#"{"bids":[["abc","1"]],"asks":[["65.1","1"]]}"#).unwrap();
        assert!(matches!(BookSnapshot::from_raw(&raw), Err(BotError::InvalidMarketData(_))));
        assert!(BookSnapshot::new(dec!(0), dec!(1)).is_err());
    }
}
