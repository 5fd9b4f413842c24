// ===============================
// src/feed.rs
// ===============================
//
// Market Data adapters:
// - MockFeed : seeded random walk (tick 0.01), no network
// - MexcFeed : MEXC spot REST (`/api/v3/depth`, `/api/v3/ticker/price`)
//
// Notes:
// - Adapters return the raw book; validation into a BookSnapshot happens in
//   domain so every source is judged by the same rules.
// - Transport/HTTP failures are TransientVenue (retry after backoff).
//
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::str::FromStr;
use tracing::debug;

use crate::config::MexcCfg;
use crate::domain::RawOrderBook;
use crate::error::{BotError, BotResult};
use crate::metrics::BOOK_FETCHES;

#[async_trait]
pub trait MarketDataSource: Send {
    fn name(&self) -> &'static str;
    async fn get_order_book(&mut self, symbol: &str) -> BotResult<RawOrderBook>;
    async fn get_last_trade_price(&mut self, symbol: &str) -> BotResult<Decimal>;
}

/// Generator market data mock (random walk)
pub struct MockFeed {
    bid: Decimal,
    last: Decimal,
    rng: StdRng,
}

impl MockFeed {
    const TICK: Decimal = dec!(0.01);

    pub fn new(start_price: Decimal, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self { bid: start_price, last: start_price, rng }
    }
}

#[async_trait]
impl MarketDataSource for MockFeed {
    fn name(&self) -> &'static str { "mock" }

    async fn get_order_book(&mut self, _symbol: &str) -> BotResult<RawOrderBook> {
        let step: i64 = self.rng.gen_range(-3..=3);
        self.bid = (self.bid + Self::TICK * Decimal::from(step)).max(Self::TICK);
        let ask = self.bid + Self::TICK;
        self.last = if self.rng.gen_bool(0.5) { self.bid } else { ask };
        BOOK_FETCHES.with_label_values(&["mock", "ok"]).inc();
        Ok(RawOrderBook::from_top(self.bid, ask))
    }

    async fn get_last_trade_price(&mut self, _symbol: &str) -> BotResult<Decimal> {
        Ok(self.last)
    }
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

/// MEXC spot public REST (read-only).
pub struct MexcFeed {
    http: reqwest::Client,
    rest_base: String,
    depth: u32,
}

impl MexcFeed {
    pub fn new(cfg: &MexcCfg, depth: u32) -> BotResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| BotError::Config(format!("http client: {e}")))?;
        Ok(Self { http, rest_base: cfg.rest_url.trim_end_matches('/').to_string(), depth })
    }
}

#[async_trait]
impl MarketDataSource for MexcFeed {
    fn name(&self) -> &'static str { "mexc" }

    async fn get_order_book(&mut self, symbol: &str) -> BotResult<RawOrderBook> {
        let url = format!("{}/api/v3/depth", self.rest_base);
        let limit = self.depth.to_string();
        let rsp = self
            .http
            .get(url)
            .query(&[("symbol", symbol), ("limit", limit.as_str())])
            .send()
            .await
            .map_err(|e| {
                BOOK_FETCHES.with_label_values(&["mexc", "transport"]).inc();
                BotError::from(e)
            })?;

        let code = rsp.status();
        if !code.is_success() {
            BOOK_FETCHES.with_label_values(&["mexc", "http"]).inc();
            let body = rsp.text().await.unwrap_or_default();
            return Err(BotError::TransientVenue(format!("depth {code}: {body}")));
        }

        // body bukan JSON yang kita kenal -> data rusak, bukan error jaringan
        let text = rsp.text().await?;
        let book = serde_json::from_str::<RawOrderBook>(&text).map_err(|e| {
            BOOK_FETCHES.with_label_values(&["mexc", "malformed"]).inc();
            BotError::InvalidMarketData(format!("depth body: {e}"))
        })?;
        BOOK_FETCHES.with_label_values(&["mexc", "ok"]).inc();
        debug!(symbol, "depth fetched");
        Ok(book)
    }

    async fn get_last_trade_price(&mut self, symbol: &str) -> BotResult<Decimal> {
        let url = format!("{}/api/v3/ticker/price", self.rest_base);
        let rsp = self.http.get(url).query(&[("symbol", symbol)]).send().await?;
        let code = rsp.status();
        if !code.is_success() {
            return Err(BotError::TransientVenue(format!("ticker {code}")));
        }
        let t: TickerPrice = rsp
            .json()
            .await
            .map_err(|e| BotError::InvalidMarketData(format!("ticker body: {e}")))?;
        Decimal::from_str(t.price.trim())
            .map_err(|_| BotError::InvalidMarketData(format!("ticker price {:?}", t.price)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BookSnapshot;

    #[tokio::test]
    async fn mock_feed_produces_valid_books() {
        let mut feed = MockFeed::new(dec!(65), Some(7));
        for _ in 0..200 {
            let raw = feed.get_order_book("LTCUSDT").await.unwrap();
            let snap = BookSnapshot::from_raw(&raw).unwrap();
            assert_eq!(snap.best_ask - snap.best_bid, dec!(0.01));
            let last = feed.get_last_trade_price("LTCUSDT").await.unwrap();
            assert!(last == snap.best_bid || last == snap.best_ask);
        }
    }

    #[tokio::test]
    async fn mock_feed_is_deterministic_with_seed() {
        let mut a = MockFeed::new(dec!(65), Some(42));
        let mut b = MockFeed::new(dec!(65), Some(42));
        for _ in 0..20 {
            let sa = BookSnapshot::from_raw(&a.get_order_book("X").await.unwrap()).unwrap();
            let sb = BookSnapshot::from_raw(&b.get_order_book("X").await.unwrap()).unwrap();
            assert_eq!(sa, sb);
        }
    }
}
