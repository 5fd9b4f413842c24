// ===============================
// src/session.rs
// ===============================
//
// Session controller: satu task, satu cycle pada satu waktu.
//   fetch book -> (valid) initial value / last mid / fill check
//   -> cancel-all (selalu, juga saat fetch gagal) -> quote -> place BUY lalu SELL -> PnL + report
// Stop signal diamati di tengah cycle maupun saat sleep; semua jalan keluar
// melewati shutdown() yang melakukan cancel-all terakhir.
//
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::domain::{BookSnapshot, CycleRecord, Event, Fill, Side};
use crate::error::{BotError, BotResult};
use crate::feed::MarketDataSource;
use crate::gateway::ExecutionVenue;
use crate::ledger::AssetBalance;
use crate::metrics::{CYCLES, ERRORS, SHUTDOWN_CANCEL_FAILURES};
use crate::quoting::{compute_quote, Quote};
use crate::recorder::Recorder;
use crate::report;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Running,
    ShuttingDown,
    Stopped,
}

/// Initial value is written once (first valid book); last mid on every valid book.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PnlState {
    pub initial_value: Option<Decimal>,
    pub last_mid: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Quoted { placed: usize, failed: usize },
    /// Book unusable; resting orders were still cancelled.
    Skipped { reason: String },
    /// Quote anomaly (adjusted mid <= 0 or rounded to nothing): nothing placed.
    QuoteAborted { reason: String },
}

impl CycleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CycleOutcome::Quoted { .. } => "quoted",
            CycleOutcome::Skipped { .. } => "skipped",
            CycleOutcome::QuoteAborted { .. } => "quote_aborted",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub outcome: CycleOutcome,
    pub mid: Option<Decimal>,
    pub fills: Vec<Fill>,
    pub quote: Option<Quote>,
    pub portfolio_value: Option<Decimal>,
    pub pnl: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub cycles: u64,
    pub fills: u64,
    pub balances: Option<BTreeMap<String, AssetBalance>>,
    pub initial_value: Option<Decimal>,
    pub final_value: Option<Decimal>,
    pub last_mid: Option<Decimal>,
    pub pnl: Option<Decimal>,
    pub pnl_pct: Option<Decimal>,
    pub cleanup_confirmed: bool,
    pub state: SessionState,
}

pub struct Session {
    cfg: Config,
    feed: Box<dyn MarketDataSource>,
    venue: Box<dyn ExecutionVenue>,
    recorder: Recorder,
    state: SessionState,
    pnl: PnlState,
    cycles: u64,
    fills: u64,
}

impl Session {
    pub fn new(
        cfg: Config,
        feed: Box<dyn MarketDataSource>,
        venue: Box<dyn ExecutionVenue>,
        recorder: Recorder,
    ) -> Self {
        Self {
            cfg,
            feed,
            venue,
            recorder,
            state: SessionState::Running,
            pnl: PnlState::default(),
            cycles: 0,
            fills: 0,
        }
    }

    pub fn state(&self) -> SessionState { self.state }
    pub fn pnl_state(&self) -> &PnlState { &self.pnl }
    pub fn cycles(&self) -> u64 { self.cycles }
    pub fn venue(&self) -> &dyn ExecutionVenue { self.venue.as_ref() }

    /// One full cycle. Errors returned here are transient or unexpected;
    /// book/quote/placement problems are folded into the report.
    pub async fn run_cycle(&mut self) -> BotResult<CycleReport> {
        self.cycles += 1;
        let cycle = self.cycles;
        let symbol = self.cfg.symbol.clone();

        let book = match self.feed.get_order_book(&symbol).await {
            Ok(raw) => BookSnapshot::from_raw(&raw),
            Err(e) => {
                self.cancel_before_backoff(cycle, &symbol).await;
                return Err(e);
            }
        };

        let mut fills = Vec::new();
        if let Ok(b) = &book {
            let mid = b.mid();
            if self.pnl.initial_value.is_none() {
                let inv = match self.venue.inventory().await {
                    Ok(inv) => inv,
                    Err(e) => {
                        self.cancel_before_backoff(cycle, &symbol).await;
                        return Err(e);
                    }
                };
                let initial = inv.valuation(mid);
                self.pnl.initial_value = Some(initial);
                info!(cycle, %mid, initial_value = %initial, "initial portfolio value captured");
            }
            self.pnl.last_mid = Some(mid);

            // resting orders dari cycle sebelumnya diuji dulu sebelum dibatalkan
            fills = self.venue.check_fills(b);
            self.fills += fills.len() as u64;
            for f in &fills {
                self.recorder.record(Event::Fill(f.clone()));
            }
        }

        let cancelled = self.venue.cancel_all_orders(&symbol).await?;
        if cancelled.cancelled > 0 {
            info!(cycle, cancelled = cancelled.cancelled, "resting orders cancelled");
        }

        let book = match book {
            Ok(b) => b,
            Err(e) => {
                ERRORS.with_label_values(&[e.kind()]).inc();
                warn!(cycle, error = %e, "book unusable, cycle skipped");
                let rep = CycleReport {
                    cycle,
                    outcome: CycleOutcome::Skipped { reason: e.to_string() },
                    mid: None,
                    fills,
                    quote: None,
                    portfolio_value: None,
                    pnl: None,
                };
                self.finish_cycle(&rep);
                return Ok(rep);
            }
        };
        let mid = book.mid();

        let inv = self.venue.inventory().await?;
        let (outcome, quote) = match compute_quote(mid, inv.base, inv.quote, &self.cfg.quote) {
            Ok(q) => {
                self.recorder.record(Event::Quote(q.clone()));
                let (placed, failed) = self.place_pair(&symbol, &q).await?;
                (CycleOutcome::Quoted { placed, failed }, Some(q))
            }
            Err(e @ BotError::InvalidQuote { .. }) => {
                ERRORS.with_label_values(&[e.kind()]).inc();
                error!(cycle, %mid, error = %e, "ANOMALY: quote rejected, nothing placed");
                (CycleOutcome::QuoteAborted { reason: e.to_string() }, None)
            }
            Err(e) => return Err(e),
        };

        let value = self.venue.inventory().await?.valuation(mid);
        let pnl = self.pnl.initial_value.map(|init| value - init);

        let rep = CycleReport {
            cycle,
            outcome,
            mid: Some(mid),
            fills,
            quote,
            portfolio_value: Some(value),
            pnl,
        };
        self.finish_cycle(&rep);
        Ok(rep)
    }

    /// Cycle is about to fail: stale quotes must not rest through the backoff.
    async fn cancel_before_backoff(&mut self, cycle: u64, symbol: &str) {
        match self.venue.cancel_all_orders(symbol).await {
            Ok(out) if out.cancelled > 0 => {
                info!(cycle, cancelled = out.cancelled, "resting orders cancelled before backoff")
            }
            Ok(_) => {}
            Err(e) => warn!(cycle, error = %e, "cancel-all before backoff failed"),
        }
    }

    /// BUY first, then SELL. A placement-local failure only costs that side.
    async fn place_pair(&mut self, symbol: &str, q: &Quote) -> BotResult<(usize, usize)> {
        let (mut placed, mut failed) = (0, 0);
        for (side, price) in [(Side::Buy, q.buy_price), (Side::Sell, q.sell_price)] {
            match self.venue.place_order(symbol, side, price, q.quantity).await {
                Ok(p) => {
                    placed += 1;
                    self.recorder.record(Event::Placed(p));
                }
                Err(e) if e.is_placement_local() => {
                    failed += 1;
                    ERRORS.with_label_values(&[e.kind()]).inc();
                    warn!(%side, %price, qty = %q.quantity, error = %e, "order not placed");
                    self.recorder.record(Event::PlaceFailed { side, reason: e.to_string() });
                }
                Err(e) => return Err(e),
            }
        }
        Ok((placed, failed))
    }

    fn finish_cycle(&self, rep: &CycleReport) {
        report::cycle(rep, self.venue.ledger(), self.venue.resting_orders());
        self.recorder.record(Event::Cycle(CycleRecord {
            ts_ms: Utc::now().timestamp_millis(),
            cycle: rep.cycle,
            mid: rep.mid,
            portfolio_value: rep.portfolio_value,
            pnl: rep.pnl,
            outcome: rep.outcome.label().to_string(),
        }));
    }

    /// Main loop until `shutdown` resolves or `max_cycles` is reached, then cleanup.
    pub async fn run<F>(&mut self, shutdown: F) -> SessionSummary
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let symbol = self.cfg.symbol.clone();
        info!(
            %symbol,
            feed = self.feed.name(),
            venue = self.venue.name(),
            interval_ms = self.cfg.cycle_interval.as_millis() as u64,
            max_cycles = ?self.cfg.max_cycles,
            "session started"
        );
        self.recorder.record(Event::Note(format!("session started {symbol}")));

        // harga referensi saja; gagal di sini tidak fatal
        match self.feed.get_last_trade_price(&symbol).await {
            Ok(px) => info!(%symbol, last_trade = %px, "reference price"),
            Err(e) => warn!(%symbol, error = %e, "last trade price unavailable"),
        }

        loop {
            if self.max_cycles_reached() {
                info!(cycles = self.cycles, "max cycles reached");
                break;
            }

            let result = tokio::select! {
                biased;
                _ = &mut shutdown => None,
                r = self.run_cycle() => Some(r),
            };
            let pause = match result {
                None => {
                    info!(cycle = self.cycles, "stop signal received mid-cycle");
                    break;
                }
                Some(Ok(_)) => self.cfg.cycle_interval,
                Some(Err(e)) => {
                    ERRORS.with_label_values(&[e.kind()]).inc();
                    CYCLES.with_label_values(&["error"]).inc();
                    if e.is_transient() {
                        warn!(cycle = self.cycles, error = %e, backoff_ms = self.cfg.error_backoff.as_millis() as u64, "transient error, backing off");
                    } else {
                        error!(cycle = self.cycles, error = %e, backoff_ms = self.cfg.error_backoff.as_millis() as u64, "unexpected error, backing off");
                    }
                    self.cfg.error_backoff
                }
            };

            if self.max_cycles_reached() {
                info!(cycles = self.cycles, "max cycles reached");
                break;
            }

            let stopped = tokio::select! {
                biased;
                _ = &mut shutdown => true,
                _ = sleep(pause) => false,
            };
            if stopped {
                info!("stop signal received");
                break;
            }
        }

        self.shutdown().await
    }

    fn max_cycles_reached(&self) -> bool {
        matches!(self.cfg.max_cycles, Some(max) if self.cycles >= max)
    }

    /// Final cancel-all (retried), final PnL at the last mid, state -> Stopped.
    pub async fn shutdown(&mut self) -> SessionSummary {
        self.state = SessionState::ShuttingDown;
        let symbol = self.cfg.symbol.clone();
        info!(%symbol, "shutting down, cancelling all orders");

        let attempts = self.cfg.shutdown_cancel_retries.max(1);
        let pause = self.cfg.error_backoff.min(Duration::from_secs(1));
        let mut cleanup_confirmed = false;
        for attempt in 1..=attempts {
            match self.venue.cancel_all_orders(&symbol).await {
                Ok(out) => {
                    info!(attempt, cancelled = out.cancelled, "final cancel-all confirmed");
                    cleanup_confirmed = true;
                    break;
                }
                Err(e) => {
                    SHUTDOWN_CANCEL_FAILURES.inc();
                    warn!(attempt, attempts, error = %e, "final cancel-all failed");
                    if attempt < attempts {
                        sleep(pause).await;
                    }
                }
            }
        }
        if !cleanup_confirmed {
            error!(
                %symbol,
                attempts,
                "CLEANUP NOT CONFIRMED: orders may still rest at the venue, cancel them manually"
            );
        }

        let final_value = match self.pnl.last_mid {
            Some(mid) => match self.venue.inventory().await {
                Ok(inv) => Some(inv.valuation(mid)),
                Err(e) => {
                    warn!(error = %e, "final inventory unavailable");
                    None
                }
            },
            None => None,
        };
        let pnl = match (final_value, self.pnl.initial_value) {
            (Some(v), Some(init)) => Some(v - init),
            _ => None,
        };
        let pnl_pct = match (pnl, self.pnl.initial_value) {
            (Some(p), Some(init)) => report::pnl_percent(p, init),
            _ => None,
        };

        self.state = SessionState::Stopped;
        let summary = SessionSummary {
            cycles: self.cycles,
            fills: self.fills,
            balances: self.venue.ledger().map(|l| l.balances()),
            initial_value: self.pnl.initial_value,
            final_value,
            last_mid: self.pnl.last_mid,
            pnl,
            pnl_pct,
            cleanup_confirmed,
            state: self.state,
        };
        report::summary(&summary);
        self.recorder.record(Event::Note(format!(
            "session stopped cycles={} cleanup_confirmed={}",
            summary.cycles, summary.cleanup_confirmed
        )));
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{from_lookup, Cli};
    use crate::feed::MockFeed;
    use crate::gateway::SimulatedVenue;
    use crate::ledger::Ledger;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn cfg(pairs: &[(&str, &str)]) -> Config {
        let mut m: HashMap<String, String> = [
            ("FEED_MODE", "mock"),
            ("CYCLE_INTERVAL_SECS", "0"),
            ("ERROR_BACKOFF_SECS", "0"),
            ("METRICS_PORT", "0"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in pairs {
            m.insert(k.to_string(), v.to_string());
        }
        from_lookup(|k| m.get(k).cloned(), &Cli::default()).unwrap()
    }

    fn session(cfg: Config) -> Session {
        let ledger = Ledger::new(&cfg.base_asset, &cfg.quote_asset, &cfg.initial_balances).unwrap();
        Session::new(
            cfg,
            Box::new(MockFeed::new(dec!(65), Some(7))),
            Box::new(SimulatedVenue::new(ledger)),
            Recorder::disabled(),
        )
    }

    #[tokio::test]
    async fn cycle_quotes_both_sides_and_leaves_them_resting() {
        let mut s = session(cfg(&[]));
        let rep = s.run_cycle().await.unwrap();
        assert_eq!(rep.outcome, CycleOutcome::Quoted { placed: 2, failed: 0 });
        assert_eq!(s.venue().resting_orders(), 2);
        let q = rep.quote.unwrap();
        assert!(q.buy_price < q.sell_price);
        // valuation counts locked capital, so nothing is "lost" by placing
        assert_eq!(rep.pnl, Some(Decimal::ZERO));
    }

    #[tokio::test]
    async fn initial_value_is_written_once() {
        let mut s = session(cfg(&[]));
        s.run_cycle().await.unwrap();
        let first = s.pnl_state().initial_value;
        s.run_cycle().await.unwrap();
        s.run_cycle().await.unwrap();
        assert!(first.is_some());
        assert_eq!(s.pnl_state().initial_value, first);
    }

    #[tokio::test]
    async fn max_cycles_stops_with_cleanup() {
        let mut s = session(cfg(&[("MAX_CYCLES", "3")]));
        let summary = s.run(std::future::pending()).await;
        assert_eq!(summary.cycles, 3);
        assert!(summary.cleanup_confirmed);
        assert_eq!(summary.state, SessionState::Stopped);
        assert_eq!(s.state(), SessionState::Stopped);
        assert_eq!(s.venue().resting_orders(), 0);
        let balances = summary.balances.unwrap();
        assert!(balances.values().all(|b| b.locked.is_zero()));
    }

    #[tokio::test]
    async fn stop_signal_before_first_cycle_still_cleans_up() {
        let mut s = session(cfg(&[]));
        let summary = s.run(async {}).await;
        assert_eq!(summary.state, SessionState::Stopped);
        assert!(summary.cleanup_confirmed);
        assert!(summary.pnl.is_none());
    }

    #[tokio::test]
    async fn empty_wallet_places_nothing() {
        let mut s = session(cfg(&[("INITIAL_BALANCES", "USDT:0,LTC:0"), ("QUOTE_NOTIONAL", "0.0000001")]));
        let rep = s.run_cycle().await.unwrap();
        // nothing to fund either side: both placements fail locally, cycle continues
        match rep.outcome {
            CycleOutcome::Quoted { placed, failed } => assert_eq!((placed, failed), (0, 2)),
            CycleOutcome::QuoteAborted { .. } => {}
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(s.venue().resting_orders(), 0);
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(CycleOutcome::Quoted { placed: 2, failed: 0 }.label(), "quoted");
        assert_eq!(CycleOutcome::Skipped { reason: "x".into() }.label(), "skipped");
        assert_eq!(CycleOutcome::QuoteAborted { reason: "x".into() }.label(), "quote_aborted");
    }
}
