// ===============================
// src/main.rs
// ===============================
/*
 # jalankan offline (mock feed + simulated venue), berhenti setelah 20 cycle
 FEED_MODE=mock cargo run --release -- --interval 1 --max-cycles 20

 # metrics
curl -s localhost:9898/metrics | egrep '^config_(feed_mode|venue_mode|symbol)'
curl -s localhost:9898/metrics | grep -E '^(pnl_session|inventory_base_ratio|cycles_total)'

*/
/*
=============================================================================
Project : mm_bot_rust — single-asset inventory-skew market maker in Rust
Module  : main.rs
Version : 0.5.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
Email   : kukuhtw@gmail.com
WhatsApp: https://wa.me/628129893706
LinkedIn: https://id.linkedin.com/in/kukuhtw
License : MIT (see LICENSE)

Summary : Quotes a bid/ask pair around the venue mid, skewed by inventory,
          matches resting orders against a simulated ledger (or routes them
          to MEXC spot), tracks session PnL, exposes Prometheus metrics and
          records JSONL events.

(c) 2025 Kukuh TW. All rights reserved where applicable.
=============================================================================
*/
use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mm_bot_rust::config::{self, Cli, Config, FeedMode, VenueMode};
use mm_bot_rust::error::BotResult;
use mm_bot_rust::feed::{MarketDataSource, MexcFeed, MockFeed};
use mm_bot_rust::gateway::{ExecutionVenue, SimulatedVenue};
use mm_bot_rust::gateway_mexc::MexcVenue;
use mm_bot_rust::ledger::Ledger;
use mm_bot_rust::metrics;
use mm_bot_rust::recorder::Recorder;
use mm_bot_rust::session::Session;

fn build_feed(cfg: &Config) -> BotResult<Box<dyn MarketDataSource>> {
    Ok(match cfg.feed_mode {
        FeedMode::Mock => Box::new(MockFeed::new(cfg.mock_start_price, cfg.mock_seed)),
        FeedMode::Mexc => Box::new(MexcFeed::new(&cfg.mexc, cfg.book_depth)?),
    })
}

async fn build_venue(cfg: &Config) -> BotResult<Box<dyn ExecutionVenue>> {
    Ok(match cfg.venue_mode {
        VenueMode::Simulated => {
            let ledger = Ledger::new(&cfg.base_asset, &cfg.quote_asset, &cfg.initial_balances)?;
            Box::new(SimulatedVenue::new(ledger))
        }
        VenueMode::Live => {
            let mut v = MexcVenue::new(&cfg.mexc, &cfg.base_asset, &cfg.quote_asset, cfg.quote.qty_decimals)?;
            // gagal sync jam tidak fatal: tetap pakai jam lokal
            if let Err(e) = v.sync_clock().await {
                warn!(error = %e, "server time unavailable, signing with local clock");
            }
            Box::new(v)
        }
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    // ---- Logging ----
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // ---- Load config ----
    let cli = Cli::parse();
    let cfg = match config::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::from(2);
        }
    };

    // ---- Metrics ----
    metrics::init();
    if cfg.metrics_port != 0 {
        metrics::serve_metrics(cfg.metrics_port);
    }

    // ---- Human-friendly startup info + export config to metrics ----
    info!(
        symbol = %cfg.symbol,
        feed_mode = cfg.feed_mode.as_str(),
        venue_mode = cfg.venue_mode.as_str(),
        spread = %cfg.quote.spread,
        notional = %cfg.quote.quote_notional,
        skew_intensity = %cfg.quote.skew_intensity,
        target_base_ratio = %cfg.quote.target_base_ratio,
        interval_ms = cfg.cycle_interval.as_millis() as u64,
        mexc_rest = %cfg.mexc.rest_url,
        "startup config"
    );
    metrics::CONFIG_FEED_MODE.with_label_values(&[cfg.feed_mode.as_str()]).set(1);
    metrics::CONFIG_VENUE_MODE.with_label_values(&[cfg.venue_mode.as_str()]).set(1);
    metrics::CONFIG_SYMBOL.with_label_values(&[cfg.symbol.as_str()]).set(1);
    if cfg.venue_mode == VenueMode::Live {
        warn!("VENUE_MODE=live: real orders will be sent to MEXC");
    }

    // ---- Recorder (optional) ----
    let (recorder, rec_task) = match cfg.record_file.clone() {
        Some(path) => {
            let (r, h) = Recorder::spawn(path);
            (r, Some(h))
        }
        None => (Recorder::disabled(), None),
    };

    // ---- Feed + venue ----
    let built = match build_feed(&cfg) {
        Ok(f) => build_venue(&cfg).await.map(|v| (f, v)),
        Err(e) => Err(e),
    };
    let (feed, venue) = match built {
        Ok(fv) => fv,
        Err(e) => {
            error!(error = %e, "startup failed");
            return ExitCode::from(2);
        }
    };

    // ---- Session loop (ctrl-c -> graceful shutdown) ----
    let mut session = Session::new(cfg, feed, venue, recorder);
    let summary = session
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(?e, "ctrl-c handler failed, running until max cycles");
                std::future::pending::<()>().await;
            }
        })
        .await;

    // tutup channel recorder supaya sisa event di-flush
    drop(session);
    if let Some(h) = rec_task {
        let _ = h.await;
    }

    if summary.cleanup_confirmed {
        ExitCode::SUCCESS
    } else {
        error!("exiting with failure: final cancel-all was never confirmed");
        ExitCode::FAILURE
    }
}
