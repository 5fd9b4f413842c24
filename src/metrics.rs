// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Gauge, GaugeVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Loop --------
pub static CYCLES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("cycles_total", "quoting cycles by outcome (quoted, skipped, quote_aborted, error)"),
        &["outcome"],
    )
    .unwrap()
});

pub static BOOK_FETCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("book_fetches_total", "order book fetches (labels: source, result)"),
        &["source", "result"],
    )
    .unwrap()
});

pub static ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(Opts::new("errors_total", "errors seen by the session loop"), &["kind"]).unwrap()
});

// -------- Orders / fills --------
pub static EXECS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("exec_reports_total", "order events (labels: status, side)"),
        &["status", "side"],
    )
    .unwrap()
});

pub static FILLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(Opts::new("fills_total", "simulated fills"), &["side"]).unwrap()
});

pub static SHUTDOWN_CANCEL_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("shutdown_cancel_failures_total", "failed cancel-all attempts during shutdown").unwrap()
});

// -------- Market / inventory / PnL --------
pub static MID_PRICE: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("market_mid_price", "last market mid price").unwrap());

pub static QUOTE_PRICE: Lazy<GaugeVec> = Lazy::new(|| {
    GaugeVec::new(Opts::new("quote_price", "last quoted price"), &["side"]).unwrap()
});

pub static INV_RATIO: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("inventory_base_ratio", "base asset share of portfolio value").unwrap());

pub static SKEW: Lazy<Gauge> = Lazy::new(|| Gauge::new("inventory_skew", "applied price skew").unwrap());

pub static BALANCE: Lazy<GaugeVec> = Lazy::new(|| {
    GaugeVec::new(Opts::new("balance", "simulated balance (labels: asset, bucket)"), &["asset", "bucket"]).unwrap()
});

pub static PORTFOLIO_VALUE: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("portfolio_value", "mark-to-market portfolio value (quote)").unwrap());

pub static PNL_SESSION: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("pnl_session", "session PnL vs initial portfolio value (quote)").unwrap());

// ---- Config visibility ----
pub static CONFIG_FEED_MODE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(Opts::new("config_feed_mode", "feed mode (label: mode)"), &["mode"]).unwrap()
});

pub static CONFIG_VENUE_MODE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(Opts::new("config_venue_mode", "venue mode (label: mode)"), &["mode"]).unwrap()
});

pub static CONFIG_SYMBOL: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(Opts::new("config_symbol", "configured symbol (label: symbol)"), &["symbol"]).unwrap()
});

pub fn init() {
    // Register all metrics to the custom registry
    for m in [
        REGISTRY.register(Box::new(CYCLES.clone())),
        REGISTRY.register(Box::new(BOOK_FETCHES.clone())),
        REGISTRY.register(Box::new(ERRORS.clone())),
        REGISTRY.register(Box::new(EXECS.clone())),
        REGISTRY.register(Box::new(FILLS.clone())),
        REGISTRY.register(Box::new(SHUTDOWN_CANCEL_FAILURES.clone())),
        REGISTRY.register(Box::new(MID_PRICE.clone())),
        REGISTRY.register(Box::new(QUOTE_PRICE.clone())),
        REGISTRY.register(Box::new(INV_RATIO.clone())),
        REGISTRY.register(Box::new(SKEW.clone())),
        REGISTRY.register(Box::new(BALANCE.clone())),
        REGISTRY.register(Box::new(PORTFOLIO_VALUE.clone())),
        REGISTRY.register(Box::new(PNL_SESSION.clone())),
        // Config visibility
        REGISTRY.register(Box::new(CONFIG_FEED_MODE.clone())),
        REGISTRY.register(Box::new(CONFIG_VENUE_MODE.clone())),
        REGISTRY.register(Box::new(CONFIG_SYMBOL.clone())),
    ] {
        let _ = m;
    }
}

/// Gauges are f64; decimals are exact everywhere else.
pub fn f64_of(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

// Encode all metrics in Prometheus text format
pub fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

// Serve one HTTP request (GET / or /metrics): tiny HTTP 1.1 responder
fn handle_client(mut stream: TcpStream) {
    let mut _req_buf = [0u8; 1024];
    let _ = stream.read(&mut _req_buf);

    let body = encode_metrics();
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

// Run the metrics server in a dedicated OS thread (keeps Tokio runtime clean)
pub fn serve_metrics(port: u16) {
    thread::spawn(move || {
        let addr = format!("0.0.0.0:{port}");
        let listener = match TcpListener::bind(&addr) {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(%addr, ?e, "metrics bind failed, metrics disabled");
                return;
            }
        };
        tracing::info!("metrics listening on http://{addr}/ (and /metrics)");

        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => tracing::warn!(?e, "metrics accept error"),
            }
        }
    });
}
