// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : mm_bot_rust — single-asset inventory-skew market maker in Rust
Module  : config.rs
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
use dotenvy::dotenv;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{BotError, BotResult};
use crate::quoting::QuoteParams;

/// Sumber market data
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedMode {
    Mock,
    Mexc,
}

impl FeedMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mock" => Some(FeedMode::Mock),
            "mexc" | "live" => Some(FeedMode::Mexc),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self { FeedMode::Mock => "mock", FeedMode::Mexc => "mexc" }
    }
}

/// Venue eksekusi: dipilih sekali saat startup
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VenueMode {
    Simulated,
    Live,
}

impl VenueMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulated" | "sim" | "demo" | "paper" => Some(VenueMode::Simulated),
            "live" | "mexc" => Some(VenueMode::Live),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self { VenueMode::Simulated => "simulated", VenueMode::Live => "live" }
    }
}

/// CLI flags; anything not given falls back to env / `.env` / defaults.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about = "Single-asset inventory-skew market maker")]
pub struct Cli {
    /// Trading pair, e.g. LTCUSDT
    #[arg(long)]
    pub symbol: Option<String>,
    /// mock | mexc
    #[arg(long)]
    pub feed_mode: Option<String>,
    /// simulated | live
    #[arg(long)]
    pub venue_mode: Option<String>,
    /// Seconds between cycles
    #[arg(long)]
    pub interval: Option<f64>,
    /// Stop (with full cleanup) after N cycles
    #[arg(long)]
    pub max_cycles: Option<u64>,
    #[arg(long)]
    pub spread: Option<String>,
    #[arg(long)]
    pub notional: Option<String>,
    #[arg(long)]
    pub metrics_port: Option<u16>,
    #[arg(long)]
    pub record_file: Option<String>,
}

#[derive(Clone, Debug)]
pub struct MexcCfg {
    pub rest_url: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub recv_window: u64,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub quote: QuoteParams,

    pub cycle_interval: Duration,
    pub error_backoff: Duration,
    pub shutdown_cancel_retries: u32,
    pub max_cycles: Option<u64>,

    // simulated mode only
    pub initial_balances: Vec<(String, Decimal)>,

    pub feed_mode: FeedMode,
    pub venue_mode: VenueMode,
    pub mexc: MexcCfg,
    pub book_depth: u32,
    pub mock_start_price: Decimal,
    pub mock_seed: Option<u64>,

    // files/metrics
    pub metrics_port: u16,
    pub record_file: Option<String>,
}

pub const DEFAULT_INITIAL_BALANCES: &str = "USDT:204.93,LTC:0.46805458";

pub fn load(cli: &Cli) -> BotResult<Config> {
    // Pastikan .env dibaca (agar SYMBOL, SPREAD, dll ter-load)
    let _ = dotenv();
    from_lookup(|k| env::var(k).ok(), cli)
}

/// Build the config from any key lookup (env in production, a map in tests).
pub fn from_lookup<F>(get: F, cli: &Cli) -> BotResult<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    // ===== Symbol =====
    let symbol = cli
        .symbol
        .clone()
        .or_else(|| get("SYMBOL"))
        .unwrap_or_else(|| "LTCUSDT".to_string())
        .to_ascii_uppercase();
    let quote_asset = get("QUOTE_ASSET").unwrap_or_else(|| "USDT".to_string()).to_ascii_uppercase();
    let base_asset = symbol
        .strip_suffix(quote_asset.as_str())
        .filter(|b| !b.is_empty())
        .map(str::to_string)
        .ok_or_else(|| BotError::Config(format!("symbol {symbol} does not end with quote asset {quote_asset}")))?;

    // ===== Quoting =====
    let spread = pick_decimal(cli.spread.as_deref(), get("SPREAD"), "SPREAD", "0.003")?;
    let quote_notional = pick_decimal(cli.notional.as_deref(), get("QUOTE_NOTIONAL"), "QUOTE_NOTIONAL", "5")?;
    let skew_intensity = pick_decimal(None, get("INVENTORY_SKEW_INTENSITY"), "INVENTORY_SKEW_INTENSITY", "0.5")?;
    let target_base_ratio = pick_decimal(None, get("TARGET_BASE_RATIO"), "TARGET_BASE_RATIO", "0.5")?;
    let price_decimals: u32 = parse_or(get("PRICE_DECIMALS"), "PRICE_DECIMALS", 4)?;
    let qty_decimals: u32 = parse_or(get("QTY_DECIMALS"), "QTY_DECIMALS", 8)?;

    if spread < Decimal::ZERO || spread >= Decimal::TWO {
        return Err(BotError::Config(format!("SPREAD must be in [0, 2), got {spread}")));
    }
    if quote_notional <= Decimal::ZERO {
        return Err(BotError::Config(format!("QUOTE_NOTIONAL must be positive, got {quote_notional}")));
    }
    if skew_intensity < Decimal::ZERO {
        return Err(BotError::Config(format!("INVENTORY_SKEW_INTENSITY must be >= 0, got {skew_intensity}")));
    }
    if target_base_ratio < Decimal::ZERO || target_base_ratio > Decimal::ONE {
        return Err(BotError::Config(format!("TARGET_BASE_RATIO must be in [0, 1], got {target_base_ratio}")));
    }
    if price_decimals > 12 || qty_decimals > 12 {
        return Err(BotError::Config("PRICE_DECIMALS / QTY_DECIMALS must be <= 12".into()));
    }

    // ===== Loop timing =====
    let interval_secs = match cli.interval {
        Some(v) => v,
        None => parse_or(get("CYCLE_INTERVAL_SECS"), "CYCLE_INTERVAL_SECS", 10.0)?,
    };
    let cycle_interval = secs(interval_secs, "CYCLE_INTERVAL_SECS")?;
    let error_backoff = secs(parse_or(get("ERROR_BACKOFF_SECS"), "ERROR_BACKOFF_SECS", 10.0)?, "ERROR_BACKOFF_SECS")?;
    let shutdown_cancel_retries: u32 = parse_or(get("SHUTDOWN_CANCEL_RETRIES"), "SHUTDOWN_CANCEL_RETRIES", 5)?;
    let max_cycles = match cli.max_cycles {
        Some(n) => Some(n),
        None => get("MAX_CYCLES").map(|v| parse_value(&v, "MAX_CYCLES")).transpose()?,
    };

    // ===== Mode =====
    let feed_mode = match cli.feed_mode.clone().or_else(|| get("FEED_MODE")) {
        Some(s) => FeedMode::parse(&s).ok_or_else(|| BotError::Config(format!("unknown FEED_MODE {s}")))?,
        None => FeedMode::Mexc,
    };
    let venue_mode = match cli.venue_mode.clone().or_else(|| get("VENUE_MODE")) {
        Some(s) => VenueMode::parse(&s).ok_or_else(|| BotError::Config(format!("unknown VENUE_MODE {s}")))?,
        None => VenueMode::Simulated,
    };

    let initial_balances = parse_balances(&get("INITIAL_BALANCES").unwrap_or_else(|| DEFAULT_INITIAL_BALANCES.to_string()))?;

    let mexc = MexcCfg {
        rest_url: get("MEXC_REST_URL").unwrap_or_else(|| "https://api.mexc.com".to_string()),
        api_key: get("MEXC_API_KEY"),
        api_secret: get("MEXC_API_SECRET"),
        recv_window: parse_or(get("MEXC_RECV_WINDOW"), "MEXC_RECV_WINDOW", 5000)?,
        timeout: Duration::from_millis(parse_or(get("HTTP_TIMEOUT_MS"), "HTTP_TIMEOUT_MS", 5000)?),
    };
    if venue_mode == VenueMode::Live && (mexc.api_key.is_none() || mexc.api_secret.is_none()) {
        return Err(BotError::Config("VENUE_MODE=live requires MEXC_API_KEY and MEXC_API_SECRET".into()));
    }

    let mock_start_price = pick_decimal(None, get("MOCK_START_PRICE"), "MOCK_START_PRICE", "65")?;
    if mock_start_price <= Decimal::ZERO {
        return Err(BotError::Config("MOCK_START_PRICE must be positive".into()));
    }

    Ok(Config {
        symbol,
        base_asset,
        quote_asset,
        quote: QuoteParams {
            spread,
            quote_notional,
            skew_intensity,
            target_base_ratio,
            price_decimals,
            qty_decimals,
        },
        cycle_interval,
        error_backoff,
        shutdown_cancel_retries,
        max_cycles,
        initial_balances,
        feed_mode,
        venue_mode,
        mexc,
        book_depth: parse_or(get("BOOK_DEPTH"), "BOOK_DEPTH", 5)?,
        mock_start_price,
        mock_seed: get("MOCK_SEED").map(|v| parse_value(&v, "MOCK_SEED")).transpose()?,
        metrics_port: match cli.metrics_port {
            Some(p) => p,
            None => parse_or(get("METRICS_PORT"), "METRICS_PORT", 9898)?,
        },
        record_file: cli.record_file.clone().or_else(|| get("RECORD_FILE")),
    })
}

/// `USDT:204.93,LTC:0.46805458` -> [(USDT, 204.93), (LTC, 0.46805458)]
pub fn parse_balances(s: &str) -> BotResult<Vec<(String, Decimal)>> {
    let mut out = Vec::new();
    for item in s.split(',').map(str::trim).filter(|x| !x.is_empty()) {
        let (asset, qty) = item
            .split_once(':')
            .ok_or_else(|| BotError::Config(format!("bad INITIAL_BALANCES entry {item:?}, expected ASSET:QTY")))?;
        let qty: Decimal = parse_value(qty.trim(), "INITIAL_BALANCES")?;
        if qty < Decimal::ZERO {
            return Err(BotError::Config(format!("initial balance for {asset} is negative")));
        }
        out.push((asset.trim().to_ascii_uppercase(), qty));
    }
    Ok(out)
}

fn parse_value<T: FromStr>(raw: &str, key: &str) -> BotResult<T> {
    raw.parse::<T>()
        .map_err(|_| BotError::Config(format!("{key}: cannot parse {raw:?}")))
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> BotResult<T> {
    match raw {
        Some(v) => parse_value(&v, key),
        None => Ok(default),
    }
}

fn pick_decimal(cli: Option<&str>, env: Option<String>, key: &str, default: &str) -> BotResult<Decimal> {
    let raw = cli.map(str::to_string).or(env).unwrap_or_else(|| default.to_string());
    Decimal::from_str(raw.trim()).map_err(|_| BotError::Config(format!("{key}: cannot parse {raw:?}")))
}

fn secs(v: f64, key: &str) -> BotResult<Duration> {
    Duration::try_from_secs_f64(v)
        .map_err(|e| BotError::Config(format!("{key} must be a non-negative number of seconds ({e})")))
}
