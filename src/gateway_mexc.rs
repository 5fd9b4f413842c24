// ===============================
// src/gateway_mexc.rs
// ===============================
use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{error, info, warn};

use crate::config::MexcCfg;
use crate::domain::{CancelOutcome, Inventory, PlacedOrder, Side};
use crate::error::{BotError, BotResult};
use crate::gateway::ExecutionVenue;
use crate::mexc::{clock_offset, signed_query, timestamp_ms, AccountInfo, ApiError, NewOrderAck, ServerTime};
use crate::metrics::EXECS;

/// MEXC spot gateway (REST only).
/// PoC: LIMIT orders + cancel-all; fills are not tracked locally, check the exchange.
pub struct MexcVenue {
    http: reqwest::Client,
    rest_base: String,
    api_key: String,
    api_secret: String,
    recv_window: u64,
    qty_decimals: u32,
    base_asset: String,
    quote_asset: String,
    // server - local, ms; dipakai untuk timestamp yang ditandatangani
    clock_offset_ms: i64,
}

impl MexcVenue {
    pub fn new(cfg: &MexcCfg, base_asset: &str, quote_asset: &str, qty_decimals: u32) -> BotResult<Self> {
        let api_key = cfg.api_key.clone().ok_or_else(|| BotError::Config("MEXC_API_KEY missing".into()))?;
        let api_secret = cfg.api_secret.clone().ok_or_else(|| BotError::Config("MEXC_API_SECRET missing".into()))?;
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| BotError::Config(format!("http client: {e}")))?;
        Ok(Self {
            http,
            rest_base: cfg.rest_url.trim_end_matches('/').to_string(),
            api_key,
            api_secret,
            recv_window: cfg.recv_window,
            qty_decimals,
            base_asset: base_asset.to_string(),
            quote_asset: quote_asset.to_string(),
            clock_offset_ms: 0,
        })
    }

    /// Align signed timestamps with `/api/v3/time` so local clock skew
    /// does not push requests outside `recvWindow`.
    pub async fn sync_clock(&mut self) -> BotResult<i64> {
        let sent = timestamp_ms();
        let rsp = self.http.get(format!("{}/api/v3/time", self.rest_base)).send().await?;
        let code = rsp.status();
        if !code.is_success() {
            return Err(BotError::TransientVenue(format!("server time {code}")));
        }
        let t: ServerTime = rsp
            .json()
            .await
            .map_err(|e| BotError::TransientVenue(format!("server time body: {e}")))?;
        self.clock_offset_ms = clock_offset(t.server_time, sent, timestamp_ms());
        info!(offset_ms = self.clock_offset_ms, "MEXC clock offset");
        Ok(self.clock_offset_ms)
    }

    fn stamp(&self) -> String {
        (timestamp_ms() + self.clock_offset_ms).to_string()
    }

    fn signed_url(&self, path: &str, params: &[(&str, String)]) -> BotResult<String> {
        let query = signed_query(&self.api_secret, params)?;
        Ok(format!("{}{}?{}", self.rest_base, path, query))
    }
}

/// 4xx: the exchange said no (bad params, balance) -> Rejected.
/// 5xx / 429: try again later -> TransientVenue.
fn classify(code: reqwest::StatusCode, body: String) -> BotError {
    let detail = serde_json::from_str::<ApiError>(&body)
        .ok()
        .and_then(|e| e.msg.map(|m| format!("{} (code {})", m, e.code.unwrap_or_default())))
        .unwrap_or(body);
    if code.is_server_error() || code == reqwest::StatusCode::TOO_MANY_REQUESTS {
        BotError::TransientVenue(format!("{code}: {detail}"))
    } else {
        BotError::Rejected(format!("{code}: {detail}"))
    }
}

#[async_trait]
impl ExecutionVenue for MexcVenue {
    fn name(&self) -> &'static str { "mexc" }

    async fn place_order(
        &mut self,
        symbol: &str,
        side: Side,
        price: Decimal,
        quantity: Decimal,
    ) -> BotResult<PlacedOrder> {
        let qty = quantity.round_dp_with_strategy(self.qty_decimals, RoundingStrategy::ToZero);
        if price <= Decimal::ZERO || qty <= Decimal::ZERO {
            return Err(BotError::InvalidOrder(format!("price {price} / qty {qty} must be positive")));
        }

        let params = vec![
            ("symbol", symbol.to_ascii_uppercase()),
            ("side", side.as_str().to_string()),
            ("type", "LIMIT".to_string()),
            ("price", price.normalize().to_string()),
            ("quantity", qty.normalize().to_string()),
            ("recvWindow", self.recv_window.to_string()),
            ("timestamp", self.stamp()),
        ];
        let url = self.signed_url("/api/v3/order", &params)?;

        let rsp = self.http.post(url).header("X-MEXC-APIKEY", &self.api_key).send().await?;
        let code = rsp.status();
        let body = rsp.text().await.unwrap_or_default();

        if !code.is_success() {
            let e = classify(code, body);
            EXECS.with_label_values(&["rejected", side.as_str()]).inc();
            error!(%side, %price, qty = %qty, error = %e, "order send failed");
            return Err(e);
        }

        let ack: NewOrderAck = serde_json::from_str(&body)
            .map_err(|e| BotError::TransientVenue(format!("unexpected order ack {body:?}: {e}")))?;
        EXECS.with_label_values(&["placed", side.as_str()]).inc();
        info!(order_id = %ack.id_string(), %side, %price, qty = %qty, "order sent OK");
        Ok(PlacedOrder { order_id: ack.id_string(), side, price, quantity: qty })
    }

    async fn cancel_all_orders(&mut self, symbol: &str) -> BotResult<CancelOutcome> {
        let params = vec![
            ("symbol", symbol.to_ascii_uppercase()),
            ("recvWindow", self.recv_window.to_string()),
            ("timestamp", self.stamp()),
        ];
        let url = self.signed_url("/api/v3/openOrders", &params)?;

        let rsp = self.http.delete(url).header("X-MEXC-APIKEY", &self.api_key).send().await?;
        let code = rsp.status();
        let body = rsp.text().await.unwrap_or_default();

        if code.is_success() {
            // respons: array order yang dibatalkan
            let cancelled = serde_json::from_str::<Vec<serde_json::Value>>(&body).map(|v| v.len()).unwrap_or(0);
            if cancelled > 0 {
                EXECS.with_label_values(&["cancelled", "all"]).inc_by(cancelled as u64);
            }
            return Ok(CancelOutcome { cancelled, message: body });
        }

        // MEXC menjawab error bila tidak ada open order; itu tetap sukses (idempotent)
        if let Ok(api) = serde_json::from_str::<ApiError>(&body) {
            let msg = api.msg.unwrap_or_default().to_ascii_lowercase();
            if msg.contains("no open order") || msg.contains("unknown order") {
                return Ok(CancelOutcome { cancelled: 0, message: "no open orders".into() });
            }
        }
        let e = classify(code, body);
        warn!(error = %e, "cancel all failed");
        Err(e)
    }

    async fn inventory(&mut self) -> BotResult<Inventory> {
        let params = vec![
            ("recvWindow", self.recv_window.to_string()),
            ("timestamp", self.stamp()),
        ];
        let url = self.signed_url("/api/v3/account", &params)?;

        let rsp = self.http.get(url).header("X-MEXC-APIKEY", &self.api_key).send().await?;
        let code = rsp.status();
        let body = rsp.text().await.unwrap_or_default();
        if !code.is_success() {
            // saldo tidak terbaca = tidak bisa quote dengan aman; anggap sementara
            return Err(BotError::TransientVenue(format!("account {code}: {body}")));
        }
        let acct: AccountInfo = serde_json::from_str(&body)
            .map_err(|e| BotError::TransientVenue(format!("account body: {e}")))?;
        Ok(Inventory { base: acct.total(&self.base_asset)?, quote: acct.total(&self.quote_asset)? })
    }
}
