// ===============================
// src/mexc.rs
// ===============================
use chrono::Utc;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::str::FromStr;

use crate::error::{BotError, BotResult};

pub fn timestamp_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Server minus local clock, assuming the reply was stamped halfway through the round trip.
pub fn clock_offset(server_ms: i64, sent_ms: i64, received_ms: i64) -> i64 {
    server_ms - (sent_ms + received_ms) / 2
}

/// HMAC-SHA256 over the exact query string that is sent, hex encoded.
pub fn sign_query(secret: &str, query: &str) -> BotResult<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| BotError::Config(format!("MEXC secret: {e}")))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Params sorted by key, values url-encoded: `k1=v1&k2=v2`.
pub fn build_query(params: &[(&str, String)]) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Signed query ready to append to a path: `...&signature=<hex>`.
pub fn signed_query(secret: &str, params: &[(&str, String)]) -> BotResult<String> {
    let query = build_query(params);
    let sig = sign_query(secret, &query)?;
    Ok(format!("{query}&signature={sig}"))
}

// ---- Minimal REST response models ----
#[derive(Debug, Deserialize)]
pub struct NewOrderAck {
    #[serde(rename = "orderId")]
    pub order_id: serde_json::Value, // string atau angka, tergantung endpoint
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub msg: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ServerTime {
    #[serde(rename = "serverTime")]
    pub server_time: i64,
}

#[derive(Debug, Deserialize)]
pub struct AccountInfo {
    #[serde(default)]
    pub balances: Vec<AccountBalance>,
}

#[derive(Debug, Deserialize)]
pub struct AccountBalance {
    pub asset: String,
    pub free: String,
    pub locked: String,
}

impl AccountInfo {
    /// free + locked for `asset`; missing asset counts as zero.
    pub fn total(&self, asset: &str) -> BotResult<Decimal> {
        let Some(b) = self.balances.iter().find(|b| b.asset.eq_ignore_ascii_case(asset)) else {
            return Ok(Decimal::ZERO);
        };
        let parse = |v: &str| {
            Decimal::from_str(v.trim())
                .map_err(|_| BotError::TransientVenue(format!("account balance {asset}: {v:?}")))
        };
        Ok(parse(&b.free)? + parse(&b.locked)?)
    }
}

impl NewOrderAck {
    pub fn id_string(&self) -> String {
        match &self.order_id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_is_sorted_and_encoded() {
        let q = build_query(&[
            ("timestamp", "1700000000000".to_string()),
            ("symbol", "LTCUSDT".to_string()),
            ("price", "81.1281".to_string()),
            ("note", "a b".to_string()),
        ]);
        assert_eq!(q, "note=a%20b&price=81.1281&symbol=LTCUSDT&timestamp=1700000000000");
    }

    #[test]
    fn signature_is_stable_hex() {
        let a = sign_query("secret", "symbol=LTCUSDT&timestamp=1").unwrap();
        let b = sign_query("secret", "symbol=LTCUSDT&timestamp=1").unwrap();
        let c = sign_query("other", "symbol=LTCUSDT&timestamp=1").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn signed_query_appends_signature_last() {
        let s = signed_query("k", &[("symbol", "LTCUSDT".to_string())]).unwrap();
        assert!(s.starts_with("symbol=LTCUSDT&signature="));
    }

    #[test]
    fn clock_offset_uses_round_trip_midpoint() {
        let t: ServerTime = serde_json::from_str(r#"{"serverTime":1700000001500}"#).unwrap();
        assert_eq!(clock_offset(t.server_time, 1_700_000_000_000, 1_700_000_000_200), 1_400);
        assert_eq!(clock_offset(1_000, 1_100, 1_100), -100);
    }

    #[test]
    fn account_totals_include_locked() {
        let a: AccountInfo = serde_json::from_str(
            r#"{"balances":[{"asset":"USDT","free":"100.5","locked":"4.5"},{"asset":"LTC","free":"0.2","locked":"0"}]}"#,
        )
        .unwrap();
        assert_eq!(a.total("USDT").unwrap(), Decimal::from(105));
        assert_eq!(a.total("ltc").unwrap(), Decimal::from_str("0.2").unwrap());
        assert_eq!(a.total("BTC").unwrap(), Decimal::ZERO);
    }

    #[test]
    fn order_ack_accepts_string_or_number_ids() {
        let a: NewOrderAck = serde_json::from_str(r#"{"orderId":"C02__123"}"#).unwrap();
        let b: NewOrderAck = serde_json::from_str(r#"{"orderId":42}"#).unwrap();
        assert_eq!(a.id_string(), "C02__123");
        assert_eq!(b.id_string(), "42");
    }
}
