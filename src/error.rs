// ===============================
// src/error.rs
// ===============================
use rust_decimal::Decimal;
use thiserror::Error;

/// Error taxonomy of the bot. Handled at the component boundary that detects it;
/// only the session loop decides whether to back off or keep going.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("insufficient {asset} balance: requested {requested}, available {available}")]
    InsufficientBalance {
        asset: String,
        requested: Decimal,
        available: Decimal,
    },
    #[error("invalid market data: {0}")]
    InvalidMarketData(String),
    #[error("invalid quote: adjusted mid {adjusted_mid} ({reason})")]
    InvalidQuote { adjusted_mid: Decimal, reason: String },
    #[error("invalid order: {0}")]
    InvalidOrder(String),
    #[error("transient venue error: {0}")]
    TransientVenue(String),
    #[error("venue rejected request: {0}")]
    Rejected(String),
    #[error("config error: {0}")]
    Config(String),
}

impl BotError {
    /// Network / API hiccups: retry after backoff, never fatal.
    pub fn is_transient(&self) -> bool {
        matches!(self, BotError::TransientVenue(_))
    }

    /// Errors that only cost us one side of the book this cycle.
    pub fn is_placement_local(&self) -> bool {
        matches!(
            self,
            BotError::InsufficientBalance { .. } | BotError::InvalidOrder(_) | BotError::Rejected(_)
        )
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            BotError::InsufficientBalance { .. } => "insufficient_balance",
            BotError::InvalidMarketData(_) => "invalid_market_data",
            BotError::InvalidQuote { .. } => "invalid_quote",
            BotError::InvalidOrder(_) => "invalid_order",
            BotError::TransientVenue(_) => "transient",
            BotError::Rejected(_) => "rejected",
            BotError::Config(_) => "config",
        }
    }
}

impl From<reqwest::Error> for BotError {
    fn from(e: reqwest::Error) -> Self {
        BotError::TransientVenue(e.to_string())
    }
}

pub type BotResult<T> = Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(BotError::TransientVenue("timeout".into()).is_transient());
        assert!(!BotError::InvalidMarketData("no asks".into()).is_transient());
        assert!(!BotError::InvalidQuote { adjusted_mid: dec!(0), reason: "x".into() }.is_transient());
    }

    #[test]
    fn placement_local_errors() {
        let e = BotError::InsufficientBalance {
            asset: "USDT".into(),
            requested: dec!(10),
            available: dec!(1),
        };
        assert!(e.is_placement_local());
        assert_eq!(e.kind(), "insufficient_balance");
        assert!(!BotError::TransientVenue("x".into()).is_placement_local());
    }
}
