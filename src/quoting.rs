// ===============================
// src/quoting.rs (inventory-skew quoting)
// ===============================
//
// Linear proportional controller on inventory:
//   base_ratio = b*M / (q + b*M)          (0 when the portfolio is empty)
//   skew       = -(base_ratio - target) * intensity
//   adj_mid    = M * (1 + skew)
// Overweight base -> adj_mid below market (encourages selling),
// underweight     -> adj_mid above market (encourages buying).
// Size is constant notional per side: qty = notional / adj_mid.
//
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{BotError, BotResult};

#[derive(Debug, Clone, PartialEq)]
pub struct QuoteParams {
    /// Fractional distance between buy and sell around the adjusted mid (0.003 = 30 bps).
    pub spread: Decimal,
    /// Target quote-currency value per side.
    pub quote_notional: Decimal,
    /// 0 = no skew, 1 = full proportional correction.
    pub skew_intensity: Decimal,
    pub target_base_ratio: Decimal,
    /// Price tick as number of decimals.
    pub price_decimals: u32,
    /// Quantity step as number of decimals (rounded toward zero).
    pub qty_decimals: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub market_mid: Decimal,
    pub base_ratio: Decimal,
    pub inventory_delta: Decimal,
    pub skew: Decimal,
    pub adjusted_mid: Decimal,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub quantity: Decimal,
}

/// Share of portfolio value held in the base asset at `mid`.
pub fn base_value_ratio(mid: Decimal, base: Decimal, quote: Decimal) -> Decimal {
    let base_value = base * mid;
    let total = quote + base_value;
    if total.is_zero() {
        return Decimal::ZERO;
    }
    base_value / total
}

/// Pure function of inputs: market mid, base holdings, quote holdings, params.
pub fn compute_quote(mid: Decimal, base: Decimal, quote: Decimal, p: &QuoteParams) -> BotResult<Quote> {
    let base_ratio = base_value_ratio(mid, base, quote);
    let inventory_delta = base_ratio - p.target_base_ratio;
    let skew = -inventory_delta * p.skew_intensity;
    let adjusted_mid = mid * (Decimal::ONE + skew);

    if adjusted_mid <= Decimal::ZERO {
        return Err(BotError::InvalidQuote {
            adjusted_mid,
            reason: format!("skew {skew} drives the mid non-positive"),
        });
    }

    let half = p.spread / Decimal::TWO;
    let buy_price = (adjusted_mid * (Decimal::ONE - half)).round_dp(p.price_decimals);
    let sell_price = (adjusted_mid * (Decimal::ONE + half)).round_dp(p.price_decimals);
    let quantity = (p.quote_notional / adjusted_mid)
        .round_dp_with_strategy(p.qty_decimals, RoundingStrategy::ToZero);

    if buy_price <= Decimal::ZERO || sell_price <= Decimal::ZERO || quantity <= Decimal::ZERO {
        return Err(BotError::InvalidQuote {
            adjusted_mid,
            reason: format!("degenerate output buy={buy_price} sell={sell_price} qty={quantity}"),
        });
    }

    Ok(Quote {
        market_mid: mid,
        base_ratio,
        inventory_delta,
        skew,
        adjusted_mid,
        buy_price,
        sell_price,
        quantity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn params() -> QuoteParams {
        QuoteParams {
            spread: dec!(0.003),
            quote_notional: dec!(5),
            skew_intensity: dec!(0.5),
            target_base_ratio: dec!(0.5),
            price_decimals: 4,
            qty_decimals: 8,
        }
    }

    #[test]
    fn all_quote_no_base_skews_up() {
        // {USDT: 100, LTC: 0} @ mid 65
        let q = compute_quote(dec!(65), dec!(0), dec!(100), &params()).unwrap();
        assert_eq!(q.base_ratio, dec!(0));
        assert_eq!(q.inventory_delta, dec!(-0.5));
        assert_eq!(q.skew, dec!(0.25));
        assert_eq!(q.adjusted_mid, dec!(81.25));
        assert_eq!(q.buy_price, dec!(81.1281)); // 81.128125
        assert_eq!(q.sell_price, dec!(81.3719)); // 81.371875
        assert_eq!(q.quantity, dec!(0.06153846)); // 5 / 81.25
    }

    #[test]
    fn balanced_inventory_quotes_symmetric_around_mid() {
        // 50/50: 65 USDT + 1 LTC @ 65
        let q = compute_quote(dec!(65), dec!(1), dec!(65), &params()).unwrap();
        assert_eq!(q.skew, dec!(0));
        assert_eq!(q.adjusted_mid, dec!(65));
        assert_eq!(q.buy_price, dec!(64.9025));
        assert_eq!(q.sell_price, dec!(65.0975));
        assert!(q.buy_price < q.market_mid && q.market_mid < q.sell_price);
    }

    #[test]
    fn overweight_base_lowers_adjusted_mid() {
        let q = compute_quote(dec!(65), dec!(3), dec!(10), &params()).unwrap();
        assert!(q.base_ratio > dec!(0.5));
        assert!(q.skew < dec!(0));
        assert!(q.adjusted_mid < dec!(65));
    }

    #[test]
    fn empty_portfolio_treated_as_zero_ratio() {
        let q = compute_quote(dec!(65), dec!(0), dec!(0), &params()).unwrap();
        assert_eq!(q.base_ratio, dec!(0));
        assert_eq!(q.adjusted_mid, dec!(81.25));
    }

    #[test]
    fn zero_intensity_means_no_skew() {
        let p = QuoteParams { skew_intensity: dec!(0), ..params() };
        let q = compute_quote(dec!(65), dec!(0), dec!(100), &p).unwrap();
        assert_eq!(q.adjusted_mid, dec!(65));
    }

    #[test]
    fn pathological_skew_is_invalid_quote() {
        // all base, target 0.5, intensity 2 -> skew = -1 -> adjusted mid 0
        let p = QuoteParams { skew_intensity: dec!(2), ..params() };
        let err = compute_quote(dec!(65), dec!(1), dec!(0), &p).unwrap_err();
        assert!(matches!(err, BotError::InvalidQuote { adjusted_mid, .. } if adjusted_mid == dec!(0)));

        let p = QuoteParams { skew_intensity: dec!(3), ..params() };
        assert!(compute_quote(dec!(65), dec!(1), dec!(0), &p).is_err());
    }

    #[test]
    fn tiny_notional_rounding_to_zero_qty_is_invalid() {
        let p = QuoteParams { quote_notional: dec!(0.000000001), ..params() };
        assert!(matches!(compute_quote(dec!(65), dec!(1), dec!(65), &p), Err(BotError::InvalidQuote { .. })));
    }

    #[test]
    fn tick_size_is_configurable() {
        let p = QuoteParams { price_decimals: 2, ..params() };
        let q = compute_quote(dec!(65), dec!(0), dec!(100), &p).unwrap();
        assert_eq!(q.buy_price, dec!(81.13));
        assert_eq!(q.sell_price, dec!(81.37));
    }
}
