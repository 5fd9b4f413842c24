// ===============================
// src/report.rs
// ===============================
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::ledger::Ledger;
use crate::metrics::{
    f64_of, BALANCE, CYCLES, INV_RATIO, MID_PRICE, PNL_SESSION, PORTFOLIO_VALUE, QUOTE_PRICE, SKEW,
};
use crate::session::{CycleOutcome, CycleReport, SessionSummary};

/// Session PnL as a percentage of the initial value, 4 dp. None when nothing was invested.
pub fn pnl_percent(pnl: Decimal, initial: Decimal) -> Option<Decimal> {
    if initial.is_zero() {
        return None;
    }
    Some((pnl / initial * Decimal::ONE_HUNDRED).round_dp(4))
}

pub fn cycle(rep: &CycleReport, ledger: Option<&Ledger>, resting: usize) {
    CYCLES.with_label_values(&[rep.outcome.label()]).inc();

    if let Some(mid) = rep.mid {
        MID_PRICE.set(f64_of(mid));
    }
    if let Some(q) = &rep.quote {
        QUOTE_PRICE.with_label_values(&["buy"]).set(f64_of(q.buy_price));
        QUOTE_PRICE.with_label_values(&["sell"]).set(f64_of(q.sell_price));
        INV_RATIO.set(f64_of(q.base_ratio));
        SKEW.set(f64_of(q.skew));
        info!(
            cycle = rep.cycle,
            mid = %q.market_mid,
            base_ratio = %q.base_ratio.round_dp(4),
            skew = %q.skew.round_dp(6),
            adj_mid = %q.adjusted_mid.round_dp(6),
            buy = %q.buy_price,
            sell = %q.sell_price,
            qty = %q.quantity,
            "QUOTE"
        );
    }
    if let Some(v) = rep.portfolio_value {
        PORTFOLIO_VALUE.set(f64_of(v));
    }
    if let Some(p) = rep.pnl {
        PNL_SESSION.set(f64_of(p));
    }

    if let Some(l) = ledger {
        for (asset, b) in l.balances() {
            BALANCE.with_label_values(&[asset.as_str(), "free"]).set(f64_of(b.free));
            BALANCE.with_label_values(&[asset.as_str(), "locked"]).set(f64_of(b.locked));
        }
        info!(
            cycle = rep.cycle,
            base = %l.base_total(),
            quote = %l.quote_total(),
            resting,
            "balances"
        );
    }

    match &rep.outcome {
        CycleOutcome::Quoted { placed, failed } => info!(
            cycle = rep.cycle,
            fills = rep.fills.len(),
            placed,
            failed,
            value = ?rep.portfolio_value,
            pnl = ?rep.pnl,
            "cycle done"
        ),
        CycleOutcome::Skipped { reason } => warn!(cycle = rep.cycle, %reason, "cycle skipped"),
        CycleOutcome::QuoteAborted { reason } => warn!(cycle = rep.cycle, %reason, pnl = ?rep.pnl, "cycle without quotes"),
    }
}

pub fn summary(s: &SessionSummary) {
    if let Some(p) = s.pnl {
        PNL_SESSION.set(f64_of(p));
    }
    if let Some(b) = &s.balances {
        for (asset, bal) in b {
            info!(%asset, free = %bal.free, locked = %bal.locked, "final balance");
        }
    }
    info!(
        cycles = s.cycles,
        fills = s.fills,
        initial_value = ?s.initial_value,
        final_value = ?s.final_value,
        last_mid = ?s.last_mid,
        pnl = ?s.pnl,
        pnl_pct = ?s.pnl_pct,
        cleanup_confirmed = s.cleanup_confirmed,
        state = ?s.state,
        "SESSION SUMMARY"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn pnl_percent_of_initial() {
        assert_eq!(pnl_percent(dec!(2.5), dec!(250)), Some(dec!(1)));
        assert_eq!(pnl_percent(dec!(-1), dec!(3)), Some(dec!(-33.3333)));
        assert_eq!(pnl_percent(dec!(1), dec!(0)), None);
    }
}
