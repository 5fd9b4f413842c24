// ===============================
// src/ledger.rs (saldo simulasi: free + locked)
// ===============================
//
// Two-phase accounting:
// - placement debits the free balance and parks it in `locked`
// - a fill consumes the locked amount and credits the other asset
// - cancel (or price improvement on a BUY) releases locked back to free
//
// No operation may drive a bucket below zero; such operations are rejected
// without touching any balance.
//
use ahash::AHashMap as HashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::Side;
use crate::error::{BotError, BotResult};

#[derive(Debug, Clone)]
pub struct Ledger {
    base_asset: String,
    quote_asset: String,
    free: HashMap<String, Decimal>,
    locked: HashMap<String, Decimal>,
}

/// Per-asset view used by reporting and the session summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetBalance { pub free: Decimal, pub locked: Decimal }

impl Ledger {
    pub fn new(base_asset: &str, quote_asset: &str, initial: &[(String, Decimal)]) -> BotResult<Self> {
        let mut free: HashMap<String, Decimal> = HashMap::new();
        for (asset, qty) in initial {
            if *qty < Decimal::ZERO {
                return Err(BotError::Config(format!("initial balance for {asset} is negative: {qty}")));
            }
            *free.entry(asset.clone()).or_insert(Decimal::ZERO) += *qty;
        }
        // pastikan kedua aset selalu ada
        free.entry(base_asset.to_string()).or_insert(Decimal::ZERO);
        free.entry(quote_asset.to_string()).or_insert(Decimal::ZERO);

        Ok(Self {
            base_asset: base_asset.to_string(),
            quote_asset: quote_asset.to_string(),
            free,
            locked: HashMap::new(),
        })
    }

    pub fn base_asset(&self) -> &str { &self.base_asset }
    pub fn quote_asset(&self) -> &str { &self.quote_asset }

    pub fn free(&self, asset: &str) -> Decimal { self.free.get(asset).copied().unwrap_or(Decimal::ZERO) }
    pub fn locked(&self, asset: &str) -> Decimal { self.locked.get(asset).copied().unwrap_or(Decimal::ZERO) }
    pub fn total(&self, asset: &str) -> Decimal { self.free(asset) + self.locked(asset) }

    /// Base holdings, including what rests in open SELL orders.
    pub fn base_total(&self) -> Decimal { self.total(&self.base_asset) }
    /// Quote holdings, including what rests in open BUY orders.
    pub fn quote_total(&self) -> Decimal { self.total(&self.quote_asset) }

    /// Mark-to-market value in quote currency.
    pub fn valuation(&self, mid: Decimal) -> Decimal { self.quote_total() + self.base_total() * mid }

    pub fn reserve_for_buy(&mut self, cost: Decimal) -> BotResult<()> {
        let asset = self.quote_asset.clone();
        self.reserve(&asset, cost)
    }

    pub fn reserve_for_sell(&mut self, quantity: Decimal) -> BotResult<()> {
        let asset = self.base_asset.clone();
        self.reserve(&asset, quantity)
    }

    fn reserve(&mut self, asset: &str, amount: Decimal) -> BotResult<()> {
        if amount <= Decimal::ZERO {
            return Err(BotError::InvalidOrder(format!("reservation must be positive, got {amount}")));
        }
        let available = self.free(asset);
        if available < amount {
            return Err(BotError::InsufficientBalance {
                asset: asset.to_string(),
                requested: amount,
                available,
            });
        }
        self.free.insert(asset.to_string(), available - amount);
        *self.locked.entry(asset.to_string()).or_insert(Decimal::ZERO) += amount;
        Ok(())
    }

    /// Return locked capital to free. BUY releases quote, SELL releases base.
    pub fn release(&mut self, side: Side, amount: Decimal) -> BotResult<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let asset = self.reserved_asset(side).to_string();
        self.take_locked(&asset, amount)?;
        *self.free.entry(asset).or_insert(Decimal::ZERO) += amount;
        Ok(())
    }

    /// Settle a fill. BUY: consumes `quantity * fill_price` locked quote, credits base.
    /// SELL: consumes `quantity` locked base, credits `quantity * fill_price` quote.
    pub fn credit_on_fill(&mut self, side: Side, quantity: Decimal, fill_price: Decimal) -> BotResult<()> {
        if quantity <= Decimal::ZERO || fill_price <= Decimal::ZERO {
            return Err(BotError::InvalidOrder(format!("fill must be positive: qty={quantity} px={fill_price}")));
        }
        let base = self.base_asset.clone();
        let quote = self.quote_asset.clone();
        match side {
            Side::Buy => {
                self.take_locked(&quote, quantity * fill_price)?;
                *self.free.entry(base).or_insert(Decimal::ZERO) += quantity;
            }
            Side::Sell => {
                self.take_locked(&base, quantity)?;
                *self.free.entry(quote).or_insert(Decimal::ZERO) += quantity * fill_price;
            }
        }
        Ok(())
    }

    fn reserved_asset(&self, side: Side) -> &str {
        match side { Side::Buy => &self.quote_asset, Side::Sell => &self.base_asset }
    }

    fn take_locked(&mut self, asset: &str, amount: Decimal) -> BotResult<()> {
        let locked = self.locked(asset);
        if locked < amount {
            return Err(BotError::InsufficientBalance {
                asset: format!("{asset} (locked)"),
                requested: amount,
                available: locked,
            });
        }
        self.locked.insert(asset.to_string(), locked - amount);
        Ok(())
    }

    /// Sorted snapshot, stable for logs and the JSONL journal.
    pub fn balances(&self) -> BTreeMap<String, AssetBalance> {
        self.free
            .keys()
            .chain(self.locked.keys())
            .map(|a| (a.clone(), AssetBalance { free: self.free(a), locked: self.locked(a) }))
            .collect()
    }
}
