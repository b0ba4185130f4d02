//! # Funds Ledger
//!
//! Tracks native-currency balances: what each account holds, and what the
//! escrow engine holds on behalf of each listed asset.
//!
//! Escrowed funds are accounted **per asset**, never pooled. Two
//! simultaneous listings can therefore never pay out of each other's
//! deposits, and [`FundsLedger::total_held`] is simply the sum of the
//! per-asset holdings.
//!
//! Both operations move value between an account and an asset's escrow
//! holding. Nothing is created or destroyed here except by
//! [`InMemoryLedger::airdrop`], which exists to seed devnet accounts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::Address;
use crate::config::{format_ether, Amount};
use crate::registry::AssetId;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during ledger operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The paying account does not hold enough funds.
    #[error(
        "insufficient balance for {party}: available {}, requested {}",
        ether_str(.available),
        ether_str(.requested)
    )]
    InsufficientBalance {
        party: Address,
        available: Amount,
        requested: Amount,
    },

    /// The asset's escrow holding is smaller than the requested payout.
    #[error(
        "insufficient escrow for asset {asset_id}: held {}, requested {}",
        ether_str(.held),
        ether_str(.requested)
    )]
    InsufficientEscrow {
        asset_id: AssetId,
        held: Amount,
        requested: Amount,
    },

    /// A credit would push a balance beyond `u128::MAX`.
    #[error("balance overflow")]
    Overflow,
}

fn ether_str(amount: &Amount) -> String {
    format_ether(*amount)
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// The escrow engine's view of money.
pub trait FundsLedger {
    /// Moves `amount` from `from`'s account into the escrow holding of
    /// `asset_id`. Returns the new holding.
    fn credit(
        &mut self,
        asset_id: AssetId,
        from: &Address,
        amount: Amount,
    ) -> Result<Amount, LedgerError>;

    /// Pays `amount` out of the escrow holding of `asset_id` into `to`'s
    /// account. Returns the remaining holding.
    fn debit(
        &mut self,
        asset_id: AssetId,
        to: &Address,
        amount: Amount,
    ) -> Result<Amount, LedgerError>;

    /// Funds currently held in escrow for `asset_id`.
    fn balance_of(&self, asset_id: AssetId) -> Amount;

    /// Funds held in escrow across all assets.
    fn total_held(&self) -> Amount;

    /// Spendable balance of an account.
    fn account_balance(&self, party: &Address) -> Amount;
}

// ---------------------------------------------------------------------------
// InMemoryLedger
// ---------------------------------------------------------------------------

/// A [`FundsLedger`] kept entirely in memory and persisted by serializing it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryLedger {
    /// Spendable balances by account.
    accounts: BTreeMap<Address, Amount>,
    /// Escrow holdings by asset. Entries are removed when they reach zero.
    escrow: BTreeMap<AssetId, Amount>,
}

impl InMemoryLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds freshly issued funds to an account. Devnet only.
    pub fn airdrop(&mut self, party: &Address, amount: Amount) -> Result<Amount, LedgerError> {
        let balance = self.accounts.entry(*party).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(LedgerError::Overflow)?;
        Ok(*balance)
    }

    /// All non-zero escrow holdings as `(asset, amount)` pairs.
    pub fn holdings(&self) -> Vec<(AssetId, Amount)> {
        self.escrow.iter().map(|(id, amount)| (*id, *amount)).collect()
    }
}

impl FundsLedger for InMemoryLedger {
    fn credit(
        &mut self,
        asset_id: AssetId,
        from: &Address,
        amount: Amount,
    ) -> Result<Amount, LedgerError> {
        let available = self.account_balance(from);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                party: *from,
                available,
                requested: amount,
            });
        }
        let held = self
            .balance_of(asset_id)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;

        self.accounts.insert(*from, available - amount);
        self.escrow.insert(asset_id, held);
        Ok(held)
    }

    fn debit(
        &mut self,
        asset_id: AssetId,
        to: &Address,
        amount: Amount,
    ) -> Result<Amount, LedgerError> {
        let held = self.balance_of(asset_id);
        if held < amount {
            return Err(LedgerError::InsufficientEscrow {
                asset_id,
                held,
                requested: amount,
            });
        }
        let credited = self
            .account_balance(to)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;

        let remaining = held - amount;
        if remaining == 0 {
            self.escrow.remove(&asset_id);
        } else {
            self.escrow.insert(asset_id, remaining);
        }
        self.accounts.insert(*to, credited);
        Ok(remaining)
    }

    fn balance_of(&self, asset_id: AssetId) -> Amount {
        self.escrow.get(&asset_id).copied().unwrap_or(0)
    }

    fn total_held(&self) -> Amount {
        self.escrow.values().sum()
    }

    fn account_balance(&self, party: &Address) -> Amount {
        self.accounts.get(party).copied().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
