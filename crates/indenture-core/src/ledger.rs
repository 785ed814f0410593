//! Token balance book: the single owner of free/locked token columns and the
//! stablecoin credit column per account.
//!
//! No other component stores balances; the registry and the vault refer to
//! accounts by identity only. Every operation validates fully before its
//! first write, so a returned `Err` implies no mutation.

use std::collections::BTreeMap;

use crate::math::{add_u64, sub_u64};
use crate::types::{AccountId, Stable, Tokens};
use crate::{IndentureError, Result};

/// Per-account balance columns, all in minor units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccountBalances {
    /// Spendable tokens.
    pub free: u64,
    /// Tokens pledged to active bonds (counted in supply, not spendable).
    pub locked: u64,
    /// Liquid stablecoin credit from redemptions and distribution payouts.
    pub stable: u64,
}

/// Balance book over all accounts plus the supply accumulator.
///
/// `BTreeMap` keeps every iteration deterministic; the allocation and
/// invariant code depends on that ordering.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ledger {
    accounts: BTreeMap<AccountId, AccountBalances>,
    total_supply: u64,
}

impl Ledger {
    pub fn new() -> Ledger {
        Ledger::default()
    }

    pub fn total_supply(&self) -> Tokens {
        Tokens::new(self.total_supply)
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    pub fn has_account(&self, account: AccountId) -> bool {
        self.accounts.contains_key(&account)
    }

    pub fn balances(&self, account: AccountId) -> AccountBalances {
        self.accounts.get(&account).copied().unwrap_or_default()
    }

    pub fn free_balance(&self, account: AccountId) -> Tokens {
        Tokens::new(self.balances(account).free)
    }

    pub fn locked_balance(&self, account: AccountId) -> Tokens {
        Tokens::new(self.balances(account).locked)
    }

    pub fn stable_balance(&self, account: AccountId) -> Stable {
        Stable::new(self.balances(account).stable)
    }

    /// Sum of locked tokens across all accounts (equals outstanding active
    /// bond principal while the locked-backing invariant holds).
    pub fn total_locked(&self) -> Tokens {
        Tokens::new(self.accounts.values().map(|b| b.locked).sum())
    }

    /// Sum of `free + locked` across all accounts, for conservation checks.
    pub fn total_tokens(&self) -> u128 {
        self.accounts
            .values()
            .map(|b| b.free as u128 + b.locked as u128)
            .sum()
    }

    /// Sum of stable columns across all accounts, for conservation checks.
    pub fn total_stable(&self) -> u128 {
        self.accounts.values().map(|b| b.stable as u128).sum()
    }

    /// Deterministic iteration over all accounts.
    pub fn iter(&self) -> impl Iterator<Item = (&AccountId, &AccountBalances)> {
        self.accounts.iter()
    }

    /// Moves free balance between two accounts.
    pub fn transfer(&mut self, from: AccountId, to: AccountId, amount: Tokens) -> Result<()> {
        if amount.is_zero() {
            return Err(IndentureError::InvalidInput(
                "transfer amount must be > 0".into(),
            ));
        }
        if from == to {
            return Err(IndentureError::InvalidInput(
                "transfer to self is a no-op".into(),
            ));
        }
        let src = self.balances(from);
        if src.free < amount.get() {
            return Err(IndentureError::InsufficientFunds {
                requested: amount.get(),
                available: src.free,
            });
        }
        let new_from_free = sub_u64(src.free, amount.get())?;
        let new_to_free = add_u64(self.balances(to).free, amount.get())?;

        // Commit.
        self.accounts.entry(from).or_default().free = new_from_free;
        self.accounts.entry(to).or_default().free = new_to_free;
        Ok(())
    }

    /// Moves free balance into the locked column (bond issuance path).
    pub fn lock(&mut self, account: AccountId, amount: Tokens) -> Result<()> {
        let b = self.balances(account);
        if b.free < amount.get() {
            return Err(IndentureError::InsufficientFunds {
                requested: amount.get(),
                available: b.free,
            });
        }
        let new_free = sub_u64(b.free, amount.get())?;
        let new_locked = add_u64(b.locked, amount.get())?;
        let e = self.accounts.entry(account).or_default();
        e.free = new_free;
        e.locked = new_locked;
        Ok(())
    }

    /// Moves locked balance back to the free column (redemption / early
    /// withdrawal path).
    pub fn unlock(&mut self, account: AccountId, amount: Tokens) -> Result<()> {
        let b = self.balances(account);
        if b.locked < amount.get() {
            return Err(IndentureError::InsufficientLocked {
                requested: amount.get(),
                available: b.locked,
            });
        }
        let new_locked = sub_u64(b.locked, amount.get())?;
        let new_free = add_u64(b.free, amount.get())?;
        let e = self.accounts.entry(account).or_default();
        e.free = new_free;
        e.locked = new_locked;
        Ok(())
    }

    /// Credits stablecoin to an account (vault payout paths only).
    pub fn credit_stable(&mut self, account: AccountId, amount: Stable) -> Result<()> {
        let new_stable = add_u64(self.balances(account).stable, amount.get())?;
        self.accounts.entry(account).or_default().stable = new_stable;
        Ok(())
    }

    /// Creates tokens and raises total supply by the same amount.
    ///
    /// Reachable only through executed `NewIssue` governance and genesis; the
    /// engine never exposes it as a public operation.
    pub(crate) fn mint(&mut self, account: AccountId, amount: Tokens) -> Result<()> {
        let new_supply = add_u64(self.total_supply, amount.get())?;
        let new_free = add_u64(self.balances(account).free, amount.get())?;
        self.total_supply = new_supply;
        self.accounts.entry(account).or_default().free = new_free;
        Ok(())
    }

    /// Restores one account record verbatim (snapshot load path).
    pub(crate) fn restore_account(&mut self, account: AccountId, balances: AccountBalances) {
        self.accounts.insert(account, balances);
    }

    /// Restores the supply accumulator verbatim (snapshot load path).
    pub(crate) fn restore_supply(&mut self, total_supply: u64) {
        self.total_supply = total_supply;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Hash32;

    fn acct(b: u8) -> AccountId {
        AccountId(Hash32([b; 32]))
    }

    fn funded(balance: u64) -> (Ledger, AccountId) {
        let mut l = Ledger::new();
        let a = acct(1);
        l.mint(a, Tokens::new(balance)).unwrap();
        (l, a)
    }

    #[test]
    fn transfer_moves_free_balance() {
        let (mut l, a) = funded(1_000);
        let b = acct(2);
        l.transfer(a, b, Tokens::new(300)).unwrap();
        assert_eq!(l.free_balance(a).get(), 700);
        assert_eq!(l.free_balance(b).get(), 300);
        assert_eq!(l.total_supply().get(), 1_000);
    }

    #[test]
    fn overdraw_fails_without_mutation() {
        let (mut l, a) = funded(100);
        let before = l.clone();
        let err = l.transfer(a, acct(2), Tokens::new(101)).unwrap_err();
        assert!(matches!(
            err,
            IndentureError::InsufficientFunds {
                requested: 101,
                available: 100
            }
        ));
        assert_eq!(l, before);
    }

    #[test]
    fn zero_and_self_transfers_are_rejected() {
        let (mut l, a) = funded(100);
        assert!(l.transfer(a, acct(2), Tokens::ZERO).is_err());
        assert!(l.transfer(a, a, Tokens::new(10)).is_err());
    }

    #[test]
    fn lock_unlock_round_trip() {
        let (mut l, a) = funded(1_000);
        l.lock(a, Tokens::new(400)).unwrap();
        assert_eq!(l.free_balance(a).get(), 600);
        assert_eq!(l.locked_balance(a).get(), 400);
        assert_eq!(l.total_locked().get(), 400);

        l.unlock(a, Tokens::new(400)).unwrap();
        assert_eq!(l.free_balance(a).get(), 1_000);
        assert_eq!(l.locked_balance(a).get(), 0);
    }

    #[test]
    fn unlock_more_than_locked_fails() {
        let (mut l, a) = funded(1_000);
        l.lock(a, Tokens::new(100)).unwrap();
        assert!(matches!(
            l.unlock(a, Tokens::new(101)),
            Err(IndentureError::InsufficientLocked {
                requested: 101,
                available: 100
            })
        ));
    }

    #[test]
    fn conservation_totals_track_mint_and_moves() {
        let (mut l, a) = funded(1_000);
        l.lock(a, Tokens::new(250)).unwrap();
        l.transfer(a, acct(2), Tokens::new(100)).unwrap();
        assert_eq!(l.total_tokens(), 1_000);
        assert_eq!(l.total_tokens(), l.total_supply().get() as u128);

        l.credit_stable(acct(2), Stable::new(77)).unwrap();
        assert_eq!(l.total_stable(), 77);
    }
}
