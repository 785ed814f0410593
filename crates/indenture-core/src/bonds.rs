//! Bond registry: issuance validation, the per-bond state machine, and the
//! active-principal views the distribution and invariant code read.
//!
//! The registry never moves balances itself. The engine validates an
//! operation end to end (registry checks, ledger funds, vault reserve) and
//! only then commits all sides in one atomic unit.

use std::collections::BTreeMap;

use crate::math::{add_u64, bond_redemption};
use crate::types::{AccountId, BondId, Bps, Stable, Timestamp, Tokens};
use crate::{Hash32, IndentureError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BondState {
    Active,
    Redeemed,
    WithdrawnEarly,
}

/// A claim created by locking tokens, redeemable for a fixed amount at
/// maturity. Immutable after issuance except for the terminal state change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bond {
    pub id: BondId,
    pub owner: AccountId,
    pub principal: Tokens,
    pub issued_at: Timestamp,
    pub maturity_at: Timestamp,
    /// Fixed at issuance from the rate then in effect; later rate changes
    /// and price moves never touch it.
    pub redemption_amount: Stable,
    pub state: BondState,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BondRegistry {
    bonds: BTreeMap<BondId, Bond>,
    /// Cumulative principal ever raised (monotone; terminal bonds included).
    total_raised: u64,
}

impl BondRegistry {
    pub fn new() -> BondRegistry {
        BondRegistry::default()
    }

    pub fn get(&self, id: BondId) -> Result<&Bond> {
        self.bonds
            .get(&id)
            .ok_or_else(|| IndentureError::InvalidInput("unknown bond id".into()))
    }

    pub fn count(&self) -> usize {
        self.bonds.len()
    }

    pub fn count_for(&self, owner: AccountId) -> usize {
        self.bonds.values().filter(|b| b.owner == owner).count()
    }

    pub fn total_raised(&self) -> Tokens {
        Tokens::new(self.total_raised)
    }

    /// Deterministic iteration over all bonds.
    pub fn iter(&self) -> impl Iterator<Item = &Bond> {
        self.bonds.values()
    }

    /// Active bonds as `(owner, id, principal)`, in bond-id order.
    pub fn active_entries(&self) -> Vec<(AccountId, BondId, u64)> {
        self.bonds
            .values()
            .filter(|b| b.state == BondState::Active)
            .map(|b| (b.owner, b.id, b.principal.get()))
            .collect()
    }

    /// Sum of active principal per owner, for the locked-backing invariant.
    pub fn active_principal_by_owner(&self) -> BTreeMap<AccountId, u128> {
        let mut out: BTreeMap<AccountId, u128> = BTreeMap::new();
        for b in self.bonds.values() {
            if b.state == BondState::Active {
                *out.entry(b.owner).or_default() += b.principal.get() as u128;
            }
        }
        out
    }

    /// Validates a new bond without committing it.
    ///
    /// The redemption amount is computed here, from the rate the caller read
    /// out of live params, and is final once the bond is inserted.
    pub fn validate_issue(
        &self,
        owner: AccountId,
        principal: Tokens,
        maturity_at: Timestamp,
        now: Timestamp,
        nonce: Hash32,
        interest_rate: Bps,
        min_investment: Tokens,
    ) -> Result<Bond> {
        if principal < min_investment || principal.is_zero() {
            return Err(IndentureError::InvalidInput(format!(
                "principal {} below minimum investment {}",
                principal.get(),
                min_investment.get()
            )));
        }
        if maturity_at <= now {
            return Err(IndentureError::InvalidInput(
                "maturity must be in the future".into(),
            ));
        }
        let id = BondId::derive(owner, now, nonce);
        if self.bonds.contains_key(&id) {
            return Err(IndentureError::InvalidInput("bond id collision".into()));
        }
        let term_secs = maturity_at.since(now) as u64;
        let redemption = bond_redemption(principal.get(), interest_rate, term_secs)?;
        Ok(Bond {
            id,
            owner,
            principal,
            issued_at: now,
            maturity_at,
            redemption_amount: Stable::new(redemption),
            state: BondState::Active,
        })
    }

    /// Commits a bond previously produced by `validate_issue`.
    pub fn insert(&mut self, bond: Bond) -> Result<()> {
        if self.bonds.contains_key(&bond.id) {
            return Err(IndentureError::InvalidInput("bond id collision".into()));
        }
        self.total_raised = add_u64(self.total_raised, bond.principal.get())?;
        self.bonds.insert(bond.id, bond);
        Ok(())
    }

    /// Checks a redemption without committing: caller owns the bond, the
    /// bond is active, and maturity has passed.
    pub fn validate_redeem(&self, caller: AccountId, id: BondId, now: Timestamp) -> Result<&Bond> {
        let bond = self.get(id)?;
        if bond.owner != caller {
            return Err(IndentureError::InvalidInput(
                "caller is not the bond owner".into(),
            ));
        }
        if bond.state != BondState::Active {
            return Err(IndentureError::AlreadyRedeemed);
        }
        if now < bond.maturity_at {
            return Err(IndentureError::NotMatured {
                now: now.get(),
                maturity: bond.maturity_at.get(),
            });
        }
        Ok(bond)
    }

    /// Checks an early withdrawal without committing: strictly before
    /// maturity; matured bonds must go through `redeem`.
    pub fn validate_withdraw_early(
        &self,
        caller: AccountId,
        id: BondId,
        now: Timestamp,
    ) -> Result<&Bond> {
        let bond = self.get(id)?;
        if bond.owner != caller {
            return Err(IndentureError::InvalidInput(
                "caller is not the bond owner".into(),
            ));
        }
        if bond.state != BondState::Active {
            return Err(IndentureError::AlreadyRedeemed);
        }
        if now >= bond.maturity_at {
            return Err(IndentureError::AlreadyMatured {
                now: now.get(),
                maturity: bond.maturity_at.get(),
            });
        }
        Ok(bond)
    }

    /// Moves a validated bond to a terminal state.
    pub fn set_state(&mut self, id: BondId, state: BondState) -> Result<()> {
        let bond = self
            .bonds
            .get_mut(&id)
            .ok_or_else(|| IndentureError::InvalidInput("unknown bond id".into()))?;
        if bond.state != BondState::Active {
            return Err(IndentureError::AlreadyRedeemed);
        }
        bond.state = state;
        Ok(())
    }

    /// Restores one bond verbatim (snapshot load path).
    pub(crate) fn restore_bond(&mut self, bond: Bond) {
        self.bonds.insert(bond.id, bond);
    }

    /// Restores the raised accumulator verbatim (snapshot load path).
    pub(crate) fn restore_total_raised(&mut self, total_raised: u64) {
        self.total_raised = total_raised;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::SECS_PER_YEAR;

    fn acct(b: u8) -> AccountId {
        AccountId(Hash32([b; 32]))
    }

    fn issue_one(reg: &mut BondRegistry, owner: AccountId, principal: u64, nonce: u8) -> Bond {
        let now = Timestamp(1_000);
        let bond = reg
            .validate_issue(
                owner,
                Tokens::new(principal),
                now.plus_secs(SECS_PER_YEAR),
                now,
                Hash32([nonce; 32]),
                Bps::new(1_000).unwrap(),
                Tokens::new(1),
            )
            .unwrap();
        reg.insert(bond).unwrap();
        bond
    }

    #[test]
    fn issuance_fixes_redemption_from_current_rate() {
        let mut reg = BondRegistry::new();
        let bond = issue_one(&mut reg, acct(1), 100_000, 7);
        assert_eq!(bond.redemption_amount.get(), 110_000);
        assert_eq!(reg.total_raised().get(), 100_000);
        assert_eq!(reg.get(bond.id).unwrap().state, BondState::Active);
    }

    #[test]
    fn issuance_rejects_dust_and_past_maturity() {
        let reg = BondRegistry::new();
        let now = Timestamp(1_000);
        assert!(reg
            .validate_issue(
                acct(1),
                Tokens::new(10),
                now.plus_secs(100),
                now,
                Hash32([1; 32]),
                Bps::new(1_000).unwrap(),
                Tokens::new(100),
            )
            .is_err());
        assert!(reg
            .validate_issue(
                acct(1),
                Tokens::new(1_000),
                now,
                now,
                Hash32([1; 32]),
                Bps::new(1_000).unwrap(),
                Tokens::new(100),
            )
            .is_err());
    }

    #[test]
    fn redeem_gates_on_owner_state_and_maturity() {
        let mut reg = BondRegistry::new();
        let bond = issue_one(&mut reg, acct(1), 100_000, 7);

        assert!(matches!(
            reg.validate_redeem(acct(2), bond.id, bond.maturity_at),
            Err(IndentureError::InvalidInput(_))
        ));
        assert!(matches!(
            reg.validate_redeem(acct(1), bond.id, Timestamp(2_000)),
            Err(IndentureError::NotMatured { .. })
        ));
        assert!(reg.validate_redeem(acct(1), bond.id, bond.maturity_at).is_ok());

        reg.set_state(bond.id, BondState::Redeemed).unwrap();
        assert!(matches!(
            reg.validate_redeem(acct(1), bond.id, bond.maturity_at),
            Err(IndentureError::AlreadyRedeemed)
        ));
        assert!(matches!(
            reg.set_state(bond.id, BondState::Redeemed),
            Err(IndentureError::AlreadyRedeemed)
        ));
    }

    #[test]
    fn early_withdrawal_is_strictly_pre_maturity() {
        let mut reg = BondRegistry::new();
        let bond = issue_one(&mut reg, acct(1), 100_000, 7);

        assert!(reg
            .validate_withdraw_early(acct(1), bond.id, Timestamp(2_000))
            .is_ok());
        assert!(matches!(
            reg.validate_withdraw_early(acct(1), bond.id, bond.maturity_at),
            Err(IndentureError::AlreadyMatured { .. })
        ));
    }

    #[test]
    fn active_views_exclude_terminal_bonds() {
        let mut reg = BondRegistry::new();
        let b1 = issue_one(&mut reg, acct(1), 300, 1);
        let _b2 = issue_one(&mut reg, acct(2), 700, 2);

        reg.set_state(b1.id, BondState::WithdrawnEarly).unwrap();
        let entries = reg.active_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].2, 700);

        let by_owner = reg.active_principal_by_owner();
        assert_eq!(by_owner.get(&acct(2)), Some(&700));
        assert!(!by_owner.contains_key(&acct(1)));

        // Raised accumulator is monotone: terminal bonds still count.
        assert_eq!(reg.total_raised().get(), 1_000);
    }
}
