use crate::{IndentureError, Result};

/// Runtime bounds for the in-memory ledger engine.
///
/// These are **safety bounds**, not economic parameters:
/// - they prevent unbounded memory/CPU usage (DoS resistance)
/// - they make round computation and governance tallies predictable
///
/// Deployments may size these to the expected investor population, but they
/// MUST remain bounded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuntimeBounds {
    pub max_accounts: usize,
    pub max_bonds: usize,
    pub max_bonds_per_account: usize,
    pub max_proposals: usize,
    pub max_votes_per_proposal: usize,
}

impl RuntimeBounds {
    pub const HARD_MAX_ACCOUNTS: usize = 1_000_000;
    pub const HARD_MAX_BONDS: usize = 1_000_000;
    pub const HARD_MAX_BONDS_PER_ACCOUNT: usize = 1024;
    pub const HARD_MAX_PROPOSALS: usize = 100_000;
    pub const HARD_MAX_VOTES_PER_PROPOSAL: usize = 1_000_000;

    /// Default: sized to a mid-size bond program (configurable).
    pub const DEFAULT_MAX_ACCOUNTS: usize = 100_000;
    /// Default: caps per-round allocation work (configurable).
    pub const DEFAULT_MAX_BONDS: usize = 200_000;
    /// Default: typical per-investor bond fanout (configurable).
    pub const DEFAULT_MAX_BONDS_PER_ACCOUNT: usize = 64;
    /// Default: bounded governance book (configurable).
    pub const DEFAULT_MAX_PROPOSALS: usize = 10_000;
    /// Default: bounded tally size per proposal (configurable).
    pub const DEFAULT_MAX_VOTES_PER_PROPOSAL: usize = 100_000;

    pub fn new(
        max_accounts: usize,
        max_bonds: usize,
        max_bonds_per_account: usize,
        max_proposals: usize,
        max_votes_per_proposal: usize,
    ) -> Result<Self> {
        let b = RuntimeBounds {
            max_accounts,
            max_bonds,
            max_bonds_per_account,
            max_proposals,
            max_votes_per_proposal,
        };
        b.validate()?;
        Ok(b)
    }

    pub fn validate(self) -> Result<()> {
        if self.max_accounts == 0 || self.max_accounts > Self::HARD_MAX_ACCOUNTS {
            return Err(IndentureError::InvalidInput(format!(
                "max_accounts out of bounds: {}",
                self.max_accounts
            )));
        }
        if self.max_bonds == 0 || self.max_bonds > Self::HARD_MAX_BONDS {
            return Err(IndentureError::InvalidInput(format!(
                "max_bonds out of bounds: {}",
                self.max_bonds
            )));
        }
        if self.max_bonds_per_account == 0
            || self.max_bonds_per_account > Self::HARD_MAX_BONDS_PER_ACCOUNT
        {
            return Err(IndentureError::InvalidInput(format!(
                "max_bonds_per_account out of bounds: {}",
                self.max_bonds_per_account
            )));
        }
        if self.max_proposals == 0 || self.max_proposals > Self::HARD_MAX_PROPOSALS {
            return Err(IndentureError::InvalidInput(format!(
                "max_proposals out of bounds: {}",
                self.max_proposals
            )));
        }
        if self.max_votes_per_proposal == 0
            || self.max_votes_per_proposal > Self::HARD_MAX_VOTES_PER_PROPOSAL
        {
            return Err(IndentureError::InvalidInput(format!(
                "max_votes_per_proposal out of bounds: {}",
                self.max_votes_per_proposal
            )));
        }
        Ok(())
    }
}

impl Default for RuntimeBounds {
    fn default() -> Self {
        Self {
            max_accounts: Self::DEFAULT_MAX_ACCOUNTS,
            max_bonds: Self::DEFAULT_MAX_BONDS,
            max_bonds_per_account: Self::DEFAULT_MAX_BONDS_PER_ACCOUNT,
            max_proposals: Self::DEFAULT_MAX_PROPOSALS,
            max_votes_per_proposal: Self::DEFAULT_MAX_VOTES_PER_PROPOSAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bounds_validate() {
        assert!(RuntimeBounds::default().validate().is_ok());
    }

    #[test]
    fn zero_and_oversized_bounds_are_rejected() {
        assert!(RuntimeBounds::new(0, 1, 1, 1, 1).is_err());
        assert!(RuntimeBounds::new(
            RuntimeBounds::HARD_MAX_ACCOUNTS + 1,
            1,
            1,
            1,
            1
        )
        .is_err());
        assert!(RuntimeBounds::new(10, 10, 10, 10, 10).is_ok());
    }
}
