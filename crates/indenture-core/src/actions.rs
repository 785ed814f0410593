//! Closed action/outcome enums mirroring the engine's public operations.
//!
//! `IndentureLedger::apply` dispatches these one-to-one, which gives the
//! invariant rail (and replay-style tests) a uniform way to drive the engine
//! through arbitrary operation traces.

use crate::distribution::RoundOutcome;
use crate::governance::{ProposalPayload, ProposalState, VoteChoice};
use crate::oracle::PriceQuote;
use crate::types::{AccountId, BondId, Bps, ProposalId, Stable, Timestamp, Tokens};
use crate::vault::CollateralStatus;
use crate::Hash32;

/// Ledger state transition inputs, one variant per public operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Transfer {
        from: AccountId,
        to: AccountId,
        amount: Tokens,
    },

    DepositCollateral {
        from: AccountId,
        amount: Stable,
    },
    DepositYield {
        from: AccountId,
        amount: Stable,
    },
    RefreshStatus {
        quote: PriceQuote,
        now: Timestamp,
    },
    UnlockFunds {
        caller: AccountId,
        fraction: Bps,
    },
    WithdrawCollateral {
        caller: AccountId,
        amount: Stable,
    },

    IssueBond {
        owner: AccountId,
        amount: Tokens,
        maturity_at: Timestamp,
        now: Timestamp,
        nonce: Hash32,
    },
    Redeem {
        caller: AccountId,
        bond: BondId,
        now: Timestamp,
    },
    WithdrawEarly {
        caller: AccountId,
        bond: BondId,
        now: Timestamp,
    },

    Propose {
        proposer: AccountId,
        payload: ProposalPayload,
        title: String,
        now: Timestamp,
    },
    OpenVoting {
        caller: AccountId,
        proposal: ProposalId,
        now: Timestamp,
    },
    Vote {
        voter: AccountId,
        proposal: ProposalId,
        choice: VoteChoice,
        now: Timestamp,
    },
    Finalize {
        proposal: ProposalId,
        now: Timestamp,
    },
    Execute {
        proposal: ProposalId,
        now: Timestamp,
    },
    MarkExpired {
        proposal: ProposalId,
        now: Timestamp,
    },
    Cancel {
        caller: AccountId,
        proposal: ProposalId,
    },

    RunRound {
        now: Timestamp,
    },
}

/// Outcome of a bond issuance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BondIssueOutcome {
    pub bond: BondId,
    pub redemption_amount: Stable,
}

/// Outcome of an early withdrawal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EarlyWithdrawalOutcome {
    pub returned: Tokens,
    pub penalty: Tokens,
}

/// The observable result of a state transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionOutcome {
    Unit,
    IssueBond(BondIssueOutcome),
    WithdrawEarly(EarlyWithdrawalOutcome),
    UnlockFunds { released: Tokens },
    RefreshStatus(CollateralStatus),
    Propose(ProposalId),
    ProposalState(ProposalState),
    RunRound(RoundOutcome),
}
