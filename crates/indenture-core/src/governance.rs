//! Governance: proposal lifecycle, token-weighted voting, and the closed
//! payload enum executed proposals apply to the rest of the system.
//!
//! Voting power is the voter's live locked balance at vote time; re-voting
//! fully retracts the previous weight before applying the new one, so repeat
//! votes can never double count. Quorum and total power freeze when voting
//! opens, which keeps the success predicate stable for the whole window.

use std::collections::BTreeMap;

use tracing::debug;

use crate::math::{add_u64, floor_bps, sub_u64};
use crate::types::{AccountId, Bps, ProposalId, Stable, Timestamp, Tokens, RATE_CAP_BPS};
use crate::{IndentureError, Result};

/// Supermajority threshold for rate/ratio changes: 51% of total frozen power.
pub const SUPERMAJORITY_BPS: u64 = 5_100;

/// Upper bound on proposal titles (operator visibility only, semantics-free).
pub const MAX_TITLE_LEN: usize = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteChoice {
    For,
    Against,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VoteRecord {
    pub choice: VoteChoice,
    pub weight: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateTarget {
    DistributionRate,
    BondInterestRate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReallocationDirection {
    CollateralToYield,
    YieldToCollateral,
}

/// One variant per governed decision kind; the variant determines both the
/// tally threshold and the execution effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProposalPayload {
    RateChange { target: RateTarget, new_rate: Bps },
    NewIssue { amount: Tokens },
    ReserveReallocation {
        direction: ReallocationDirection,
        amount: Stable,
    },
    RatioAdjustment { new_ratio: Bps },
}

impl ProposalPayload {
    /// Structural validation, applied at proposal time and again at
    /// execution (params may have changed in between).
    pub fn validate(&self) -> Result<()> {
        match self {
            ProposalPayload::RateChange { new_rate, .. } => {
                if new_rate.get() > RATE_CAP_BPS {
                    return Err(IndentureError::BoundedValueExceeded(format!(
                        "proposed rate {}bps exceeds cap {RATE_CAP_BPS}bps",
                        new_rate.get()
                    )));
                }
            }
            ProposalPayload::NewIssue { amount } => {
                if amount.is_zero() {
                    return Err(IndentureError::InvalidInput(
                        "issue amount must be > 0".into(),
                    ));
                }
            }
            ProposalPayload::ReserveReallocation { amount, .. } => {
                if amount.is_zero() {
                    return Err(IndentureError::InvalidInput(
                        "reallocation amount must be > 0".into(),
                    ));
                }
            }
            ProposalPayload::RatioAdjustment { new_ratio } => {
                if *new_ratio == Bps::ZERO {
                    return Err(IndentureError::InvalidInput(
                        "collateral ratio must be > 0".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Rate and ratio changes need a 51% supermajority of frozen power;
    /// issuance and reallocation pass on quorum plus simple majority.
    pub fn is_supermajority(&self) -> bool {
        matches!(
            self,
            ProposalPayload::RateChange { .. } | ProposalPayload::RatioAdjustment { .. }
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProposalState {
    Draft,
    Active,
    Defeated,
    Queued,
    Executed,
    Expired,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proposal {
    pub id: ProposalId,
    pub proposer: AccountId,
    pub title: String,
    pub payload: ProposalPayload,
    pub state: ProposalState,
    pub created_at: Timestamp,
    /// Voting window; meaningful from `Active` onward.
    pub voting_starts_at: Timestamp,
    pub voting_ends_at: Timestamp,
    /// Earliest execution time; meaningful from `Queued` onward.
    pub eta: Timestamp,
    /// Frozen at activation.
    pub quorum_required: u64,
    pub total_power: u64,
    pub votes_for: u64,
    pub votes_against: u64,
    pub votes: BTreeMap<AccountId, VoteRecord>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GovernanceEngine {
    proposals: BTreeMap<ProposalId, Proposal>,
    next_id: u64,
}

impl GovernanceEngine {
    pub fn new() -> GovernanceEngine {
        GovernanceEngine::default()
    }

    pub fn get(&self, id: ProposalId) -> Result<&Proposal> {
        self.proposals
            .get(&id)
            .ok_or_else(|| IndentureError::InvalidInput("unknown proposal id".into()))
    }

    fn get_mut(&mut self, id: ProposalId) -> Result<&mut Proposal> {
        self.proposals
            .get_mut(&id)
            .ok_or_else(|| IndentureError::InvalidInput("unknown proposal id".into()))
    }

    pub fn count(&self) -> usize {
        self.proposals.len()
    }

    /// The id the next proposal will take.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Deterministic iteration over all proposals.
    pub fn iter(&self) -> impl Iterator<Item = &Proposal> {
        self.proposals.values()
    }

    pub fn propose(
        &mut self,
        proposer: AccountId,
        payload: ProposalPayload,
        title: String,
        now: Timestamp,
    ) -> Result<ProposalId> {
        payload.validate()?;
        if title.len() > MAX_TITLE_LEN {
            return Err(IndentureError::InvalidInput(format!(
                "title exceeds {MAX_TITLE_LEN} bytes"
            )));
        }
        let id = ProposalId(self.next_id);
        self.next_id = add_u64(self.next_id, 1)?;
        self.proposals.insert(
            id,
            Proposal {
                id,
                proposer,
                title,
                payload,
                state: ProposalState::Draft,
                created_at: now,
                voting_starts_at: Timestamp(0),
                voting_ends_at: Timestamp(0),
                eta: Timestamp(0),
                quorum_required: 0,
                total_power: 0,
                votes_for: 0,
                votes_against: 0,
                votes: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    /// `Draft -> Active`: proposer-only, gated on the proposer's locked
    /// balance. Freezes quorum and total power at this moment.
    pub fn open_voting(
        &mut self,
        caller: AccountId,
        id: ProposalId,
        now: Timestamp,
        proposer_locked: Tokens,
        threshold: Tokens,
        total_locked: Tokens,
        quorum: Bps,
        voting_period_secs: u64,
    ) -> Result<()> {
        let quorum_required = floor_bps(total_locked.get(), quorum)?;
        let p = self.get_mut(id)?;
        if p.state != ProposalState::Draft {
            return Err(IndentureError::InvalidTransition(format!(
                "open_voting requires Draft, proposal is {:?}",
                p.state
            )));
        }
        if p.proposer != caller {
            return Err(IndentureError::InvalidInput(
                "only the proposer may open voting".into(),
            ));
        }
        if proposer_locked < threshold {
            return Err(IndentureError::ThresholdNotMet {
                locked: proposer_locked.get(),
                required: threshold.get(),
            });
        }
        p.state = ProposalState::Active;
        p.voting_starts_at = now;
        p.voting_ends_at = now.plus_secs(voting_period_secs);
        p.quorum_required = quorum_required;
        p.total_power = total_locked.get();
        debug!(proposal = id.0, total_power = p.total_power, "voting opened");
        Ok(())
    }

    /// Casts or replaces a vote with the voter's live locked weight.
    pub fn vote(
        &mut self,
        voter: AccountId,
        id: ProposalId,
        choice: VoteChoice,
        now: Timestamp,
        weight: Tokens,
        max_votes_per_proposal: usize,
    ) -> Result<()> {
        let p = self.get_mut(id)?;
        if p.state != ProposalState::Active {
            return Err(IndentureError::VotingClosed(format!(
                "proposal is {:?}",
                p.state
            )));
        }
        if now < p.voting_starts_at || now >= p.voting_ends_at {
            return Err(IndentureError::VotingClosed(format!(
                "now {} outside window [{}, {})",
                now.get(),
                p.voting_starts_at.get(),
                p.voting_ends_at.get()
            )));
        }
        if weight.is_zero() {
            return Err(IndentureError::NoPower);
        }
        // Safety bound: caps tally size per proposal.
        if !p.votes.contains_key(&voter) && p.votes.len() >= max_votes_per_proposal {
            return Err(IndentureError::BoundedValueExceeded(
                "max votes per proposal exceeded".into(),
            ));
        }

        // Validate the full retract-and-apply before mutating either tally.
        let (mut new_for, mut new_against) = (p.votes_for, p.votes_against);
        if let Some(prev) = p.votes.get(&voter) {
            match prev.choice {
                VoteChoice::For => new_for = sub_u64(new_for, prev.weight)?,
                VoteChoice::Against => new_against = sub_u64(new_against, prev.weight)?,
            }
        }
        match choice {
            VoteChoice::For => new_for = add_u64(new_for, weight.get())?,
            VoteChoice::Against => new_against = add_u64(new_against, weight.get())?,
        }

        p.votes_for = new_for;
        p.votes_against = new_against;
        p.votes.insert(
            voter,
            VoteRecord {
                choice,
                weight: weight.get(),
            },
        );
        Ok(())
    }

    /// Tallies an ended voting window. Success goes straight to `Queued`
    /// with `eta = voting_ends_at + execution_delay`.
    pub fn finalize(
        &mut self,
        id: ProposalId,
        now: Timestamp,
        execution_delay_secs: u64,
    ) -> Result<ProposalState> {
        let p = self.get_mut(id)?;
        if p.state != ProposalState::Active {
            return Err(IndentureError::InvalidTransition(format!(
                "finalize requires Active, proposal is {:?}",
                p.state
            )));
        }
        if now < p.voting_ends_at {
            return Err(IndentureError::InvalidTransition(format!(
                "voting open until {}",
                p.voting_ends_at.get()
            )));
        }

        let majority = p.votes_for > p.votes_against;
        let succeeded = if p.payload.is_supermajority() {
            let lhs = (p.votes_for as u128) * 10_000;
            let rhs = (p.total_power as u128) * (SUPERMAJORITY_BPS as u128);
            majority && lhs >= rhs
        } else {
            majority && p.votes_for >= p.quorum_required
        };

        if succeeded {
            p.state = ProposalState::Queued;
            p.eta = p.voting_ends_at.plus_secs(execution_delay_secs);
        } else {
            p.state = ProposalState::Defeated;
        }
        debug!(
            proposal = id.0,
            votes_for = p.votes_for,
            votes_against = p.votes_against,
            quorum_required = p.quorum_required,
            state = ?p.state,
            "proposal finalized"
        );
        Ok(p.state)
    }

    /// Checks execution eligibility without committing; returns the payload
    /// for the engine to apply.
    ///
    /// Past the execution window this fails `ProposalExpired` without
    /// mutating; the explicit `mark_expired` operation performs the
    /// `Queued -> Expired` transition as a successful call.
    pub fn validate_execute(
        &self,
        id: ProposalId,
        now: Timestamp,
        execution_window_secs: u64,
    ) -> Result<ProposalPayload> {
        let p = self.get(id)?;
        if p.state != ProposalState::Queued {
            return Err(IndentureError::InvalidTransition(format!(
                "execute requires Queued, proposal is {:?}",
                p.state
            )));
        }
        if now < p.eta {
            return Err(IndentureError::ExecutionDelayPending {
                now: now.get(),
                eta: p.eta.get(),
            });
        }
        let deadline = p.eta.plus_secs(execution_window_secs);
        if now > deadline {
            return Err(IndentureError::ProposalExpired {
                now: now.get(),
                deadline: deadline.get(),
            });
        }
        p.payload.validate()?;
        Ok(p.payload)
    }

    /// Commits the `Queued -> Executed` transition after the payload applied.
    pub fn mark_executed(&mut self, id: ProposalId) -> Result<()> {
        let p = self.get_mut(id)?;
        if p.state != ProposalState::Queued {
            return Err(IndentureError::InvalidTransition(format!(
                "mark_executed requires Queued, proposal is {:?}",
                p.state
            )));
        }
        p.state = ProposalState::Executed;
        Ok(())
    }

    /// `Queued -> Expired`, once the execution window has been missed.
    pub fn mark_expired(
        &mut self,
        id: ProposalId,
        now: Timestamp,
        execution_window_secs: u64,
    ) -> Result<ProposalState> {
        let p = self.get_mut(id)?;
        if p.state != ProposalState::Queued {
            return Err(IndentureError::InvalidTransition(format!(
                "mark_expired requires Queued, proposal is {:?}",
                p.state
            )));
        }
        let deadline = p.eta.plus_secs(execution_window_secs);
        if now <= deadline {
            return Err(IndentureError::InvalidTransition(format!(
                "execution window open until {}",
                deadline.get()
            )));
        }
        p.state = ProposalState::Expired;
        Ok(p.state)
    }

    /// `Draft | Active -> Cancelled`, proposer only.
    pub fn cancel(&mut self, caller: AccountId, id: ProposalId) -> Result<()> {
        let p = self.get_mut(id)?;
        if p.proposer != caller {
            return Err(IndentureError::InvalidInput(
                "only the proposer may cancel".into(),
            ));
        }
        match p.state {
            ProposalState::Draft | ProposalState::Active => {
                p.state = ProposalState::Cancelled;
                Ok(())
            }
            other => Err(IndentureError::InvalidTransition(format!(
                "cancel requires Draft or Active, proposal is {other:?}"
            ))),
        }
    }

    /// Restores one proposal verbatim (snapshot load path).
    pub(crate) fn restore_proposal(&mut self, proposal: Proposal) {
        self.proposals.insert(proposal.id, proposal);
    }

    /// Restores the id counter verbatim (snapshot load path).
    pub(crate) fn restore_next_id(&mut self, next_id: u64) {
        self.next_id = next_id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Hash32;

    fn acct(b: u8) -> AccountId {
        AccountId(Hash32([b; 32]))
    }

    fn rate_payload(bps: u16) -> ProposalPayload {
        ProposalPayload::RateChange {
            target: RateTarget::DistributionRate,
            new_rate: Bps::new(bps).unwrap(),
        }
    }

    fn issue_payload(amount: u64) -> ProposalPayload {
        ProposalPayload::NewIssue {
            amount: Tokens::new(amount),
        }
    }

    /// Draft proposal by account 1 with an opened voting window of 100s,
    /// total locked power 500_000, quorum 51%.
    fn active_proposal(gov: &mut GovernanceEngine, payload: ProposalPayload) -> ProposalId {
        let id = gov
            .propose(acct(1), payload, "p".into(), Timestamp(0))
            .unwrap();
        gov.open_voting(
            acct(1),
            id,
            Timestamp(10),
            Tokens::new(50_000),
            Tokens::new(10_000),
            Tokens::new(500_000),
            Bps::new(5_100).unwrap(),
            100,
        )
        .unwrap();
        id
    }

    #[test]
    fn payload_validation_enforces_caps() {
        assert!(rate_payload(1_000).validate().is_ok());
        assert!(rate_payload(1_001).validate().is_err());
        assert!(issue_payload(0).validate().is_err());
        assert!(ProposalPayload::RatioAdjustment {
            new_ratio: Bps::ZERO
        }
        .validate()
        .is_err());
    }

    #[test]
    fn open_voting_requires_proposer_and_threshold() {
        let mut gov = GovernanceEngine::new();
        let id = gov
            .propose(acct(1), issue_payload(10), "p".into(), Timestamp(0))
            .unwrap();

        let err = gov
            .open_voting(
                acct(2),
                id,
                Timestamp(10),
                Tokens::new(50_000),
                Tokens::new(10_000),
                Tokens::new(500_000),
                Bps::new(5_100).unwrap(),
                100,
            )
            .unwrap_err();
        assert!(matches!(err, IndentureError::InvalidInput(_)));

        let err = gov
            .open_voting(
                acct(1),
                id,
                Timestamp(10),
                Tokens::new(9_999),
                Tokens::new(10_000),
                Tokens::new(500_000),
                Bps::new(5_100).unwrap(),
                100,
            )
            .unwrap_err();
        assert!(matches!(err, IndentureError::ThresholdNotMet { .. }));
    }

    #[test]
    fn quorum_scenario_260k_passes_250k_fails() {
        // Simple-majority kind, quorum 51% of 500_000 = 255_000.
        for (votes_for, expect) in [
            (260_000u64, ProposalState::Queued),
            (250_000u64, ProposalState::Defeated),
        ] {
            let mut gov = GovernanceEngine::new();
            let id = active_proposal(&mut gov, issue_payload(10));
            gov.vote(
                acct(3),
                id,
                VoteChoice::For,
                Timestamp(20),
                Tokens::new(votes_for),
                100,
            )
            .unwrap();
            assert_eq!(gov.finalize(id, Timestamp(110), 50).unwrap(), expect);
        }
    }

    #[test]
    fn supermajority_kind_needs_51_percent_of_total_power() {
        // 51% of 500_000 total power = 255_000, regardless of quorum votes.
        let mut gov = GovernanceEngine::new();
        let id = active_proposal(&mut gov, rate_payload(500));
        gov.vote(
            acct(3),
            id,
            VoteChoice::For,
            Timestamp(20),
            Tokens::new(255_000),
            100,
        )
        .unwrap();
        assert_eq!(
            gov.finalize(id, Timestamp(110), 50).unwrap(),
            ProposalState::Queued
        );

        let mut gov = GovernanceEngine::new();
        let id = active_proposal(&mut gov, rate_payload(500));
        gov.vote(
            acct(3),
            id,
            VoteChoice::For,
            Timestamp(20),
            Tokens::new(254_999),
            100,
        )
        .unwrap();
        assert_eq!(
            gov.finalize(id, Timestamp(110), 50).unwrap(),
            ProposalState::Defeated
        );
    }

    #[test]
    fn revote_overwrites_instead_of_accumulating() {
        let mut gov = GovernanceEngine::new();
        let id = active_proposal(&mut gov, issue_payload(10));
        gov.vote(
            acct(3),
            id,
            VoteChoice::For,
            Timestamp(20),
            Tokens::new(100),
            100,
        )
        .unwrap();
        gov.vote(
            acct(3),
            id,
            VoteChoice::Against,
            Timestamp(30),
            Tokens::new(40),
            100,
        )
        .unwrap();
        let p = gov.get(id).unwrap();
        assert_eq!(p.votes_for, 0);
        assert_eq!(p.votes_against, 40);
        assert_eq!(p.votes.len(), 1);
    }

    #[test]
    fn votes_rejected_outside_window_and_with_zero_power() {
        let mut gov = GovernanceEngine::new();
        let id = active_proposal(&mut gov, issue_payload(10));

        assert!(matches!(
            gov.vote(acct(3), id, VoteChoice::For, Timestamp(20), Tokens::ZERO, 100),
            Err(IndentureError::NoPower)
        ));
        assert!(matches!(
            gov.vote(
                acct(3),
                id,
                VoteChoice::For,
                Timestamp(110),
                Tokens::new(1),
                100
            ),
            Err(IndentureError::VotingClosed(_))
        ));
    }

    #[test]
    fn execution_gates_on_delay_and_window() {
        let mut gov = GovernanceEngine::new();
        let id = active_proposal(&mut gov, issue_payload(10));
        gov.vote(
            acct(3),
            id,
            VoteChoice::For,
            Timestamp(20),
            Tokens::new(300_000),
            100,
        )
        .unwrap();
        gov.finalize(id, Timestamp(110), 50).unwrap();
        // eta = voting_ends (110) + 50 = 160; window 100 -> deadline 260.

        assert!(matches!(
            gov.validate_execute(id, Timestamp(159), 100),
            Err(IndentureError::ExecutionDelayPending { eta: 160, .. })
        ));
        assert!(gov.validate_execute(id, Timestamp(160), 100).is_ok());
        assert!(matches!(
            gov.validate_execute(id, Timestamp(261), 100),
            Err(IndentureError::ProposalExpired { deadline: 260, .. })
        ));

        // Expiry is an explicit successful transition, not an error side
        // effect of execute.
        assert!(gov.mark_expired(id, Timestamp(260), 100).is_err());
        assert_eq!(
            gov.mark_expired(id, Timestamp(261), 100).unwrap(),
            ProposalState::Expired
        );
    }

    #[test]
    fn cancel_only_from_draft_or_active_by_proposer() {
        let mut gov = GovernanceEngine::new();
        let id = gov
            .propose(acct(1), issue_payload(10), "p".into(), Timestamp(0))
            .unwrap();
        assert!(gov.cancel(acct(2), id).is_err());
        gov.cancel(acct(1), id).unwrap();
        assert_eq!(gov.get(id).unwrap().state, ProposalState::Cancelled);
        assert!(gov.cancel(acct(1), id).is_err());
    }
}
