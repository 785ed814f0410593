//! Versioned full-state snapshot model.
//!
//! `SnapshotV1` is a plain serde data model, decoupled from the domain types
//! so the wire format stays stable while the in-memory representation is free
//! to change. Identities serialize as hex; maps flatten to sorted vectors so
//! the JSON is canonical for a given state.
//!
//! Integrity: a snapshot records the engine's state hash at capture time.
//! `restore` rebuilds the engine, recomputes the hash over the restored
//! state, and rejects the snapshot on mismatch, so silent corruption of a
//! stored snapshot cannot reach a running ledger.

use serde::{Deserialize, Serialize};

use crate::bonds::{Bond, BondRegistry, BondState};
use crate::config::{BoundsConfig, ParamsConfig};
use crate::distribution::{DistributionRound, DistributionScheduler};
use crate::engine::IndentureLedger;
use crate::governance::{
    GovernanceEngine, Proposal, ProposalPayload, ProposalState, RateTarget,
    ReallocationDirection, VoteChoice, VoteRecord,
};
use crate::ledger::{AccountBalances, Ledger};
use crate::oracle::QuoteValidation;
use crate::types::{AccountId, BondId, Bps, ProposalId, Stable, Timestamp, Tokens};
use crate::vault::{CollateralStatus, CollateralVault};
use crate::{Hash32, IndentureError, Result};

pub const SNAPSHOT_VERSION: u32 = 1;

/// Complete serialized ledger state, version 1.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotV1 {
    pub version: u32,
    /// Hex state hash of the captured engine; verified on restore.
    pub state_hash: String,

    pub params: ParamsConfig,
    pub bounds: BoundsConfig,
    pub oracle: QuoteValidation,
    pub manager: String,
    pub genesis_at: i64,

    pub total_supply: u64,
    pub accounts: Vec<AccountRecord>,

    pub vault: VaultRecord,

    pub total_raised: u64,
    pub bonds: Vec<BondRecord>,

    pub next_proposal_id: u64,
    pub proposals: Vec<ProposalRecord>,

    pub last_round_end: i64,
    pub period_index: u64,
    pub last_round: Option<RoundRecord>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub account: String,
    pub free: u64,
    pub locked: u64,
    pub stable: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultRecord {
    pub depositor: String,
    pub collateral: u64,
    pub yield_reserve: u64,
    pub released: u64,
    pub deposited_total: u64,
    pub required_ratio_bps: u16,
    pub unlocked_fraction_bps: u16,
    pub last_ratio_bps: u64,
    pub status: StatusDto,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusDto {
    Sufficient,
    MarginCall,
    Liquidating,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondRecord {
    pub id: String,
    pub owner: String,
    pub principal: u64,
    pub issued_at: i64,
    pub maturity_at: i64,
    pub redemption_amount: u64,
    pub state: BondStateDto,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BondStateDto {
    Active,
    Redeemed,
    WithdrawnEarly,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalRecord {
    pub id: u64,
    pub proposer: String,
    pub title: String,
    pub payload: PayloadDto,
    pub state: ProposalStateDto,
    pub created_at: i64,
    pub voting_starts_at: i64,
    pub voting_ends_at: i64,
    pub eta: i64,
    pub quorum_required: u64,
    pub total_power: u64,
    pub votes_for: u64,
    pub votes_against: u64,
    pub votes: Vec<VoteDto>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PayloadDto {
    RateChange { target: RateTargetDto, new_rate_bps: u16 },
    NewIssue { amount: u64 },
    ReserveReallocation {
        direction: DirectionDto,
        amount: u64,
    },
    RatioAdjustment { new_ratio_bps: u16 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateTargetDto {
    DistributionRate,
    BondInterestRate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionDto {
    CollateralToYield,
    YieldToCollateral,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStateDto {
    Draft,
    Active,
    Defeated,
    Queued,
    Executed,
    Expired,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteDto {
    pub voter: String,
    pub choice: VoteChoiceDto,
    pub weight: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteChoiceDto {
    For,
    Against,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub period_index: u64,
    pub pool: u64,
    pub closed_at: i64,
    pub payouts: Vec<PayoutRecord>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRecord {
    pub account: String,
    pub amount: u64,
}

fn parse_hash32(s: &str) -> Result<Hash32> {
    let bytes = hex::decode(s)
        .map_err(|e| IndentureError::SnapshotError(format!("bad hex in snapshot: {e}")))?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| IndentureError::SnapshotError("hash must be 32 bytes".into()))?;
    Ok(Hash32(arr))
}

impl SnapshotV1 {
    /// Captures the engine's full state, stamping the current state hash.
    pub fn capture(engine: &IndentureLedger) -> SnapshotV1 {
        let accounts = engine
            .ledger()
            .iter()
            .map(|(id, b)| AccountRecord {
                account: id.to_hex(),
                free: b.free,
                locked: b.locked,
                stable: b.stable,
            })
            .collect();

        let v = engine.vault();
        let vault = VaultRecord {
            depositor: v.depositor().to_hex(),
            collateral: v.collateral().get(),
            yield_reserve: v.yield_reserve().get(),
            released: v.released().get(),
            deposited_total: v.deposited_total().get(),
            required_ratio_bps: v.required_ratio().get(),
            unlocked_fraction_bps: v.unlocked_fraction().get(),
            last_ratio_bps: v.last_ratio_bps(),
            status: status_to_dto(v.status()),
        };

        let bonds = engine
            .bonds()
            .iter()
            .map(|b| BondRecord {
                id: hex::encode(b.id.0 .0),
                owner: b.owner.to_hex(),
                principal: b.principal.get(),
                issued_at: b.issued_at.get(),
                maturity_at: b.maturity_at.get(),
                redemption_amount: b.redemption_amount.get(),
                state: bond_state_to_dto(b.state),
            })
            .collect();

        let proposals = engine
            .governance()
            .iter()
            .map(|p| ProposalRecord {
                id: p.id.0,
                proposer: p.proposer.to_hex(),
                title: p.title.clone(),
                payload: payload_to_dto(&p.payload),
                state: proposal_state_to_dto(p.state),
                created_at: p.created_at.get(),
                voting_starts_at: p.voting_starts_at.get(),
                voting_ends_at: p.voting_ends_at.get(),
                eta: p.eta.get(),
                quorum_required: p.quorum_required,
                total_power: p.total_power,
                votes_for: p.votes_for,
                votes_against: p.votes_against,
                votes: p
                    .votes
                    .iter()
                    .map(|(voter, v)| VoteDto {
                        voter: voter.to_hex(),
                        choice: match v.choice {
                            VoteChoice::For => VoteChoiceDto::For,
                            VoteChoice::Against => VoteChoiceDto::Against,
                        },
                        weight: v.weight,
                    })
                    .collect(),
            })
            .collect();

        let s = engine.scheduler();
        SnapshotV1 {
            version: SNAPSHOT_VERSION,
            state_hash: hex::encode(engine.state_hash().0),
            params: ParamsConfig::from_params(engine.params()),
            bounds: BoundsConfig::from_bounds(engine.runtime_bounds()),
            oracle: engine.quote_validation(),
            manager: engine.manager().to_hex(),
            genesis_at: engine.genesis_at().get(),
            total_supply: engine.ledger().total_supply().get(),
            accounts,
            vault,
            total_raised: engine.bonds().total_raised().get(),
            bonds,
            next_proposal_id: engine.governance().next_id(),
            proposals,
            last_round_end: s.last_round_end().get(),
            period_index: s.period_index(),
            last_round: s.last_round().map(round_to_record),
        }
    }

    /// Rebuilds an engine and verifies the recorded state hash against the
    /// restored state.
    pub fn restore(&self) -> Result<IndentureLedger> {
        if self.version != SNAPSHOT_VERSION {
            return Err(IndentureError::SnapshotError(format!(
                "unsupported snapshot version {}",
                self.version
            )));
        }
        let params = self.params.to_params()?;
        let bounds = self.bounds.to_bounds()?;
        let manager = AccountId::from_hex(&self.manager)?;
        let oracle = QuoteValidation::new(self.oracle.max_age_secs, self.oracle.min_confidence_bps)?;

        let mut ledger = Ledger::new();
        ledger.restore_supply(self.total_supply);
        for a in &self.accounts {
            ledger.restore_account(
                AccountId(parse_hash32(&a.account)?),
                AccountBalances {
                    free: a.free,
                    locked: a.locked,
                    stable: a.stable,
                },
            );
        }

        let vault = CollateralVault::restore(
            AccountId(parse_hash32(&self.vault.depositor)?),
            self.vault.collateral,
            self.vault.yield_reserve,
            self.vault.released,
            self.vault.deposited_total,
            Bps::new(self.vault.required_ratio_bps)?,
            Bps::new(self.vault.unlocked_fraction_bps)?,
            self.vault.last_ratio_bps,
            status_from_dto(self.vault.status),
        );

        let mut bonds = BondRegistry::new();
        bonds.restore_total_raised(self.total_raised);
        for b in &self.bonds {
            bonds.restore_bond(Bond {
                id: BondId(parse_hash32(&b.id)?),
                owner: AccountId(parse_hash32(&b.owner)?),
                principal: Tokens::new(b.principal),
                issued_at: Timestamp(b.issued_at),
                maturity_at: Timestamp(b.maturity_at),
                redemption_amount: Stable::new(b.redemption_amount),
                state: bond_state_from_dto(b.state),
            });
        }

        let mut governance = GovernanceEngine::new();
        governance.restore_next_id(self.next_proposal_id);
        for p in &self.proposals {
            let mut votes = std::collections::BTreeMap::new();
            for v in &p.votes {
                votes.insert(
                    AccountId(parse_hash32(&v.voter)?),
                    VoteRecord {
                        choice: match v.choice {
                            VoteChoiceDto::For => VoteChoice::For,
                            VoteChoiceDto::Against => VoteChoice::Against,
                        },
                        weight: v.weight,
                    },
                );
            }
            governance.restore_proposal(Proposal {
                id: ProposalId(p.id),
                proposer: AccountId(parse_hash32(&p.proposer)?),
                title: p.title.clone(),
                payload: payload_from_dto(&p.payload)?,
                state: proposal_state_from_dto(p.state),
                created_at: Timestamp(p.created_at),
                voting_starts_at: Timestamp(p.voting_starts_at),
                voting_ends_at: Timestamp(p.voting_ends_at),
                eta: Timestamp(p.eta),
                quorum_required: p.quorum_required,
                total_power: p.total_power,
                votes_for: p.votes_for,
                votes_against: p.votes_against,
                votes,
            });
        }

        let mut last_round = None;
        if let Some(r) = &self.last_round {
            let mut payouts = std::collections::BTreeMap::new();
            for p in &r.payouts {
                payouts.insert(AccountId(parse_hash32(&p.account)?), p.amount);
            }
            last_round = Some(DistributionRound {
                period_index: r.period_index,
                pool: Stable::new(r.pool),
                closed_at: Timestamp(r.closed_at),
                payouts,
            });
        }
        let scheduler = DistributionScheduler::restore(
            Timestamp(self.last_round_end),
            self.period_index,
            last_round,
        );

        let engine = IndentureLedger::from_parts(
            params,
            bounds,
            manager,
            oracle,
            Timestamp(self.genesis_at),
            ledger,
            vault,
            bonds,
            governance,
            scheduler,
        );

        let recomputed = hex::encode(engine.state_hash().0);
        if recomputed != self.state_hash {
            return Err(IndentureError::IntegrityError(format!(
                "snapshot hash mismatch: recorded {}, restored state hashes to {recomputed}",
                self.state_hash
            )));
        }
        engine.check_invariants()?;
        Ok(engine)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| IndentureError::SnapshotError(format!("serialize: {e}")))
    }

    pub fn from_json(bytes: &[u8]) -> Result<SnapshotV1> {
        serde_json::from_slice(bytes)
            .map_err(|e| IndentureError::SnapshotError(format!("deserialize: {e}")))
    }
}

fn round_to_record(r: &DistributionRound) -> RoundRecord {
    RoundRecord {
        period_index: r.period_index,
        pool: r.pool.get(),
        closed_at: r.closed_at.get(),
        payouts: r
            .payouts
            .iter()
            .map(|(owner, amount)| PayoutRecord {
                account: owner.to_hex(),
                amount: *amount,
            })
            .collect(),
    }
}

fn status_to_dto(s: CollateralStatus) -> StatusDto {
    match s {
        CollateralStatus::Sufficient => StatusDto::Sufficient,
        CollateralStatus::MarginCall => StatusDto::MarginCall,
        CollateralStatus::Liquidating => StatusDto::Liquidating,
    }
}

fn status_from_dto(s: StatusDto) -> CollateralStatus {
    match s {
        StatusDto::Sufficient => CollateralStatus::Sufficient,
        StatusDto::MarginCall => CollateralStatus::MarginCall,
        StatusDto::Liquidating => CollateralStatus::Liquidating,
    }
}

fn bond_state_to_dto(s: BondState) -> BondStateDto {
    match s {
        BondState::Active => BondStateDto::Active,
        BondState::Redeemed => BondStateDto::Redeemed,
        BondState::WithdrawnEarly => BondStateDto::WithdrawnEarly,
    }
}

fn bond_state_from_dto(s: BondStateDto) -> BondState {
    match s {
        BondStateDto::Active => BondState::Active,
        BondStateDto::Redeemed => BondState::Redeemed,
        BondStateDto::WithdrawnEarly => BondState::WithdrawnEarly,
    }
}

fn proposal_state_to_dto(s: ProposalState) -> ProposalStateDto {
    match s {
        ProposalState::Draft => ProposalStateDto::Draft,
        ProposalState::Active => ProposalStateDto::Active,
        ProposalState::Defeated => ProposalStateDto::Defeated,
        ProposalState::Queued => ProposalStateDto::Queued,
        ProposalState::Executed => ProposalStateDto::Executed,
        ProposalState::Expired => ProposalStateDto::Expired,
        ProposalState::Cancelled => ProposalStateDto::Cancelled,
    }
}

fn proposal_state_from_dto(s: ProposalStateDto) -> ProposalState {
    match s {
        ProposalStateDto::Draft => ProposalState::Draft,
        ProposalStateDto::Active => ProposalState::Active,
        ProposalStateDto::Defeated => ProposalState::Defeated,
        ProposalStateDto::Queued => ProposalState::Queued,
        ProposalStateDto::Executed => ProposalState::Executed,
        ProposalStateDto::Expired => ProposalState::Expired,
        ProposalStateDto::Cancelled => ProposalState::Cancelled,
    }
}

fn payload_to_dto(p: &ProposalPayload) -> PayloadDto {
    match p {
        ProposalPayload::RateChange { target, new_rate } => PayloadDto::RateChange {
            target: match target {
                RateTarget::DistributionRate => RateTargetDto::DistributionRate,
                RateTarget::BondInterestRate => RateTargetDto::BondInterestRate,
            },
            new_rate_bps: new_rate.get(),
        },
        ProposalPayload::NewIssue { amount } => PayloadDto::NewIssue {
            amount: amount.get(),
        },
        ProposalPayload::ReserveReallocation { direction, amount } => {
            PayloadDto::ReserveReallocation {
                direction: match direction {
                    ReallocationDirection::CollateralToYield => DirectionDto::CollateralToYield,
                    ReallocationDirection::YieldToCollateral => DirectionDto::YieldToCollateral,
                },
                amount: amount.get(),
            }
        }
        ProposalPayload::RatioAdjustment { new_ratio } => PayloadDto::RatioAdjustment {
            new_ratio_bps: new_ratio.get(),
        },
    }
}

fn payload_from_dto(p: &PayloadDto) -> Result<ProposalPayload> {
    Ok(match p {
        PayloadDto::RateChange {
            target,
            new_rate_bps,
        } => ProposalPayload::RateChange {
            target: match target {
                RateTargetDto::DistributionRate => RateTarget::DistributionRate,
                RateTargetDto::BondInterestRate => RateTarget::BondInterestRate,
            },
            new_rate: Bps::new(*new_rate_bps)?,
        },
        PayloadDto::NewIssue { amount } => ProposalPayload::NewIssue {
            amount: Tokens::new(*amount),
        },
        PayloadDto::ReserveReallocation { direction, amount } => {
            ProposalPayload::ReserveReallocation {
                direction: match direction {
                    DirectionDto::CollateralToYield => ReallocationDirection::CollateralToYield,
                    DirectionDto::YieldToCollateral => ReallocationDirection::YieldToCollateral,
                },
                amount: Stable::new(*amount),
            }
        }
        PayloadDto::RatioAdjustment { new_ratio_bps } => ProposalPayload::RatioAdjustment {
            new_ratio: Bps::new(*new_ratio_bps)?,
        },
    })
}
