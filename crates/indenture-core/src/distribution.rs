//! Distribution rounds: period gating, pool sizing, and the exact pro-rata
//! allocation that pays collateral yield to bond holders.
//!
//! Allocation is integer-only with an explicit largest-remainder rule, so the
//! shares of a paid round always sum to the pool exactly. Ties on the
//! fractional remainder break by ascending owner identity, then bond id, so
//! the assignment is deterministic across hosts.

use std::collections::BTreeMap;

use crate::math::{add_u64, prorated_annual};
use crate::types::{AccountId, BondId, Bps, Stable, Timestamp};
use crate::{IndentureError, Result};

/// One period's payout event. Only the latest round is retained.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DistributionRound {
    pub period_index: u64,
    pub pool: Stable,
    pub closed_at: Timestamp,
    /// Stable credits per owner (bond shares aggregated by account).
    pub payouts: BTreeMap<AccountId, u64>,
}

/// Result of `run_round`. All three are `Ok` outcomes: a round that is not
/// due yet is expected steady state, not a failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoundOutcome {
    /// A new round was computed and paid.
    Paid(DistributionRound),
    /// The current period was already paid; the cached round is returned
    /// unchanged and nothing is re-paid.
    AlreadyPaid(DistributionRound),
    /// The period has not elapsed and no round has been paid in it.
    NotDue { now: Timestamp, due_at: Timestamp },
}

/// Exact pro-rata split of `pool` over active-bond principals.
///
/// Returns per-bond shares in input order. `sum(shares) == pool` always:
/// floor shares first, then the leftover units go one-by-one to the largest
/// fractional remainders.
pub fn allocate_pro_rata(
    pool: u64,
    entries: &[(AccountId, BondId, u64)],
) -> Result<Vec<(AccountId, BondId, u64)>> {
    let total: u128 = entries.iter().map(|(_, _, p)| *p as u128).sum();
    if total == 0 {
        return Err(IndentureError::InvalidInput(
            "total principal must be > 0".into(),
        ));
    }

    let mut shares: Vec<(AccountId, BondId, u64)> = Vec::with_capacity(entries.len());
    // (remainder, owner, bond, index) for the leftover assignment.
    let mut remainders: Vec<(u128, AccountId, BondId, usize)> = Vec::with_capacity(entries.len());
    let mut assigned: u64 = 0;
    for (i, (owner, bond, principal)) in entries.iter().enumerate() {
        let num = (pool as u128)
            .checked_mul(*principal as u128)
            .ok_or_else(|| IndentureError::BoundedValueExceeded("share overflow".into()))?;
        let share = u64::try_from(num / total)
            .map_err(|_| IndentureError::BoundedValueExceeded("share does not fit u64".into()))?;
        assigned = add_u64(assigned, share)?;
        shares.push((*owner, *bond, share));
        remainders.push((num % total, *owner, *bond, i));
    }

    let mut leftover = pool
        .checked_sub(assigned)
        .ok_or_else(|| IndentureError::IntegrityError("floor shares exceed pool".into()))?;

    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));
    for (_, _, _, i) in remainders {
        if leftover == 0 {
            break;
        }
        shares[i].2 = add_u64(shares[i].2, 1)?;
        leftover -= 1;
    }
    Ok(shares)
}

/// Aggregates per-bond shares into per-owner credits.
pub fn aggregate_by_owner(shares: &[(AccountId, BondId, u64)]) -> BTreeMap<AccountId, u64> {
    let mut out: BTreeMap<AccountId, u64> = BTreeMap::new();
    for (owner, _, share) in shares {
        *out.entry(*owner).or_default() += share;
    }
    out.retain(|_, v| *v > 0);
    out
}

/// Pool for one period: the annual distribution rate applied to the current
/// collateral pool, prorated to the period length, bounded by what the yield
/// reserve actually holds.
pub fn round_pool(
    collateral: Stable,
    yield_reserve: Stable,
    rate: Bps,
    period_secs: u64,
) -> Result<Stable> {
    let cap = prorated_annual(collateral.get(), rate, period_secs)?;
    Ok(Stable::new(cap.min(yield_reserve.get())))
}

/// Period bookkeeping for the engine's `run_round`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DistributionScheduler {
    last_round_end: Timestamp,
    period_index: u64,
    last_round: Option<DistributionRound>,
}

/// Internal gate decision; the engine computes payouts only on `Due`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoundGate {
    Due,
    AlreadyPaid(DistributionRound),
    NotDue { due_at: Timestamp },
}

impl DistributionScheduler {
    pub fn new(genesis_at: Timestamp) -> DistributionScheduler {
        DistributionScheduler {
            last_round_end: genesis_at,
            period_index: 0,
            last_round: None,
        }
    }

    pub fn period_index(&self) -> u64 {
        self.period_index
    }

    pub fn last_round_end(&self) -> Timestamp {
        self.last_round_end
    }

    pub fn last_round(&self) -> Option<&DistributionRound> {
        self.last_round.as_ref()
    }

    /// Gate for `run_round` at `now`. A round is due once a full period has
    /// elapsed since the last round end (or genesis). Inside a period the
    /// cached round answers re-invocations, which is what makes the
    /// operation idempotent.
    pub fn gate(&self, now: Timestamp, period_secs: u64) -> RoundGate {
        let due_at = self.last_round_end.plus_secs(period_secs);
        if now >= due_at {
            return RoundGate::Due;
        }
        match &self.last_round {
            Some(round) => RoundGate::AlreadyPaid(round.clone()),
            None => RoundGate::NotDue { due_at },
        }
    }

    /// Records a paid round and starts the next period at its close time.
    pub fn record(&mut self, round: DistributionRound) -> Result<()> {
        self.last_round_end = round.closed_at;
        self.period_index = add_u64(self.period_index, 1)?;
        self.last_round = Some(round);
        Ok(())
    }

    /// Restores scheduler state verbatim (snapshot load path).
    pub(crate) fn restore(
        last_round_end: Timestamp,
        period_index: u64,
        last_round: Option<DistributionRound>,
    ) -> Self {
        DistributionScheduler {
            last_round_end,
            period_index,
            last_round,
        }
    }
}
