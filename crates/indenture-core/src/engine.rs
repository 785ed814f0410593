//! The `IndentureLedger` engine: composes the balance book, collateral
//! vault, bond registry, governance, and distribution scheduler into one
//! deterministic state machine.
//!
//! Every public operation follows the same shape:
//! 1. Validate everything across all components, touching no state.
//! 2. Commit after all fallible computations, in one uninterrupted block.
//!
//! A returned `Err` therefore implies the engine is byte-identical to what
//! it was before the call; `state_hash` makes that checkable.

use std::collections::BTreeMap;

use tracing::{debug, instrument};

use crate::actions::{Action, ActionOutcome, BondIssueOutcome, EarlyWithdrawalOutcome};
use crate::bonds::{BondRegistry, BondState};
use crate::bounds::RuntimeBounds;
use crate::config::GenesisConfig;
use crate::distribution::{
    aggregate_by_owner, allocate_pro_rata, round_pool, DistributionRound, DistributionScheduler,
    RoundGate, RoundOutcome,
};
use crate::governance::{
    GovernanceEngine, ProposalPayload, ProposalState, RateTarget, ReallocationDirection,
    VoteChoice,
};
use crate::hash;
use crate::invariants::{InvariantId, InvariantViolation};
use crate::ledger::Ledger;
use crate::math::{add_u64, early_withdrawal_penalty, sub_u64};
use crate::metrics::LedgerMetrics;
use crate::oracle::{PriceQuote, QuoteValidation};
use crate::types::{
    AccountId, BondId, Bps, Params, ProposalId, Stable, Timestamp, Tokens, BPS_U64,
};
use crate::vault::{CollateralStatus, CollateralVault};
use crate::{Hash32, IndentureError, Result, StateHash};

/// The complete in-memory ledger state plus its policy parameters.
pub struct IndentureLedger {
    params: Params,
    bounds: RuntimeBounds,
    manager: AccountId,
    quote_validation: QuoteValidation,
    genesis_at: Timestamp,

    ledger: Ledger,
    vault: CollateralVault,
    bonds: BondRegistry,
    governance: GovernanceEngine,
    scheduler: DistributionScheduler,

    metrics: LedgerMetrics,
}

impl IndentureLedger {
    /// Builds the genesis state: the full supply minted to the manager's
    /// free balance, an empty vault owned by the manager, and the first
    /// distribution period starting at `genesis_at`.
    pub fn new(config: &GenesisConfig) -> Result<Self> {
        config.validate()?;
        let params = config.typed_params()?;
        let bounds = config.runtime_bounds()?;
        let manager = config.manager()?;
        let quote_validation =
            QuoteValidation::new(config.oracle.max_age_secs, config.oracle.min_confidence_bps)?;
        let genesis_at = config.genesis_at();

        let mut ledger = Ledger::new();
        ledger.mint(manager, Tokens::new(config.token.total_supply))?;
        let vault = CollateralVault::new(
            manager,
            params.collateral_ratio(),
            params.unlocked_fraction(),
        );

        let metrics = LedgerMetrics::new();
        metrics.accounts.set(1);

        debug!(
            manager = %manager.to_hex(),
            total_supply = config.token.total_supply,
            genesis_at = genesis_at.get(),
            "ledger initialized"
        );

        Ok(IndentureLedger {
            params,
            bounds,
            manager,
            quote_validation,
            genesis_at,
            ledger,
            vault,
            bonds: BondRegistry::new(),
            governance: GovernanceEngine::new(),
            scheduler: DistributionScheduler::new(genesis_at),
            metrics,
        })
    }

    /// Reassembles an engine from restored components (snapshot load path).
    /// Gauges are recomputed; counters restart at zero.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        params: Params,
        bounds: RuntimeBounds,
        manager: AccountId,
        quote_validation: QuoteValidation,
        genesis_at: Timestamp,
        ledger: Ledger,
        vault: CollateralVault,
        bonds: BondRegistry,
        governance: GovernanceEngine,
        scheduler: DistributionScheduler,
    ) -> Self {
        let metrics = LedgerMetrics::new();
        metrics.accounts.set(ledger.account_count() as u64);
        metrics
            .active_bonds
            .set(bonds.active_entries().len() as u64);
        IndentureLedger {
            params,
            bounds,
            manager,
            quote_validation,
            genesis_at,
            ledger,
            vault,
            bonds,
            governance,
            scheduler,
            metrics,
        }
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn runtime_bounds(&self) -> RuntimeBounds {
        self.bounds
    }

    pub fn manager(&self) -> AccountId {
        self.manager
    }

    pub fn quote_validation(&self) -> QuoteValidation {
        self.quote_validation
    }

    pub fn genesis_at(&self) -> Timestamp {
        self.genesis_at
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn vault(&self) -> &CollateralVault {
        &self.vault
    }

    pub fn bonds(&self) -> &BondRegistry {
        &self.bonds
    }

    pub fn governance(&self) -> &GovernanceEngine {
        &self.governance
    }

    pub fn scheduler(&self) -> &DistributionScheduler {
        &self.scheduler
    }

    pub fn metrics(&self) -> &LedgerMetrics {
        &self.metrics
    }

    fn ensure_manager(&self, caller: AccountId) -> Result<()> {
        if caller != self.manager {
            return Err(IndentureError::InvalidInput(
                "caller is not the program manager".into(),
            ));
        }
        Ok(())
    }

    // -------------------------------------------------------------------
    // Token operations
    // -------------------------------------------------------------------

    /// Moves free tokens between accounts.
    #[instrument(skip(self), fields(from = %from.to_hex(), to = %to.to_hex()))]
    pub fn transfer(&mut self, from: AccountId, to: AccountId, amount: Tokens) -> Result<()> {
        if !self.ledger.has_account(to) && self.ledger.account_count() >= self.bounds.max_accounts
        {
            return Err(IndentureError::BoundedValueExceeded(
                "max accounts exceeded".into(),
            ));
        }
        self.ledger.transfer(from, to, amount)?;
        self.metrics.transfers_total.inc();
        self.metrics.accounts.set(self.ledger.account_count() as u64);
        Ok(())
    }

    // -------------------------------------------------------------------
    // Vault operations
    // -------------------------------------------------------------------

    /// Tops up the backing pool with external stablecoin and re-marks the
    /// par-value backing status, so a replenishing deposit clears a margin
    /// call on its own.
    #[instrument(skip(self), fields(from = %from.to_hex()))]
    pub fn deposit_collateral(&mut self, from: AccountId, amount: Stable) -> Result<CollateralStatus> {
        let _ = from; // stablecoin enters from outside the boundary
        self.vault.deposit(amount)?;
        Ok(self.refresh_par_status())
    }

    /// Tops up the yield pool with external stablecoin.
    #[instrument(skip(self), fields(from = %from.to_hex()))]
    pub fn deposit_yield(&mut self, from: AccountId, amount: Stable) -> Result<()> {
        let _ = from;
        self.vault.deposit_yield(amount)
    }

    /// Validates a price quote and recomputes the collateral backing status.
    #[instrument(skip(self))]
    pub fn refresh_status(&mut self, quote: &PriceQuote, now: Timestamp) -> Result<CollateralStatus> {
        let price = self.quote_validation.validate(quote, now)?;
        let prev = self.vault.status();
        let next = self.vault.refresh_status(
            self.ledger.total_locked(),
            price,
            self.params.collateral_ratio(),
            self.params.unlocked_fraction(),
        )?;
        if prev == CollateralStatus::Sufficient && next != CollateralStatus::Sufficient {
            self.metrics.margin_calls_total.inc();
        }
        Ok(next)
    }

    /// Par-value status recompute for the quote-free paths (issuance,
    /// collateral deposits). Infallible, so it can run inside commit blocks.
    fn refresh_par_status(&mut self) -> CollateralStatus {
        let prev = self.vault.status();
        let next = self.vault.refresh_at_par(
            self.ledger.total_locked(),
            self.params.collateral_ratio(),
            self.params.unlocked_fraction(),
        );
        if prev == CollateralStatus::Sufficient && next != CollateralStatus::Sufficient {
            self.metrics.margin_calls_total.inc();
        }
        next
    }

    /// Releases raised principal to the manager, up to the governed fraction
    /// of cumulative raised principal. Manager only.
    #[instrument(skip(self))]
    pub fn unlock_funds(&mut self, caller: AccountId, fraction: Bps) -> Result<Tokens> {
        self.ensure_manager(caller)?;
        self.vault.unlock_funds(
            self.bonds.total_raised(),
            fraction,
            self.params.unlocked_fraction(),
            self.params.collateral_ratio(),
        )
    }

    /// Withdraws surplus collateral above the backing floor. Manager only.
    #[instrument(skip(self))]
    pub fn withdraw_collateral(&mut self, caller: AccountId, amount: Stable) -> Result<()> {
        self.ensure_manager(caller)?;
        self.vault.withdraw_collateral(
            self.ledger.total_locked(),
            amount,
            self.params.collateral_ratio(),
        )
    }

    // -------------------------------------------------------------------
    // Bond operations
    // -------------------------------------------------------------------

    /// Locks `amount` of the owner's free tokens into a new bond. The
    /// redemption amount is fixed here from the current interest rate.
    #[instrument(skip(self), fields(owner = %owner.to_hex()))]
    pub fn issue_bond(
        &mut self,
        owner: AccountId,
        amount: Tokens,
        maturity_at: Timestamp,
        now: Timestamp,
        nonce: Hash32,
    ) -> Result<BondIssueOutcome> {
        if self.bonds.count() >= self.bounds.max_bonds {
            return Err(IndentureError::BoundedValueExceeded(
                "max bonds exceeded".into(),
            ));
        }
        if self.bonds.count_for(owner) >= self.bounds.max_bonds_per_account {
            return Err(IndentureError::BoundedValueExceeded(
                "max bonds per account exceeded".into(),
            ));
        }
        let bond = self.bonds.validate_issue(
            owner,
            amount,
            maturity_at,
            now,
            nonce,
            self.params.interest_rate(),
            self.params.min_investment(),
        )?;
        add_u64(self.bonds.total_raised().get(), amount.get())?;
        let free = self.ledger.free_balance(owner);
        if free < amount {
            return Err(IndentureError::InsufficientFunds {
                requested: amount.get(),
                available: free.get(),
            });
        }

        // Commit after all fallible computations.
        self.ledger.lock(owner, amount)?;
        self.bonds.insert(bond)?;
        // The new debt dilutes the backing; re-mark status at par so an
        // under-backed issuance blocks creator releases immediately.
        self.refresh_par_status();
        self.metrics.bonds_issued_total.inc();
        self.metrics.active_bonds.inc();
        debug!(bond = %hex::encode(bond.id.0 .0), principal = amount.get(), "bond issued");
        Ok(BondIssueOutcome {
            bond: bond.id,
            redemption_amount: bond.redemption_amount,
        })
    }

    /// Redeems a matured bond: unlocks the principal and pays the fixed
    /// redemption amount out of the backing pool as stablecoin credit.
    #[instrument(skip(self), fields(caller = %caller.to_hex()))]
    pub fn redeem(&mut self, caller: AccountId, bond: BondId, now: Timestamp) -> Result<()> {
        let b = *self.bonds.validate_redeem(caller, bond, now)?;
        let locked = self.ledger.locked_balance(b.owner);
        if locked < b.principal {
            return Err(IndentureError::InsufficientLocked {
                requested: b.principal.get(),
                available: locked.get(),
            });
        }
        let reserve = self.vault.collateral();
        if reserve < b.redemption_amount {
            return Err(IndentureError::InsufficientReserve {
                requested: b.redemption_amount.get(),
                available: reserve.get(),
            });
        }
        add_u64(
            self.ledger.stable_balance(b.owner).get(),
            b.redemption_amount.get(),
        )?;

        // Commit after all fallible computations.
        self.ledger.unlock(b.owner, b.principal)?;
        self.vault.pay_redemption(b.redemption_amount)?;
        self.ledger.credit_stable(b.owner, b.redemption_amount)?;
        self.bonds.set_state(bond, BondState::Redeemed)?;
        self.metrics.bonds_redeemed_total.inc();
        self.metrics.active_bonds.dec();
        debug!(bond = %hex::encode(bond.0 .0), paid = b.redemption_amount.get(), "bond redeemed");
        Ok(())
    }

    /// Exits a bond before maturity: the principal unlocks minus a flat
    /// penalty, which moves to the manager's free balance. No coupon is paid.
    #[instrument(skip(self), fields(caller = %caller.to_hex()))]
    pub fn withdraw_early(
        &mut self,
        caller: AccountId,
        bond: BondId,
        now: Timestamp,
    ) -> Result<EarlyWithdrawalOutcome> {
        let b = *self.bonds.validate_withdraw_early(caller, bond, now)?;
        let penalty = early_withdrawal_penalty(b.principal.get(), self.params.early_withdrawal_penalty())?;
        let returned = sub_u64(b.principal.get(), penalty)?;
        let locked = self.ledger.locked_balance(b.owner);
        if locked < b.principal {
            return Err(IndentureError::InsufficientLocked {
                requested: b.principal.get(),
                available: locked.get(),
            });
        }

        // Commit after all fallible computations.
        self.ledger.unlock(b.owner, b.principal)?;
        if penalty > 0 && b.owner != self.manager {
            self.ledger
                .transfer(b.owner, self.manager, Tokens::new(penalty))?;
        }
        self.bonds.set_state(bond, BondState::WithdrawnEarly)?;
        self.metrics.early_withdrawals_total.inc();
        self.metrics.active_bonds.dec();
        debug!(
            bond = %hex::encode(bond.0 .0),
            returned,
            penalty,
            "bond withdrawn early"
        );
        Ok(EarlyWithdrawalOutcome {
            returned: Tokens::new(returned),
            penalty: Tokens::new(penalty),
        })
    }

    // -------------------------------------------------------------------
    // Governance operations
    // -------------------------------------------------------------------

    /// Registers a draft proposal. Anyone may propose; the locked-balance
    /// threshold is checked when voting opens.
    #[instrument(skip(self, payload), fields(proposer = %proposer.to_hex()))]
    pub fn propose(
        &mut self,
        proposer: AccountId,
        payload: ProposalPayload,
        title: String,
        now: Timestamp,
    ) -> Result<ProposalId> {
        if self.governance.count() >= self.bounds.max_proposals {
            return Err(IndentureError::BoundedValueExceeded(
                "max proposals exceeded".into(),
            ));
        }
        self.governance.propose(proposer, payload, title, now)
    }

    /// Opens the voting window, freezing quorum and total power at the
    /// current locked supply.
    #[instrument(skip(self), fields(caller = %caller.to_hex()))]
    pub fn open_voting(
        &mut self,
        caller: AccountId,
        proposal: ProposalId,
        now: Timestamp,
    ) -> Result<()> {
        self.governance.open_voting(
            caller,
            proposal,
            now,
            self.ledger.locked_balance(caller),
            self.params.proposal_threshold(),
            self.ledger.total_locked(),
            self.params.quorum(),
            self.params.voting_period_secs(),
        )?;
        self.metrics.proposals_opened_total.inc();
        Ok(())
    }

    /// Casts or replaces a vote weighted by the voter's live locked balance.
    #[instrument(skip(self), fields(voter = %voter.to_hex()))]
    pub fn vote(
        &mut self,
        voter: AccountId,
        proposal: ProposalId,
        choice: VoteChoice,
        now: Timestamp,
    ) -> Result<()> {
        self.governance.vote(
            voter,
            proposal,
            choice,
            now,
            self.ledger.locked_balance(voter),
            self.bounds.max_votes_per_proposal,
        )
    }

    /// Tallies an ended voting window into `Queued` or `Defeated`.
    #[instrument(skip(self))]
    pub fn finalize(&mut self, proposal: ProposalId, now: Timestamp) -> Result<ProposalState> {
        self.governance
            .finalize(proposal, now, self.params.execution_delay_secs())
    }

    /// Applies a queued proposal's payload and marks it executed.
    #[instrument(skip(self))]
    pub fn execute(&mut self, proposal: ProposalId, now: Timestamp) -> Result<()> {
        let payload = self.governance.validate_execute(
            proposal,
            now,
            self.params.execution_window_secs(),
        )?;
        match payload {
            ProposalPayload::RateChange { target, new_rate } => match target {
                RateTarget::DistributionRate => self.params.set_distribution_rate(new_rate)?,
                RateTarget::BondInterestRate => self.params.set_interest_rate(new_rate)?,
            },
            ProposalPayload::NewIssue { amount } => self.apply_new_issue(amount)?,
            ProposalPayload::ReserveReallocation { direction, amount } => match direction {
                ReallocationDirection::CollateralToYield => {
                    self.vault.reallocate_collateral_to_yield(amount)?
                }
                ReallocationDirection::YieldToCollateral => {
                    self.vault.reallocate_yield_to_collateral(amount)?
                }
            },
            ProposalPayload::RatioAdjustment { new_ratio } => {
                self.params.set_collateral_ratio(new_ratio)?;
                self.vault.apply_required_ratio(
                    self.params.collateral_ratio(),
                    self.params.unlocked_fraction(),
                );
            }
        }
        self.governance.mark_executed(proposal)?;
        self.metrics.proposals_executed_total.inc();
        debug!(proposal = proposal.0, ?payload, "proposal executed");
        Ok(())
    }

    /// Mints new supply pro rata over current holdings (free + locked),
    /// credited to free balances; the largest-remainder rule keeps the mint
    /// exact.
    fn apply_new_issue(&mut self, amount: Tokens) -> Result<()> {
        let mut entries: Vec<(AccountId, BondId, u64)> = Vec::new();
        for (id, b) in self.ledger.iter() {
            let weight = add_u64(b.free, b.locked)?;
            if weight > 0 {
                // The allocator keys ties by (owner, id); the owner's own
                // hash stands in for the bond id here.
                entries.push((*id, BondId(id.0), weight));
            }
        }
        let shares = allocate_pro_rata(amount.get(), &entries)?;
        add_u64(self.ledger.total_supply().get(), amount.get())?;

        // Commit after all fallible computations.
        for (owner, _, share) in shares {
            if share > 0 {
                self.ledger.mint(owner, Tokens::new(share))?;
            }
        }
        Ok(())
    }

    /// `Queued -> Expired` once the execution window has been missed.
    #[instrument(skip(self))]
    pub fn mark_expired(&mut self, proposal: ProposalId, now: Timestamp) -> Result<ProposalState> {
        self.governance
            .mark_expired(proposal, now, self.params.execution_window_secs())
    }

    /// Cancels a draft or active proposal. Proposer only.
    #[instrument(skip(self), fields(caller = %caller.to_hex()))]
    pub fn cancel(&mut self, caller: AccountId, proposal: ProposalId) -> Result<()> {
        self.governance.cancel(caller, proposal)
    }

    // -------------------------------------------------------------------
    // Distribution
    // -------------------------------------------------------------------

    /// Pays the current period's yield to active bond holders pro rata.
    ///
    /// Idempotent: within one period the first call pays and later calls
    /// return the same round as `AlreadyPaid`. A due period with no active
    /// bonds (or a zero pool) records an empty round so the schedule still
    /// advances.
    #[instrument(skip(self))]
    pub fn run_round(&mut self, now: Timestamp) -> Result<RoundOutcome> {
        let period_secs = self.params.distribution_period_secs();
        match self.scheduler.gate(now, period_secs) {
            RoundGate::AlreadyPaid(round) => return Ok(RoundOutcome::AlreadyPaid(round)),
            RoundGate::NotDue { due_at } => return Ok(RoundOutcome::NotDue { now, due_at }),
            RoundGate::Due => {}
        }

        let pool = round_pool(
            self.vault.collateral(),
            self.vault.yield_reserve(),
            self.params.distribution_rate(),
            period_secs,
        )?;
        let entries = self.bonds.active_entries();
        let (pool, payouts) = if pool.is_zero() || entries.is_empty() {
            (Stable::ZERO, BTreeMap::new())
        } else {
            let shares = allocate_pro_rata(pool.get(), &entries)?;
            (pool, aggregate_by_owner(&shares))
        };
        for (owner, credit) in &payouts {
            add_u64(self.ledger.stable_balance(*owner).get(), *credit)?;
        }
        add_u64(self.scheduler.period_index(), 1)?;
        let round = DistributionRound {
            period_index: self.scheduler.period_index(),
            pool,
            closed_at: now,
            payouts,
        };

        // Commit after all fallible computations.
        if !pool.is_zero() {
            self.vault.pay_yield(pool)?;
            for (owner, credit) in &round.payouts {
                self.ledger.credit_stable(*owner, Stable::new(*credit))?;
            }
        }
        self.scheduler.record(round.clone())?;
        self.metrics.rounds_paid_total.inc();
        debug!(
            period = round.period_index,
            pool = round.pool.get(),
            recipients = round.payouts.len(),
            "distribution round paid"
        );
        Ok(RoundOutcome::Paid(round))
    }

    // -------------------------------------------------------------------
    // Uniform dispatch
    // -------------------------------------------------------------------

    /// Applies one action, mapping each variant onto its named operation.
    pub fn apply(&mut self, action: Action) -> Result<ActionOutcome> {
        match action {
            Action::Transfer { from, to, amount } => {
                self.transfer(from, to, amount)?;
                Ok(ActionOutcome::Unit)
            }
            Action::DepositCollateral { from, amount } => Ok(ActionOutcome::RefreshStatus(
                self.deposit_collateral(from, amount)?,
            )),
            Action::DepositYield { from, amount } => {
                self.deposit_yield(from, amount)?;
                Ok(ActionOutcome::Unit)
            }
            Action::RefreshStatus { quote, now } => {
                Ok(ActionOutcome::RefreshStatus(self.refresh_status(&quote, now)?))
            }
            Action::UnlockFunds { caller, fraction } => Ok(ActionOutcome::UnlockFunds {
                released: self.unlock_funds(caller, fraction)?,
            }),
            Action::WithdrawCollateral { caller, amount } => {
                self.withdraw_collateral(caller, amount)?;
                Ok(ActionOutcome::Unit)
            }
            Action::IssueBond {
                owner,
                amount,
                maturity_at,
                now,
                nonce,
            } => Ok(ActionOutcome::IssueBond(
                self.issue_bond(owner, amount, maturity_at, now, nonce)?,
            )),
            Action::Redeem { caller, bond, now } => {
                self.redeem(caller, bond, now)?;
                Ok(ActionOutcome::Unit)
            }
            Action::WithdrawEarly { caller, bond, now } => Ok(ActionOutcome::WithdrawEarly(
                self.withdraw_early(caller, bond, now)?,
            )),
            Action::Propose {
                proposer,
                payload,
                title,
                now,
            } => Ok(ActionOutcome::Propose(
                self.propose(proposer, payload, title, now)?,
            )),
            Action::OpenVoting {
                caller,
                proposal,
                now,
            } => {
                self.open_voting(caller, proposal, now)?;
                Ok(ActionOutcome::Unit)
            }
            Action::Vote {
                voter,
                proposal,
                choice,
                now,
            } => {
                self.vote(voter, proposal, choice, now)?;
                Ok(ActionOutcome::Unit)
            }
            Action::Finalize { proposal, now } => Ok(ActionOutcome::ProposalState(
                self.finalize(proposal, now)?,
            )),
            Action::Execute { proposal, now } => {
                self.execute(proposal, now)?;
                Ok(ActionOutcome::Unit)
            }
            Action::MarkExpired { proposal, now } => Ok(ActionOutcome::ProposalState(
                self.mark_expired(proposal, now)?,
            )),
            Action::Cancel { caller, proposal } => {
                self.cancel(caller, proposal)?;
                Ok(ActionOutcome::Unit)
            }
            Action::RunRound { now } => Ok(ActionOutcome::RunRound(self.run_round(now)?)),
        }
    }

    // -------------------------------------------------------------------
    // State commitment
    // -------------------------------------------------------------------

    /// Domain-separated hash over a canonical binary preimage of the whole
    /// state. Equal states hash equal on any host; any semantic mutation
    /// changes the hash.
    pub fn state_hash(&self) -> StateHash {
        let mut buf = Vec::with_capacity(4096);

        // Policy.
        put_u16(&mut buf, self.params.collateral_ratio().get());
        put_u16(&mut buf, self.params.interest_rate().get());
        put_u16(&mut buf, self.params.distribution_rate().get());
        put_u64(&mut buf, self.params.distribution_period_secs());
        put_u16(&mut buf, self.params.early_withdrawal_penalty().get());
        put_u64(&mut buf, self.params.min_investment().get());
        put_u16(&mut buf, self.params.quorum().get());
        put_u64(&mut buf, self.params.voting_period_secs());
        put_u64(&mut buf, self.params.execution_delay_secs());
        put_u64(&mut buf, self.params.execution_window_secs());
        put_u64(&mut buf, self.params.proposal_threshold().get());
        put_u64(&mut buf, self.bounds.max_accounts as u64);
        put_u64(&mut buf, self.bounds.max_bonds as u64);
        put_u64(&mut buf, self.bounds.max_bonds_per_account as u64);
        put_u64(&mut buf, self.bounds.max_proposals as u64);
        put_u64(&mut buf, self.bounds.max_votes_per_proposal as u64);
        put_i64(&mut buf, self.quote_validation.max_age_secs);
        put_u16(&mut buf, self.quote_validation.min_confidence_bps);
        put_hash(&mut buf, &self.manager.0);
        put_i64(&mut buf, self.genesis_at.get());

        // Balances.
        put_u64(&mut buf, self.ledger.total_supply().get());
        put_u64(&mut buf, self.ledger.account_count() as u64);
        for (id, b) in self.ledger.iter() {
            put_hash(&mut buf, &id.0);
            put_u64(&mut buf, b.free);
            put_u64(&mut buf, b.locked);
            put_u64(&mut buf, b.stable);
        }

        // Vault.
        put_hash(&mut buf, &self.vault.depositor().0);
        put_u64(&mut buf, self.vault.collateral().get());
        put_u64(&mut buf, self.vault.yield_reserve().get());
        put_u64(&mut buf, self.vault.released().get());
        put_u64(&mut buf, self.vault.deposited_total().get());
        put_u64(&mut buf, self.vault.last_ratio_bps());
        put_u8(&mut buf, status_tag(self.vault.status()));

        // Bonds.
        put_u64(&mut buf, self.bonds.total_raised().get());
        put_u64(&mut buf, self.bonds.count() as u64);
        for b in self.bonds.iter() {
            put_hash(&mut buf, &b.id.0);
            put_hash(&mut buf, &b.owner.0);
            put_u64(&mut buf, b.principal.get());
            put_i64(&mut buf, b.issued_at.get());
            put_i64(&mut buf, b.maturity_at.get());
            put_u64(&mut buf, b.redemption_amount.get());
            put_u8(&mut buf, bond_state_tag(b.state));
        }

        // Governance.
        put_u64(&mut buf, self.governance.count() as u64);
        for p in self.governance.iter() {
            put_u64(&mut buf, p.id.0);
            put_hash(&mut buf, &p.proposer.0);
            put_u64(&mut buf, p.title.len() as u64);
            buf.extend_from_slice(p.title.as_bytes());
            put_payload(&mut buf, &p.payload);
            put_u8(&mut buf, proposal_state_tag(p.state));
            put_i64(&mut buf, p.created_at.get());
            put_i64(&mut buf, p.voting_starts_at.get());
            put_i64(&mut buf, p.voting_ends_at.get());
            put_i64(&mut buf, p.eta.get());
            put_u64(&mut buf, p.quorum_required);
            put_u64(&mut buf, p.total_power);
            put_u64(&mut buf, p.votes_for);
            put_u64(&mut buf, p.votes_against);
            put_u64(&mut buf, p.votes.len() as u64);
            for (voter, v) in &p.votes {
                put_hash(&mut buf, &voter.0);
                put_u8(&mut buf, matches!(v.choice, VoteChoice::Against) as u8);
                put_u64(&mut buf, v.weight);
            }
        }

        // Schedule.
        put_i64(&mut buf, self.scheduler.last_round_end().get());
        put_u64(&mut buf, self.scheduler.period_index());
        match self.scheduler.last_round() {
            None => put_u8(&mut buf, 0),
            Some(r) => {
                put_u8(&mut buf, 1);
                put_u64(&mut buf, r.period_index);
                put_u64(&mut buf, r.pool.get());
                put_i64(&mut buf, r.closed_at.get());
                put_u64(&mut buf, r.payouts.len() as u64);
                for (owner, credit) in &r.payouts {
                    put_hash(&mut buf, &owner.0);
                    put_u64(&mut buf, *credit);
                }
            }
        }

        hash::hash_state_preimage_v1(&buf)
    }

    // -------------------------------------------------------------------
    // Invariants
    // -------------------------------------------------------------------

    /// Checks every global invariant of the current state; returns the first
    /// violation found.
    pub fn check_invariants(&self) -> std::result::Result<(), InvariantViolation> {
        // Token conservation: free + locked across accounts equals supply.
        let total = self.ledger.total_tokens();
        let supply = self.ledger.total_supply().get() as u128;
        if total != supply {
            return Err(InvariantViolation::new(
                InvariantId::TokenConserve,
                format!("sum(free+locked)={total} != total_supply={supply}"),
            ));
        }

        // Locked columns equal active bond principal, per account.
        let by_owner = self.bonds.active_principal_by_owner();
        for (id, b) in self.ledger.iter() {
            let expected = by_owner.get(id).copied().unwrap_or(0);
            if b.locked as u128 != expected {
                return Err(InvariantViolation::new(
                    InvariantId::LockedMatchesBonds,
                    format!(
                        "account {} locked={} but active principal={expected}",
                        id.to_hex(),
                        b.locked
                    ),
                ));
            }
        }
        for (id, expected) in &by_owner {
            if !self.ledger.has_account(*id) && *expected > 0 {
                return Err(InvariantViolation::new(
                    InvariantId::LockedMatchesBonds,
                    format!(
                        "bond owner {} has active principal {expected} but no account",
                        id.to_hex()
                    ),
                ));
            }
        }

        // Stable conservation: both pools plus account credits equal the
        // cumulative net inflow.
        let pools = self.vault.collateral().get() as u128 + self.vault.yield_reserve().get() as u128;
        let held = pools + self.ledger.total_stable();
        let inflow = self.vault.deposited_total().get() as u128;
        if held != inflow {
            return Err(InvariantViolation::new(
                InvariantId::StableConserve,
                format!("pools+credits={held} != deposited_total={inflow}"),
            ));
        }

        // Round conservation: the last paid round's credits sum to its pool.
        if let Some(r) = self.scheduler.last_round() {
            let paid: u128 = r.payouts.values().map(|v| *v as u128).sum();
            if paid != r.pool.get() as u128 {
                return Err(InvariantViolation::new(
                    InvariantId::RoundConserve,
                    format!(
                        "round {} credits sum {paid} != pool {}",
                        r.period_index,
                        r.pool.get()
                    ),
                ));
            }
        }

        // Release cap: cumulative release never exceeds the governed
        // fraction of cumulative raised principal.
        let released = self.vault.released().get() as u128;
        let cap = (self.bonds.total_raised().get() as u128
            * self.params.unlocked_fraction().as_u64() as u128)
            / (BPS_U64 as u128);
        if released > cap {
            return Err(InvariantViolation::new(
                InvariantId::ReleaseBounded,
                format!("released={released} exceeds cap={cap}"),
            ));
        }

        // Safety bounds.
        if self.ledger.account_count() > self.bounds.max_accounts {
            return Err(InvariantViolation::new(
                InvariantId::BoundsRespected,
                format!("accounts {} > max", self.ledger.account_count()),
            ));
        }
        if self.bonds.count() > self.bounds.max_bonds {
            return Err(InvariantViolation::new(
                InvariantId::BoundsRespected,
                format!("bonds {} > max", self.bonds.count()),
            ));
        }
        let mut per_owner: BTreeMap<AccountId, usize> = BTreeMap::new();
        for b in self.bonds.iter() {
            *per_owner.entry(b.owner).or_default() += 1;
        }
        for (id, n) in per_owner {
            if n > self.bounds.max_bonds_per_account {
                return Err(InvariantViolation::new(
                    InvariantId::BoundsRespected,
                    format!("account {} holds {n} bonds > max", id.to_hex()),
                ));
            }
        }
        if self.governance.count() > self.bounds.max_proposals {
            return Err(InvariantViolation::new(
                InvariantId::BoundsRespected,
                format!("proposals {} > max", self.governance.count()),
            ));
        }
        for p in self.governance.iter() {
            if p.votes.len() > self.bounds.max_votes_per_proposal {
                return Err(InvariantViolation::new(
                    InvariantId::BoundsRespected,
                    format!("proposal {} has {} votes > max", p.id.0, p.votes.len()),
                ));
            }
        }

        Ok(())
    }
}

fn put_u8(buf: &mut Vec<u8>, v: u8) {
    buf.push(v);
}

fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_i64(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_hash(buf: &mut Vec<u8>, h: &Hash32) {
    buf.extend_from_slice(&h.0);
}

fn status_tag(s: CollateralStatus) -> u8 {
    match s {
        CollateralStatus::Sufficient => 0,
        CollateralStatus::MarginCall => 1,
        CollateralStatus::Liquidating => 2,
    }
}

fn bond_state_tag(s: BondState) -> u8 {
    match s {
        BondState::Active => 0,
        BondState::Redeemed => 1,
        BondState::WithdrawnEarly => 2,
    }
}

fn proposal_state_tag(s: ProposalState) -> u8 {
    match s {
        ProposalState::Draft => 0,
        ProposalState::Active => 1,
        ProposalState::Defeated => 2,
        ProposalState::Queued => 3,
        ProposalState::Executed => 4,
        ProposalState::Expired => 5,
        ProposalState::Cancelled => 6,
    }
}

fn put_payload(buf: &mut Vec<u8>, p: &ProposalPayload) {
    match p {
        ProposalPayload::RateChange { target, new_rate } => {
            put_u8(buf, 0);
            put_u8(buf, matches!(target, RateTarget::BondInterestRate) as u8);
            put_u16(buf, new_rate.get());
        }
        ProposalPayload::NewIssue { amount } => {
            put_u8(buf, 1);
            put_u64(buf, amount.get());
        }
        ProposalPayload::ReserveReallocation { direction, amount } => {
            put_u8(buf, 2);
            put_u8(
                buf,
                matches!(direction, ReallocationDirection::YieldToCollateral) as u8,
            );
            put_u64(buf, amount.get());
        }
        ProposalPayload::RatioAdjustment { new_ratio } => {
            put_u8(buf, 3);
            put_u16(buf, new_ratio.get());
        }
    }
}
