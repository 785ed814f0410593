//! End-to-end scenarios exercising the public engine API: bond lifecycle,
//! collateral management, distribution rounds, governance, persistence, and
//! the replay rail.

use indenture_core::components::{FileSnapshotStore, ManualClock, MemorySnapshotStore};
use indenture_core::math::SECS_PER_YEAR;
use indenture_core::{
    first_invariant_counterexample, Action, AccountId, BondId, Bps, Clock, CollateralStatus,
    GenesisConfig, Hash32, IndentureError, IndentureLedger, Price, PriceQuote, ProposalPayload,
    ProposalState, RateTarget, ReallocationDirection, RoundOutcome, SnapshotStore, SnapshotV1,
    Stable, Timestamp, Tokens, VoteChoice,
};

fn acct(b: u8) -> AccountId {
    AccountId(Hash32([b; 32]))
}

fn manager() -> AccountId {
    acct(9)
}

fn config() -> GenesisConfig {
    GenesisConfig::builder()
        .total_supply(10_000_000)
        .manager_hex(hex::encode([9u8; 32]))
        .genesis_at(0)
        .collateral_ratio_bps(3_000)
        .interest_rate_bps(1_000)
        .distribution_rate_bps(500)
        .distribution_period_secs(SECS_PER_YEAR)
        .early_withdrawal_penalty_bps(500)
        .min_investment(1_000)
        .quorum_bps(5_100)
        .voting_period_secs(1_000)
        .execution_delay_secs(500)
        .execution_window_secs(1_000)
        .proposal_threshold(10_000)
        .build()
        .unwrap()
}

fn par_quote(at: i64) -> PriceQuote {
    PriceQuote {
        price: Price::PAR,
        timestamp: Timestamp(at),
        confidence: Bps::new(9_500).unwrap(),
    }
}

/// An engine with two investors holding one active bond each (300k / 700k,
/// one-year term from t=0) and a vault funded for redemptions and yield.
fn funded_program() -> (IndentureLedger, BondId, BondId) {
    let mut e = IndentureLedger::new(&config()).unwrap();
    e.transfer(manager(), acct(1), Tokens::new(300_000)).unwrap();
    e.transfer(manager(), acct(2), Tokens::new(700_000)).unwrap();

    e.deposit_collateral(manager(), Stable::new(2_000_000)).unwrap();
    e.deposit_yield(manager(), Stable::new(50_000)).unwrap();

    let maturity = Timestamp(SECS_PER_YEAR as i64);
    let b1 = e
        .issue_bond(acct(1), Tokens::new(300_000), maturity, Timestamp(0), Hash32([1; 32]))
        .unwrap()
        .bond;
    let b2 = e
        .issue_bond(acct(2), Tokens::new(700_000), maturity, Timestamp(0), Hash32([2; 32]))
        .unwrap()
        .bond;

    e.refresh_status(&par_quote(0), Timestamp(0)).unwrap();
    (e, b1, b2)
}

#[test]
fn bond_program_lifecycle_from_issue_to_redemption() {
    let (mut e, b1, b2) = funded_program();
    assert_eq!(e.bonds().get(b1).unwrap().redemption_amount.get(), 330_000);
    assert_eq!(e.bonds().get(b2).unwrap().redemption_amount.get(), 770_000);
    assert_eq!(e.vault().status(), CollateralStatus::Sufficient);

    let maturity = Timestamp(SECS_PER_YEAR as i64);
    e.redeem(acct(1), b1, maturity).unwrap();
    e.redeem(acct(2), b2, maturity).unwrap();

    assert_eq!(e.ledger().stable_balance(acct(1)).get(), 330_000);
    assert_eq!(e.ledger().stable_balance(acct(2)).get(), 770_000);
    assert_eq!(e.ledger().free_balance(acct(1)).get(), 300_000);
    assert_eq!(e.ledger().total_locked().get(), 0);
    assert_eq!(e.vault().collateral().get(), 900_000);
    assert!(e.check_invariants().is_ok());
}

#[test]
fn early_exit_forfeits_penalty_to_the_manager() {
    let (mut e, b1, _) = funded_program();
    let manager_free_before = e.ledger().free_balance(manager()).get();

    let out = e.withdraw_early(acct(1), b1, Timestamp(1_000)).unwrap();
    assert_eq!(out.returned.get(), 285_000);
    assert_eq!(out.penalty.get(), 15_000);
    assert_eq!(e.ledger().free_balance(acct(1)).get(), 285_000);
    assert_eq!(
        e.ledger().free_balance(manager()).get(),
        manager_free_before + 15_000
    );
    assert!(e.check_invariants().is_ok());
}

#[test]
fn creator_release_is_capped_by_the_collateral_ratio_complement() {
    let (mut e, _, _) = funded_program();

    // 70% of the 1_000_000 raised.
    let released = e.unlock_funds(manager(), Bps::new(7_000).unwrap()).unwrap();
    assert_eq!(released.get(), 700_000);

    let err = e
        .unlock_funds(manager(), Bps::new(7_100).unwrap())
        .unwrap_err();
    assert!(matches!(err, IndentureError::ThresholdExceeded { .. }));

    // Repeating an already-released fraction pays nothing further.
    let again = e.unlock_funds(manager(), Bps::new(7_000).unwrap()).unwrap();
    assert_eq!(again.get(), 0);
    assert!(e.check_invariants().is_ok());
}

#[test]
fn price_shock_triggers_margin_call_and_blocks_withdrawals() {
    let (mut e, _, _) = funded_program();

    // 2M collateral backs 1M locked at par (200%). A 7x price move drops the
    // ratio to ~28.5%, below the 30% requirement.
    let shock = PriceQuote {
        price: Price::new(7_000_000).unwrap(),
        timestamp: Timestamp(10),
        confidence: Bps::new(9_500).unwrap(),
    };
    let status = e.refresh_status(&shock, Timestamp(10)).unwrap();
    assert_eq!(status, CollateralStatus::MarginCall);

    assert!(matches!(
        e.withdraw_collateral(manager(), Stable::new(1)),
        Err(IndentureError::MarginCallActive { .. })
    ));
    assert!(matches!(
        e.unlock_funds(manager(), Bps::new(100).unwrap()),
        Err(IndentureError::MarginCallActive { .. })
    ));

    // Replenishing and refreshing clears the call.
    e.deposit_collateral(manager(), Stable::new(1_500_000)).unwrap();
    let status = e
        .refresh_status(
            &PriceQuote {
                timestamp: Timestamp(20),
                ..shock
            },
            Timestamp(20),
        )
        .unwrap();
    assert_eq!(status, CollateralStatus::Sufficient);
}

#[test]
fn distribution_round_pays_yield_pro_rata_once_per_period() {
    let (mut e, _, _) = funded_program();
    let now = Timestamp(SECS_PER_YEAR as i64);

    let round = match e.run_round(now).unwrap() {
        RoundOutcome::Paid(r) => r,
        other => panic!("expected Paid, got {other:?}"),
    };
    // 5% of 2_000_000 collateral over one year, capped by the 50_000 reserve.
    assert_eq!(round.pool.get(), 50_000);
    assert_eq!(e.ledger().stable_balance(acct(1)).get(), 15_000);
    assert_eq!(e.ledger().stable_balance(acct(2)).get(), 35_000);

    // Idempotent within the period.
    assert!(matches!(
        e.run_round(now).unwrap(),
        RoundOutcome::AlreadyPaid(_)
    ));
    assert_eq!(e.ledger().stable_balance(acct(1)).get(), 15_000);

    // The next period becomes due a full period after the last close.
    assert!(matches!(
        e.run_round(Timestamp(now.get() + 10)).unwrap(),
        RoundOutcome::AlreadyPaid(_)
    ));
    let next = Timestamp(now.get() + SECS_PER_YEAR as i64);
    assert!(matches!(e.run_round(next).unwrap(), RoundOutcome::Paid(_)));
    assert!(e.check_invariants().is_ok());
}

#[test]
fn governance_changes_rates_through_the_full_lifecycle() {
    let (mut e, _, _) = funded_program();

    let id = e
        .propose(
            acct(2),
            ProposalPayload::RateChange {
                target: RateTarget::BondInterestRate,
                new_rate: Bps::new(800).unwrap(),
            },
            "coupon to 8%".into(),
            Timestamp(100),
        )
        .unwrap();
    e.open_voting(acct(2), id, Timestamp(100)).unwrap();

    // Supermajority kind: 700k of 1M total power clears 51%.
    e.vote(acct(2), id, VoteChoice::For, Timestamp(200)).unwrap();
    e.vote(acct(1), id, VoteChoice::Against, Timestamp(300)).unwrap();
    assert_eq!(
        e.finalize(id, Timestamp(1_100)).unwrap(),
        ProposalState::Queued
    );

    e.execute(id, Timestamp(1_600)).unwrap();
    assert_eq!(e.params().interest_rate().get(), 800);

    // Bonds issued after the change pick up the new coupon; existing bonds
    // keep their fixed redemption amounts.
    e.transfer(manager(), acct(3), Tokens::new(100_000)).unwrap();
    let out = e
        .issue_bond(
            acct(3),
            Tokens::new(100_000),
            Timestamp(1_700 + SECS_PER_YEAR as i64),
            Timestamp(1_700),
            Hash32([3; 32]),
        )
        .unwrap();
    assert_eq!(out.redemption_amount.get(), 108_000);
    assert!(e.check_invariants().is_ok());
}

#[test]
fn quorum_failure_defeats_simple_majority_proposals() {
    let (mut e, _, _) = funded_program();
    let id = e
        .propose(
            acct(1),
            ProposalPayload::NewIssue {
                amount: Tokens::new(1_000),
            },
            "mint".into(),
            Timestamp(100),
        )
        .unwrap();
    e.open_voting(acct(1), id, Timestamp(100)).unwrap();

    // Quorum is 51% of 1M = 510_000; 300_000 in favor falls short.
    e.vote(acct(1), id, VoteChoice::For, Timestamp(200)).unwrap();
    assert_eq!(
        e.finalize(id, Timestamp(1_100)).unwrap(),
        ProposalState::Defeated
    );
    assert!(matches!(
        e.execute(id, Timestamp(1_600)),
        Err(IndentureError::InvalidTransition(_))
    ));
}

#[test]
fn reserve_reallocation_rebalances_vault_pools() {
    let (mut e, _, _) = funded_program();
    let id = e
        .propose(
            acct(2),
            ProposalPayload::ReserveReallocation {
                direction: ReallocationDirection::CollateralToYield,
                amount: Stable::new(200_000),
            },
            "fund yield".into(),
            Timestamp(100),
        )
        .unwrap();
    e.open_voting(acct(2), id, Timestamp(100)).unwrap();
    e.vote(acct(2), id, VoteChoice::For, Timestamp(200)).unwrap();
    e.finalize(id, Timestamp(1_100)).unwrap();
    e.execute(id, Timestamp(1_600)).unwrap();

    assert_eq!(e.vault().collateral().get(), 1_800_000);
    assert_eq!(e.vault().yield_reserve().get(), 250_000);
    assert!(e.check_invariants().is_ok());
}

#[test]
fn failed_operations_never_leave_partial_state() {
    let (mut e, b1, _) = funded_program();
    let before = e.state_hash();

    // Premature redemption.
    assert!(e.redeem(acct(1), b1, Timestamp(100)).is_err());
    // Wrong owner.
    assert!(e.redeem(acct(2), b1, Timestamp(SECS_PER_YEAR as i64)).is_err());
    // Overdraw.
    assert!(e
        .transfer(acct(1), acct(2), Tokens::new(u64::MAX))
        .is_err());
    // Non-manager release.
    assert!(e.unlock_funds(acct(1), Bps::new(100).unwrap()).is_err());
    // Stale quote.
    assert!(e
        .refresh_status(&par_quote(0), Timestamp(100_000))
        .is_err());

    assert_eq!(e.state_hash(), before);
    assert!(e.check_invariants().is_ok());
}

#[test]
fn snapshot_persists_and_restores_through_the_file_store() {
    let (mut e, _, _) = funded_program();
    e.run_round(Timestamp(SECS_PER_YEAR as i64)).unwrap();

    let dir = std::env::temp_dir().join(format!("indenture-it-{}", std::process::id()));
    let store = FileSnapshotStore::new(dir.join("ledger.json"));
    store.save(&SnapshotV1::capture(&e)).unwrap();

    let restored = store
        .load()
        .unwrap()
        .expect("snapshot present")
        .restore()
        .unwrap();
    assert_eq!(restored.state_hash(), e.state_hash());
    assert_eq!(restored.ledger().stable_balance(acct(1)).get(), 15_000);
    assert_eq!(restored.scheduler().period_index(), 1);
    assert!(restored.check_invariants().is_ok());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn memory_store_supports_save_load_cycles() {
    let (e, _, _) = funded_program();
    let store = MemorySnapshotStore::new();
    assert!(store.load().unwrap().is_none());
    store.save(&SnapshotV1::capture(&e)).unwrap();
    let back = store.load().unwrap().unwrap().restore().unwrap();
    assert_eq!(back.state_hash(), e.state_hash());
}

#[test]
fn replay_rail_clears_a_mixed_trace() {
    let maturity = Timestamp(SECS_PER_YEAR as i64);
    let trace = vec![
        Action::Transfer {
            from: manager(),
            to: acct(1),
            amount: Tokens::new(300_000),
        },
        Action::IssueBond {
            owner: acct(1),
            amount: Tokens::new(300_000),
            maturity_at: maturity,
            now: Timestamp(0),
            nonce: Hash32([1; 32]),
        },
        Action::DepositCollateral {
            from: manager(),
            amount: Stable::new(2_000_000),
        },
        // Fails: not matured.
        Action::Redeem {
            caller: acct(1),
            bond: BondId::derive(acct(1), Timestamp(0), Hash32([1; 32])),
            now: Timestamp(5),
        },
        Action::RunRound { now: maturity },
        Action::Redeem {
            caller: acct(1),
            bond: BondId::derive(acct(1), Timestamp(0), Hash32([1; 32])),
            now: maturity,
        },
    ];
    let found = first_invariant_counterexample(&config(), &trace).unwrap();
    assert!(found.is_none());
}

#[test]
fn manual_clock_drives_time_dependent_operations() {
    let (mut e, b1, _) = funded_program();
    let clock = ManualClock::new(Timestamp(1_000));

    assert!(matches!(
        e.redeem(acct(1), b1, clock.now()),
        Err(IndentureError::NotMatured { .. })
    ));
    clock.set(Timestamp(SECS_PER_YEAR as i64));
    e.redeem(acct(1), b1, clock.now()).unwrap();
}
