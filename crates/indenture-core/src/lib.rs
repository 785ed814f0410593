//! Deterministic core ledger for a collateral-backed bond program.
//!
//! A fixed-supply token is partially locked by investors into bonds; the
//! project creator posts stablecoin collateral that backs redemptions and
//! gates how much of the raised principal may be released; periodic rounds
//! pay collateral yield to bond holders pro rata; token-weighted governance
//! adjusts rates, supply, collateral ratio, and reserve allocation.
//!
//! Design goals:
//! - Invalid states unrepresentable (domain newtypes + validating constructors)
//! - Deterministic and bounded arithmetic (u128 intermediates, floor division)
//! - Fail-closed on malformed inputs; errors never commit partial state
//! - IO-free core (pure state machine); hosts provide time, prices, storage

use thiserror::Error;

pub mod actions;
pub mod bonds;
pub mod bounds;
pub mod components;
pub mod config;
pub mod distribution;
pub mod engine;
pub mod governance;
pub mod hash;
pub mod invariant_rail;
pub mod invariants;
pub mod ledger;
pub mod math;
pub mod metrics;
pub mod oracle;
pub mod snapshot;
pub mod types;
pub mod vault;

pub use actions::{Action, ActionOutcome};
pub use bonds::{Bond, BondState};
pub use bounds::RuntimeBounds;
pub use config::GenesisConfig;
pub use distribution::{DistributionRound, RoundOutcome};
pub use engine::IndentureLedger;
pub use governance::{
    ProposalPayload, ProposalState, RateTarget, ReallocationDirection, VoteChoice,
};
pub use invariant_rail::{first_invariant_counterexample, minimize_counterexample};
pub use invariants::{InvariantCounterexample, InvariantId, InvariantViolation};
pub use oracle::{PriceQuote, QuoteValidation};
pub use snapshot::SnapshotV1;
pub use types::{
    AccountId, BondId, Bps, Params, Price, ProposalId, Stable, Timestamp, Tokens,
};
pub use vault::CollateralStatus;

use serde::{Deserialize, Serialize};

/// 32-byte hash newtype used for identities and state commitments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Hash32(pub [u8; 32]);

pub type StateHash = Hash32;

/// Unified error type for core ledger operations.
#[derive(Debug, Error)]
pub enum IndentureError {
    // Input validation errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Bounded value exceeded: {0}")]
    BoundedValueExceeded(String),

    // Balance / reserve errors
    #[error("Insufficient free balance: requested {requested}, available {available}")]
    InsufficientFunds { requested: u64, available: u64 },

    #[error("Insufficient locked balance: requested {requested}, available {available}")]
    InsufficientLocked { requested: u64, available: u64 },

    #[error("Insufficient reserve: requested {requested}, available {available}")]
    InsufficientReserve { requested: u64, available: u64 },

    // Collateral status errors
    #[error("Margin call active: ratio {ratio_bps}bps below required {required_bps}bps")]
    MarginCallActive { ratio_bps: u64, required_bps: u64 },

    #[error("Release threshold exceeded: requested {requested_bps}bps, limit {limit_bps}bps")]
    ThresholdExceeded { requested_bps: u16, limit_bps: u16 },

    // Bond lifecycle errors
    #[error("Bond not matured: now {now}, matures at {maturity}")]
    NotMatured { now: i64, maturity: i64 },

    #[error("Bond already redeemed or withdrawn")]
    AlreadyRedeemed,

    #[error("Bond already matured: now {now}, matured at {maturity}")]
    AlreadyMatured { now: i64, maturity: i64 },

    // Governance errors
    #[error("Voting closed: {0}")]
    VotingClosed(String),

    #[error("No voting power: locked balance is zero")]
    NoPower,

    #[error("Proposal threshold not met: locked {locked}, required {required}")]
    ThresholdNotMet { locked: u64, required: u64 },

    #[error("Quorum not met: votes_for {votes_for}, required {required}")]
    QuorumNotMet { votes_for: u64, required: u64 },

    #[error("Execution delay pending: now {now}, eta {eta}")]
    ExecutionDelayPending { now: i64, eta: i64 },

    #[error("Proposal expired: execution deadline {deadline}, now {now}")]
    ProposalExpired { now: i64, deadline: i64 },

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    // Oracle input errors
    #[error("Oracle quote stale: age {age_secs}s exceeds max {max_age_secs}s")]
    OracleStale { age_secs: i64, max_age_secs: i64 },

    #[error("Oracle quote untrusted: confidence {confidence_bps}bps below min {min_confidence_bps}bps")]
    OracleUntrusted {
        confidence_bps: u16,
        min_confidence_bps: u16,
    },

    // Integrity errors (fatal: abort, never commit partial state)
    #[error("Invariant violated: {0}")]
    IntegrityError(String),

    // Persistence errors
    #[error("Snapshot error: {0}")]
    SnapshotError(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Coarse error classification, for hosts deciding retry/alert behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    State,
    InsufficientResource,
    Governance,
    Oracle,
    Integrity,
    Persistence,
    Config,
}

impl IndentureError {
    pub fn kind(&self) -> ErrorKind {
        use IndentureError::*;
        match self {
            InvalidInput(_) | BoundedValueExceeded(_) => ErrorKind::Validation,
            InsufficientFunds { .. }
            | InsufficientLocked { .. }
            | InsufficientReserve { .. }
            | MarginCallActive { .. }
            | ThresholdExceeded { .. } => ErrorKind::InsufficientResource,
            NotMatured { .. }
            | AlreadyRedeemed
            | AlreadyMatured { .. }
            | ExecutionDelayPending { .. }
            | ProposalExpired { .. }
            | InvalidTransition(_) => ErrorKind::State,
            VotingClosed(_) | NoPower | ThresholdNotMet { .. } | QuorumNotMet { .. } => {
                ErrorKind::Governance
            }
            OracleStale { .. } | OracleUntrusted { .. } => ErrorKind::Oracle,
            IntegrityError(_) => ErrorKind::Integrity,
            SnapshotError(_) => ErrorKind::Persistence,
            ConfigError(_) => ErrorKind::Config,
        }
    }

    /// Fatal errors mean stored state can no longer be trusted; hosts must
    /// abort instead of retrying.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Integrity)
    }
}

pub type Result<T> = std::result::Result<T, IndentureError>;

/// Supplies the current time to time-dependent operations.
///
/// The engine itself never reads a clock: every operation takes `now` as an
/// explicit argument, and hosts obtain it through this seam.
pub trait Clock {
    /// Postconditions:
    /// - Returned timestamps are non-decreasing across calls within one host.
    fn now(&self) -> Timestamp;
}

/// Supplies token price quotes from an external market source.
///
/// The core is strictly pull-based: it never fetches prices. Hosts fetch a
/// quote through this seam and pass it into vault operations, where it is
/// validated for freshness and confidence before any state is touched.
pub trait PriceOracle {
    /// Preconditions:
    /// - The underlying source is reachable, or an explicit error is returned.
    ///
    /// Postconditions:
    /// - The quote carries the source timestamp and confidence; stale or
    ///   low-confidence quotes are rejected by the engine, not here.
    fn get_price(&self) -> Result<PriceQuote>;
}

/// Durable storage boundary for full-state snapshots.
///
/// The engine is agnostic to the storage format; implementations persist the
/// versioned snapshot model and must round-trip it bit-exactly.
pub trait SnapshotStore {
    fn save(&self, snapshot: &SnapshotV1) -> Result<()>;

    /// Postconditions:
    /// - Returns `Ok(None)` when no snapshot has ever been saved.
    fn load(&self) -> Result<Option<SnapshotV1>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_classify_by_family() {
        let e = IndentureError::InsufficientFunds {
            requested: 10,
            available: 5,
        };
        assert_eq!(e.kind(), ErrorKind::InsufficientResource);

        let e = IndentureError::NotMatured {
            now: 100,
            maturity: 200,
        };
        assert_eq!(e.kind(), ErrorKind::State);

        let e = IndentureError::NoPower;
        assert_eq!(e.kind(), ErrorKind::Governance);

        let e = IndentureError::OracleStale {
            age_secs: 900,
            max_age_secs: 300,
        };
        assert_eq!(e.kind(), ErrorKind::Oracle);
    }

    #[test]
    fn only_integrity_errors_are_fatal() {
        assert!(IndentureError::IntegrityError("x".into()).is_fatal());
        assert!(!IndentureError::InvalidInput("x".into()).is_fatal());
        assert!(!IndentureError::AlreadyRedeemed.is_fatal());
    }
}
