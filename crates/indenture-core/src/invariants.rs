use crate::{Hash32, IndentureError};

/// Stable identifiers for the ledger's global invariants (used for testing
/// and counterexamples).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvariantId {
    /// Engine mutated state even though the action returned `Err`.
    NoMutationOnError,

    /// `sum(free + locked)` over all accounts diverged from `total_supply`.
    TokenConserve,

    /// An account's locked column disagreed with the sum of its active bond
    /// principals.
    LockedMatchesBonds,

    /// `collateral + yield_reserve + sum(stable columns)` diverged from the
    /// cumulative net stablecoin inflow.
    StableConserve,

    /// A paid round's shares did not sum exactly to its pool.
    RoundConserve,

    /// Released principal-equivalent exceeded the governed release cap.
    ReleaseBounded,

    /// Safety bounds were exceeded (unreachable state).
    BoundsRespected,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvariantViolation {
    pub id: InvariantId,
    pub details: String,
}

impl InvariantViolation {
    pub fn new(id: InvariantId, details: impl Into<String>) -> Self {
        Self {
            id,
            details: details.into(),
        }
    }
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.id, self.details)
    }
}

impl std::error::Error for InvariantViolation {}

impl From<InvariantViolation> for IndentureError {
    fn from(v: InvariantViolation) -> Self {
        IndentureError::IntegrityError(format!("ledger invariant violated: {v}"))
    }
}

/// A reproducible invariant failure with a minimal action trace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvariantCounterexample {
    pub violation: InvariantViolation,
    /// Index of the first action that leads to a violated invariant.
    pub at_step: usize,
    /// State hash at the time of detection (for quick comparison / logging).
    pub state_hash: Hash32,
    /// The action prefix that reproduces the violation (includes the failing step).
    pub actions: Vec<crate::actions::Action>,
}

impl InvariantCounterexample {
    pub fn short(&self) -> String {
        format!(
            "Invariant {:?} violated at step {} (state_hash={})",
            self.violation.id,
            self.at_step,
            hex::encode(self.state_hash.0)
        )
    }
}
