//! Replay-based invariant checking over action traces.
//!
//! The rail drives a fresh engine through an arbitrary action sequence and
//! checks, at every step, the two properties no single operation can verify
//! for itself:
//! - a failed action must leave the state hash unchanged, and
//! - a successful action must leave every global invariant intact.
//!
//! On a hit it reports the violated invariant with the reproducing action
//! prefix; `minimize_counterexample` then shrinks that prefix to a smaller
//! trace that still reproduces the same violation.

use tracing::debug;

use crate::actions::Action;
use crate::config::GenesisConfig;
use crate::engine::IndentureLedger;
use crate::invariants::{InvariantCounterexample, InvariantId, InvariantViolation};
use crate::Result;

/// One replay step's findings, if any.
fn scan_step(
    engine: &mut IndentureLedger,
    action: &Action,
) -> Option<InvariantViolation> {
    let before = engine.state_hash();
    match engine.apply(action.clone()) {
        Ok(_) => engine.check_invariants().err(),
        Err(_) => {
            if engine.state_hash() != before {
                Some(InvariantViolation::new(
                    InvariantId::NoMutationOnError,
                    format!("failed action mutated state: {action:?}"),
                ))
            } else {
                None
            }
        }
    }
}

/// Replays `actions` from genesis and scans each step. Returns the violation
/// with the length of the reproducing prefix (0 when genesis itself is bad).
fn scan_trace(
    genesis: &GenesisConfig,
    actions: &[Action],
) -> Result<Option<(InvariantViolation, usize, crate::StateHash)>> {
    let mut engine = IndentureLedger::new(genesis)?;
    if let Err(v) = engine.check_invariants() {
        return Ok(Some((v, 0, engine.state_hash())));
    }
    for (i, action) in actions.iter().enumerate() {
        if let Some(v) = scan_step(&mut engine, action) {
            return Ok(Some((v, i + 1, engine.state_hash())));
        }
    }
    Ok(None)
}

/// Replays `actions` on a fresh engine built from `genesis` and returns the
/// first invariant violation found, with the action prefix that reproduces
/// it. `Ok(None)` means the whole trace is clean.
pub fn first_invariant_counterexample(
    genesis: &GenesisConfig,
    actions: &[Action],
) -> Result<Option<InvariantCounterexample>> {
    match scan_trace(genesis, actions)? {
        None => Ok(None),
        Some((violation, prefix_len, state_hash)) => {
            let cex = InvariantCounterexample {
                violation,
                at_step: prefix_len.saturating_sub(1),
                state_hash,
                actions: actions[..prefix_len].to_vec(),
            };
            debug!(summary = %cex.short(), "invariant counterexample found");
            Ok(Some(cex))
        }
    }
}

/// Shrinks a counterexample trace by greedy single-action deletion: drop one
/// action at a time and keep the shorter trace whenever it still reproduces
/// the same violated invariant. Returns the input unchanged if the recorded
/// trace no longer reproduces.
pub fn minimize_counterexample(
    genesis: &GenesisConfig,
    cex: &InvariantCounterexample,
) -> Result<InvariantCounterexample> {
    let mut best = match first_invariant_counterexample(genesis, &cex.actions)? {
        Some(found) if found.violation.id == cex.violation.id => found,
        _ => return Ok(cex.clone()),
    };

    let mut progress = true;
    while progress {
        progress = false;
        for i in 0..best.actions.len() {
            let mut candidate = best.actions.clone();
            candidate.remove(i);
            if let Some(found) = first_invariant_counterexample(genesis, &candidate)? {
                if found.violation.id == best.violation.id
                    && found.actions.len() < best.actions.len()
                {
                    best = found;
                    progress = true;
                    break;
                }
            }
        }
    }
    debug!(
        steps = best.actions.len(),
        id = ?best.violation.id,
        "counterexample minimized"
    );
    Ok(best)
}
