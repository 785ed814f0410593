//! Operational counters for the ledger engine.
//!
//! Lock-free atomics so the engine can bump them from `&self`/`&mut self`
//! paths without plumbing; hosts scrape them for dashboards. No histogram
//! support: the engine is synchronous and bounded, so there are no latencies
//! worth bucketing in-core.

use std::sync::atomic::{AtomicU64, Ordering};

/// A simple counter that can only increase.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A gauge that can go up or down.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn set(&self, v: u64) {
        self.value.store(v, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Central metrics collection for the ledger engine.
#[derive(Debug, Default)]
pub struct LedgerMetrics {
    // Counters
    pub transfers_total: Counter,
    pub bonds_issued_total: Counter,
    pub bonds_redeemed_total: Counter,
    pub early_withdrawals_total: Counter,
    pub rounds_paid_total: Counter,
    pub proposals_opened_total: Counter,
    pub proposals_executed_total: Counter,
    pub margin_calls_total: Counter,

    // Gauges
    pub accounts: Gauge,
    pub active_bonds: Gauge,
}

impl LedgerMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_and_gauges_move_both_ways() {
        let m = LedgerMetrics::new();
        m.bonds_issued_total.inc();
        m.bonds_issued_total.inc_by(2);
        assert_eq!(m.bonds_issued_total.get(), 3);

        m.active_bonds.set(5);
        m.active_bonds.inc();
        m.active_bonds.dec();
        assert_eq!(m.active_bonds.get(), 5);
    }
}
