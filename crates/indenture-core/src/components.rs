//! Host-side implementations of the engine's IO seams: clocks, a fixed
//! price oracle, and in-memory / file-backed snapshot stores.
//!
//! The core never performs IO; everything here lives at the boundary and is
//! swappable. `ManualClock` and `StaticPriceOracle` double as test drivers.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::oracle::PriceQuote;
use crate::snapshot::SnapshotV1;
use crate::types::Timestamp;
use crate::{Clock, IndentureError, PriceOracle, Result, SnapshotStore};

/// Wall-clock time from the host OS.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs().min(i64::MAX as u64) as i64)
            .unwrap_or(0);
        Timestamp(secs)
    }
}

/// A settable clock for tests and replay tooling.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(now.get()),
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.now.store(now.get(), Ordering::Relaxed);
    }

    pub fn advance_secs(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.now.load(Ordering::Relaxed))
    }
}

/// An oracle that serves one settable quote. Useful for tests and for
/// deployments where a host process pushes quotes in from elsewhere.
#[derive(Debug)]
pub struct StaticPriceOracle {
    quote: Mutex<PriceQuote>,
}

impl StaticPriceOracle {
    pub fn new(quote: PriceQuote) -> Self {
        Self {
            quote: Mutex::new(quote),
        }
    }

    pub fn set(&self, quote: PriceQuote) {
        *self.quote.lock().expect("oracle lock poisoned") = quote;
    }
}

impl PriceOracle for StaticPriceOracle {
    fn get_price(&self) -> Result<PriceQuote> {
        Ok(*self.quote.lock().expect("oracle lock poisoned"))
    }
}

/// Keeps the latest snapshot in memory. For tests and embedded hosts that
/// persist elsewhere.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    slot: Mutex<Option<SnapshotV1>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, snapshot: &SnapshotV1) -> Result<()> {
        *self.slot.lock().expect("store lock poisoned") = Some(snapshot.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<SnapshotV1>> {
        Ok(self.slot.lock().expect("store lock poisoned").clone())
    }
}

/// Stores the snapshot as JSON at a fixed path, written atomically: the
/// bytes land in a temporary sibling first and replace the target with a
/// rename, so a crash mid-write never leaves a torn snapshot behind.
#[derive(Debug)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&self, snapshot: &SnapshotV1) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| IndentureError::SnapshotError(format!("create dir: {e}")))?;
        }
        let bytes = snapshot.to_json()?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, &bytes)
            .map_err(|e| IndentureError::SnapshotError(format!("write: {e}")))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| IndentureError::SnapshotError(format!("rename: {e}")))?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "snapshot saved");
        Ok(())
    }

    fn load(&self) -> Result<Option<SnapshotV1>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(IndentureError::SnapshotError(format!("read: {e}"))),
        };
        Ok(Some(SnapshotV1::from_json(&bytes)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenesisConfig;
    use crate::engine::IndentureLedger;
    use crate::types::{Bps, Price};

    fn snapshot() -> SnapshotV1 {
        let config = GenesisConfig::builder()
            .manager_hex(hex::encode([9u8; 32]))
            .build()
            .unwrap();
        SnapshotV1::capture(&IndentureLedger::new(&config).unwrap())
    }

    #[test]
    fn manual_clock_sets_and_advances() {
        let clock = ManualClock::new(Timestamp(100));
        assert_eq!(clock.now(), Timestamp(100));
        clock.advance_secs(50);
        assert_eq!(clock.now(), Timestamp(150));
        clock.set(Timestamp(0));
        assert_eq!(clock.now(), Timestamp(0));
    }

    #[test]
    fn static_oracle_serves_the_latest_quote() {
        let q1 = PriceQuote {
            price: Price::PAR,
            timestamp: Timestamp(1_000),
            confidence: Bps::new(9_000).unwrap(),
        };
        let oracle = StaticPriceOracle::new(q1);
        assert_eq!(oracle.get_price().unwrap(), q1);

        let q2 = PriceQuote {
            price: Price::new(2_000_000).unwrap(),
            ..q1
        };
        oracle.set(q2);
        assert_eq!(oracle.get_price().unwrap(), q2);
    }

    #[test]
    fn memory_store_round_trips() {
        let store = MemorySnapshotStore::new();
        assert!(store.load().unwrap().is_none());
        let snap = snapshot();
        store.save(&snap).unwrap();
        assert_eq!(store.load().unwrap(), Some(snap));
    }

    #[test]
    fn file_store_round_trips_and_reports_missing_as_none() {
        let dir = std::env::temp_dir().join(format!("indenture-store-{}", std::process::id()));
        let store = FileSnapshotStore::new(dir.join("ledger.json"));
        assert!(store.load().unwrap().is_none());

        let snap = snapshot();
        store.save(&snap).unwrap();
        let loaded = store.load().unwrap().expect("snapshot present");
        assert_eq!(loaded, snap);
        assert!(loaded.restore().is_ok());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
