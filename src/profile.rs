//! Profile counters
//!
//! Pass-through instrumentation: counts and accumulated time of read, write
//! and delete operations. Structures record into [`ProfileCounters`] and
//! hand out [`Profile`] snapshots.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Snapshot of operation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Profile {
    pub reads: u64,
    pub writes: u64,
    pub deletes: u64,
    pub read_time: Duration,
    pub write_time: Duration,
    pub delete_time: Duration,
}

impl Profile {
    /// Combine the counters of two structures
    pub fn merge(&self, other: &Profile) -> Profile {
        Profile {
            reads: self.reads + other.reads,
            writes: self.writes + other.writes,
            deletes: self.deletes + other.deletes,
            read_time: self.read_time + other.read_time,
            write_time: self.write_time + other.write_time,
            delete_time: self.delete_time + other.delete_time,
        }
    }
}

#[derive(Debug, Default)]
pub struct ProfileCounters {
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    read_nanos: AtomicU64,
    write_nanos: AtomicU64,
    delete_nanos: AtomicU64,
}

impl ProfileCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_read(&self, started: Instant) {
        Self::record(&self.reads, &self.read_nanos, started);
    }

    pub fn record_write(&self, started: Instant) {
        Self::record(&self.writes, &self.write_nanos, started);
    }

    pub fn record_delete(&self, started: Instant) {
        Self::record(&self.deletes, &self.delete_nanos, started);
    }

    fn record(count: &AtomicU64, nanos: &AtomicU64, started: Instant) {
        count.fetch_add(1, Ordering::Relaxed);
        let elapsed = started.elapsed().as_nanos().min(u64::MAX as u128) as u64;
        nanos.fetch_add(elapsed, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Profile {
        Profile {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            read_time: Duration::from_nanos(self.read_nanos.load(Ordering::Relaxed)),
            write_time: Duration::from_nanos(self.write_nanos.load(Ordering::Relaxed)),
            delete_time: Duration::from_nanos(self.delete_nanos.load(Ordering::Relaxed)),
        }
    }
}
