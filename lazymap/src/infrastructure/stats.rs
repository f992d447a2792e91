//! Engine counters.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

/// Atomic event counters shared by every thread group of a region.
#[derive(Debug, Default)]
pub struct PagerStats {
    faults: AtomicU64,
    read_faults: AtomicU64,
    write_faults: AtomicU64,
    spurious_faults: AtomicU64,
    fills: AtomicU64,
    evictions: AtomicU64,
    pressure_evictions: AtomicU64,
    write_backs: AtomicU64,
    read_failures: AtomicU64,
    write_failures: AtomicU64,
}

impl PagerStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_fault(&self, is_write: bool) {
        self.faults.fetch_add(1, Ordering::Relaxed);
        if is_write {
            self.write_faults.fetch_add(1, Ordering::Relaxed);
        } else {
            self.read_faults.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_spurious(&self) {
        self.spurious_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fill(&self) {
        self.fills.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_pressure_eviction(&self) {
        self.pressure_evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_back(&self) {
        self.write_backs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_read_failure(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            faults: self.faults.load(Ordering::Relaxed),
            read_faults: self.read_faults.load(Ordering::Relaxed),
            write_faults: self.write_faults.load(Ordering::Relaxed),
            spurious_faults: self.spurious_faults.load(Ordering::Relaxed),
            fills: self.fills.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            pressure_evictions: self.pressure_evictions.load(Ordering::Relaxed),
            write_backs: self.write_backs.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PagerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Faults delivered by the fault source.
    pub faults: u64,
    /// Faults raised by reads.
    pub read_faults: u64,
    /// Faults raised by writes, including write-protect faults.
    pub write_faults: u64,
    /// Faults that found the page already present.
    pub spurious_faults: u64,
    /// Pages read from the store into a slot.
    pub fills: u64,
    /// Pages removed from the buffer.
    pub evictions: u64,
    /// Evictions forced by a fault finding no free slot.
    pub pressure_evictions: u64,
    /// Successful store writes.
    pub write_backs: u64,
    /// Failed store reads.
    pub read_failures: u64,
    /// Failed store writes.
    pub write_failures: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "faults={} (read={} write={} spurious={}) fills={} evictions={} (pressure={}) \
             write_backs={} read_failures={} write_failures={}",
            self.faults,
            self.read_faults,
            self.write_faults,
            self.spurious_faults,
            self.fills,
            self.evictions,
            self.pressure_evictions,
            self.write_backs,
            self.read_failures,
            self.write_failures,
        )
    }
}
