use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Router counters.
#[derive(Debug, Default)]
pub struct RouterStats {
    /// Requests handed to `send_request`
    pub submitted: AtomicU64,
    /// Requests handed straight to a live manager
    pub dispatched: AtomicU64,
    /// Directory lookups issued
    pub lookups_issued: AtomicU64,
    /// Requests rejected because their id was already pending
    pub duplicates_rejected: AtomicU64,
    /// Deliveries dropped by the background policy
    pub deliveries_dropped: AtomicU64,
    /// Failures delivered (or dropped) for any reason
    pub failures: AtomicU64,
}

impl RouterStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, amount: usize) {
        counter.fetch_add(amount as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            lookups_issued: self.lookups_issued.load(Ordering::Relaxed),
            duplicates_rejected: self.duplicates_rejected.load(Ordering::Relaxed),
            deliveries_dropped: self.deliveries_dropped.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`RouterStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub submitted: u64,
    pub dispatched: u64,
    pub lookups_issued: u64,
    pub duplicates_rejected: u64,
    pub deliveries_dropped: u64,
    pub failures: u64,
}
