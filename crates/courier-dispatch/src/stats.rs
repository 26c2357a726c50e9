//! Delivery counters shared by the worker and producer handles.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Monotonic counters, updated with relaxed atomics.
#[derive(Debug, Default)]
pub struct DispatchStats {
    flushes: AtomicU64,
    skipped_flushes: AtomicU64,
    upload_attempts: AtomicU64,
    delivered: AtomicU64,
    discarded: AtomicU64,
    dropped_commands: AtomicU64,
    coalesced_requests: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Flush commands that ran the drain loop.
    pub flushes: u64,
    /// Flush commands stopped by a gate.
    pub skipped_flushes: u64,
    /// HTTP delivery attempts.
    pub upload_attempts: u64,
    /// Records the server accepted.
    pub delivered: u64,
    /// Records deleted without acceptance.
    pub discarded: u64,
    /// Commands lost to a full or closed channel.
    pub dropped_commands: u64,
    /// Delayed flush requests folded into one already pending.
    pub coalesced_requests: u64,
}

impl DispatchStats {
    pub(crate) fn record_flush(&self) {
        let _ = self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skip(&self) {
        let _ = self.skipped_flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_attempt(&self) {
        let _ = self.upload_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self, records: u64) {
        let _ = self.delivered.fetch_add(records, Ordering::Relaxed);
    }

    pub(crate) fn record_discarded(&self, records: u64) {
        let _ = self.discarded.fetch_add(records, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        let _ = self.dropped_commands.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_coalesced(&self) {
        let _ = self.coalesced_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            flushes: self.flushes.load(Ordering::Relaxed),
            skipped_flushes: self.skipped_flushes.load(Ordering::Relaxed),
            upload_attempts: self.upload_attempts.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            dropped_commands: self.dropped_commands.load(Ordering::Relaxed),
            coalesced_requests: self.coalesced_requests.load(Ordering::Relaxed),
        }
    }
}
