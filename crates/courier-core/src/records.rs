//! Queued event records and the batches read from them.
//!
//! Records are ordered solely by [`RecordId`]. `created_at` is kept for
//! diagnostics and the time index but never used for ordering.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Local row identifier. Monotonically increasing and never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(i64);

impl RecordId {
    /// Wrap a raw row id.
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// The raw row id.
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One queued event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// Row id assigned on append.
    pub id: RecordId,
    /// Serialized event JSON, stored verbatim.
    pub payload: String,
    /// Append time in milliseconds since the Unix epoch.
    pub created_at: i64,
}

/// A contiguous, oldest-first run of records read in one store call.
///
/// Never empty: the store returns `None` instead of an empty batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Batch {
    records: Vec<EventRecord>,
}

impl Batch {
    /// Build a batch from records already in id order.
    ///
    /// Returns `None` for an empty run.
    pub fn from_records(records: Vec<EventRecord>) -> Option<Self> {
        if records.is_empty() {
            return None;
        }
        debug_assert!(
            records.windows(2).all(|w| w[0].id < w[1].id),
            "batch records must be in strictly increasing id order"
        );
        Some(Self { records })
    }

    /// Id of the last record; the boundary for `delete_through`.
    pub fn watermark(&self) -> RecordId {
        // from_records rejects empty runs
        self.records[self.records.len() - 1].id
    }

    /// Id of the first record.
    pub fn first_id(&self) -> RecordId {
        self.records[0].id
    }

    /// Records in id order.
    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always false; kept for clippy's `len_without_is_empty`.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
