//! Dispatcher commands and upload dispositions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A logical command for the dispatcher worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushRequest {
    /// Drain the queue through the uploader.
    Flush,
    /// Clear the queue unconditionally.
    DeleteAll,
}

/// Classification of one upload attempt.
///
/// Decides whether the batch is deleted from the store and whether the
/// drain loop continues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryDisposition {
    /// Server accepted the batch.
    Success,
    /// Transient failure. Keep the batch and stop draining for this cycle.
    RetryKeep,
    /// Batch could not be encoded and never will be. Drop it.
    DiscardInvalid,
    /// Server permanently rejected the batch. Drop it.
    DiscardByServer,
}

impl DeliveryDisposition {
    /// Classify an HTTP status code from the collection endpoint.
    ///
    /// - 2xx: success
    /// - 403, 404, 5xx: keep for retry
    /// - anything else: permanent rejection
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => Self::Success,
            403 | 404 | 500..=599 => Self::RetryKeep,
            _ => Self::DiscardByServer,
        }
    }

    /// Whether the batch may be deleted through its watermark.
    pub fn deletes_batch(self) -> bool {
        !matches!(self, Self::RetryKeep)
    }

    /// Short classification string for logging.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::RetryKeep => "retry_keep",
            Self::DiscardInvalid => "discard_invalid",
            Self::DiscardByServer => "discard_by_server",
        }
    }
}

impl fmt::Display for DeliveryDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
