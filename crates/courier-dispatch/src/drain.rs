//! The drain loop: read, encode, deliver, reconcile.
//!
//! Only the dispatcher worker calls into this module, so at most one flush
//! or delete-all runs at a time. The store lock is taken per store call and
//! never held across a delivery.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use courier_core::{DeliveryDisposition, DeviceState};
use courier_settings::SharedSettings;
use courier_store::EventStore;
use courier_upload::{BatchTransport, DeliveryOptions, encode_batch};

use crate::errors::Result;
use crate::gates::{self, SkipReason};
use crate::stats::DispatchStats;

/// Starting value of the loop's remaining-rows counter.
///
/// Overwritten by the store's row count after every deletable batch, so it
/// only matters for the first pass.
pub const DRAIN_SEED: u64 = 100;

/// Why a flush stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum StopReason {
    /// The store reported no remaining rows.
    Drained,
    /// The server asked us to keep the batch; retry on the next trigger.
    RetryKept {
        /// Status of the answer.
        status: Option<u16>,
    },
    /// The collector could not be reached.
    ConnectionLost,
    /// A pre-flight gate failed; nothing was read.
    Skipped {
        /// The failing gate.
        gate: SkipReason,
    },
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drained => f.write_str("drained"),
            Self::RetryKept { status: Some(status) } => write!(f, "kept for retry (status {status})"),
            Self::RetryKept { status: None } => f.write_str("kept for retry"),
            Self::ConnectionLost => f.write_str("connection lost"),
            Self::Skipped { gate } => write!(f, "skipped: {gate}"),
        }
    }
}

/// Outcome of one flush command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlushReport {
    /// Delivery attempts made (encoding failures are not attempts).
    pub attempts: u32,
    /// Records the server accepted.
    pub delivered: u64,
    /// Records deleted without acceptance.
    pub discarded: u64,
    /// Rows still queued when the flush ended.
    pub remaining: u64,
    /// Why the loop ended.
    pub stop: StopReason,
}

impl FlushReport {
    fn new(stop: StopReason) -> Self {
        Self {
            attempts: 0,
            delivered: 0,
            discarded: 0,
            remaining: 0,
            stop,
        }
    }
}

/// Everything the worker needs to run a flush.
pub(crate) struct Drainer {
    pub(crate) store: EventStore,
    pub(crate) transport: Arc<dyn BatchTransport>,
    pub(crate) device: Arc<dyn DeviceState>,
    pub(crate) settings: SharedSettings,
    pub(crate) stats: Arc<DispatchStats>,
}

impl Drainer {
    /// Run one flush against a settings snapshot.
    #[instrument(skip_all)]
    pub(crate) async fn flush(&self) -> Result<FlushReport> {
        let settings = self.settings.snapshot();

        if let Err(gate) = gates::check(&settings, self.device.as_ref()) {
            debug!(%gate, "flush skipped");
            self.stats.record_skip();
            let mut report = FlushReport::new(StopReason::Skipped { gate });
            report.remaining = self.store.count()?;
            return Ok(report);
        }
        self.stats.record_flush();

        let debug_mode = settings.effective_debug_mode();
        let sandbox = debug_mode.is_sandbox();
        let batch_size = settings.effective_batch_size();
        let options = DeliveryOptions {
            cookie: settings.cookie.clone(),
            dry_run: debug_mode.is_dry_run(),
        };

        let mut report = FlushReport::new(StopReason::Drained);
        let mut remaining = DRAIN_SEED;

        while remaining > 0 {
            let Some(batch) = self.store.read_oldest(batch_size)? else {
                break;
            };
            let records = batch.len() as u64;
            let watermark = batch.watermark();

            let (disposition, status) = match encode_batch(&batch) {
                Err(e) => {
                    warn!(%watermark, records, error = %e, kind = e.error_kind(), "discarding unencodable batch");
                    (DeliveryDisposition::DiscardInvalid, None)
                }
                Ok(encoded) => {
                    report.attempts += 1;
                    self.stats.record_attempt();
                    match self.transport.deliver(&settings.server_url, &encoded, &options).await {
                        Ok(receipt) => (DeliveryDisposition::Success, Some(receipt.status)),
                        Err(e) if e.aborts_cycle() => {
                            warn!(%watermark, records, error = %e, kind = e.error_kind(), "delivery failed, keeping batch");
                            report.stop = StopReason::ConnectionLost;
                            break;
                        }
                        Err(e) => (e.disposition(), e.status()),
                    }
                }
            };

            if !disposition.deletes_batch() && !sandbox {
                debug!(%watermark, ?status, "server asked to keep batch");
                report.stop = StopReason::RetryKept { status };
                break;
            }

            match disposition {
                DeliveryDisposition::Success => {
                    report.delivered += records;
                    self.stats.record_delivered(records);
                }
                other => {
                    warn!(%watermark, records, ?status, disposition = %other, "dropping batch");
                    report.discarded += records;
                    self.stats.record_discarded(records);
                }
            }
            remaining = self.store.delete_through(watermark)?;
            debug!(%watermark, remaining, "batch reconciled");
        }

        report.remaining = self.store.count()?;
        info!(
            attempts = report.attempts,
            delivered = report.delivered,
            discarded = report.discarded,
            remaining = report.remaining,
            stop = %report.stop,
            "flush finished"
        );
        Ok(report)
    }

    /// Clear the store unconditionally.
    pub(crate) fn delete_all(&self) -> Result<u64> {
        let deleted = self.store.delete_all()?;
        info!(deleted, "event store cleared");
        Ok(deleted)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
