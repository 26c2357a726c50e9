//! The producer-facing handle.
//!
//! [`Pipeline::start`] returns an explicit instance that callers thread
//! through their code; there is no process-wide registry. Every method is
//! safe to call from any thread and none of them wait on the network.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use courier_core::{DeviceState, FlushRequest};
use courier_settings::SharedSettings;
use courier_store::{EventStore, StoreError};
use courier_upload::BatchTransport;

use crate::dispatcher::Dispatcher;
use crate::drain::{Drainer, FlushReport};
use crate::errors::Result;
use crate::stats::{DispatchStats, StatsSnapshot};

/// What happened to one enqueued event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum Enqueued {
    /// Stored; `queued` rows are now waiting.
    Queued {
        /// Row count after the append.
        queued: u64,
    },
    /// The store is at its ceiling; the event was not stored and an
    /// immediate flush was requested.
    StoreFull,
    /// The pipeline is switched off; the event was dropped.
    Disabled,
}

struct Inner {
    store: EventStore,
    settings: SharedSettings,
    dispatcher: Dispatcher,
}

/// Cheap-to-clone handle over a running pipeline.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

impl Pipeline {
    /// Spawn the dispatcher worker on the current Tokio runtime.
    pub fn start(
        store: EventStore,
        transport: Arc<dyn BatchTransport>,
        device: Arc<dyn DeviceState>,
        settings: SharedSettings,
    ) -> Result<Self> {
        let capacity = settings.read(|s| s.command_queue_capacity);
        let drainer = Drainer {
            store: store.clone(),
            transport,
            device,
            settings: settings.clone(),
            stats: Arc::new(DispatchStats::default()),
        };
        let dispatcher = Dispatcher::spawn(drainer, capacity)?;
        info!(capacity, "pipeline started");

        Ok(Self {
            inner: Arc::new(Inner {
                store,
                settings,
                dispatcher,
            }),
        })
    }

    /// Store one event and schedule its delivery.
    ///
    /// Does nothing while the pipeline is remotely disabled.
    /// Flushes immediately in sandbox mode, when the store is full, for
    /// "send-now" event types, or once the queue passes the bulk threshold.
    /// Otherwise a debounced flush is scheduled after the flush interval.
    pub fn enqueue(&self, event_type: &str, event: &Value) -> Result<Enqueued> {
        let settings = self.inner.settings.snapshot();
        if settings.sdk_disabled {
            debug!(event_type, "pipeline disabled, event dropped");
            return Ok(Enqueued::Disabled);
        }
        let payload = serde_json::to_string(event)?;

        let appended = self.inner.store.append(&payload);
        let immediate = match &appended {
            Ok(queued) => {
                settings.effective_debug_mode().is_sandbox()
                    || settings.is_immediate_event(event_type)
                    || *queued > settings.flush_bulk_size
            }
            Err(e) => e.is_capacity_exceeded(),
        };

        if immediate {
            self.flush();
        } else {
            self.flush_after(Duration::from_millis(settings.flush_interval_ms));
        }

        match appended {
            Ok(queued) => {
                debug!(event_type, queued, immediate, "event queued");
                Ok(Enqueued::Queued { queued })
            }
            Err(StoreError::CapacityExceeded { .. }) => {
                warn!(event_type, "event store full, event not stored");
                Ok(Enqueued::StoreFull)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Flush as soon as the worker is free.
    pub fn flush(&self) {
        self.inner.dispatcher.submit(FlushRequest::Flush);
    }

    /// Flush after `delay`, coalescing with any flush already pending.
    pub fn flush_after(&self, delay: Duration) {
        self.inner.dispatcher.flush_after(delay);
    }

    /// Clear every queued event. Never coalesced or dropped.
    pub fn delete_all(&self) {
        self.inner.dispatcher.submit(FlushRequest::DeleteAll);
    }

    /// Flush now and wait up to `timeout` for the report.
    pub async fn flush_and_wait(&self, timeout: Duration) -> Option<FlushReport> {
        let rx = self.inner.dispatcher.request_flush()?;
        tokio::time::timeout(timeout, rx).await.ok()?.ok()
    }

    /// Blocking variant of [`flush_and_wait`](Self::flush_and_wait) for
    /// synchronous callers. Must not be called from a runtime thread.
    pub fn flush_blocking(&self, timeout: Duration) -> Option<FlushReport> {
        self.inner.dispatcher.flush_blocking(timeout)
    }

    /// Rows currently queued.
    pub fn queued(&self) -> Result<u64> {
        Ok(self.inner.store.count()?)
    }

    /// Delivery counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.dispatcher.stats().snapshot()
    }

    /// Live settings shared with the worker.
    pub fn settings(&self) -> &SharedSettings {
        &self.inner.settings
    }

    /// The underlying store.
    pub fn store(&self) -> &EventStore {
        &self.inner.store
    }

    /// Let queued commands finish, then stop the worker.
    pub async fn shutdown(&self) {
        self.inner.dispatcher.shutdown().await;
        info!("pipeline stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
