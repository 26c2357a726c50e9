//! The single dispatcher worker and its scheduling front end.
//!
//! Producers hand commands over a bounded channel and never wait on I/O.
//! One long-lived task consumes the channel strictly in order, so no two
//! flushes (or a flush and a delete-all) ever overlap.
//!
//! Delayed flushes are debounced with one outstanding timer: a delayed
//! request is dropped while the timer is armed or a flush is already queued
//! but not yet started. Immediate requests skip the debounce.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use courier_core::FlushRequest;

use crate::drain::{Drainer, FlushReport};
use crate::errors::{DispatchError, Result};
use crate::stats::DispatchStats;

tokio::task_local! {
    pub(crate) static ON_WORKER: ();
}

/// True while running inside the worker task (including its panic hooks).
pub(crate) fn on_worker() -> bool {
    ON_WORKER.try_with(|_| ()).is_ok()
}

enum Command {
    /// A logical request. `reply` is only answered for [`FlushRequest::Flush`].
    Request {
        request: FlushRequest,
        reply: Option<oneshot::Sender<FlushReport>>,
    },
    Stop,
}

struct Shared {
    tx: mpsc::Sender<Command>,
    /// Flush commands sent but not yet picked up by the worker.
    queued_flushes: Arc<AtomicUsize>,
    stats: Arc<DispatchStats>,
}

impl Shared {
    fn submit_flush(&self, reply: Option<oneshot::Sender<FlushReport>>) -> bool {
        let _ = self.queued_flushes.fetch_add(1, Ordering::AcqRel);
        let command = Command::Request {
            request: FlushRequest::Flush,
            reply,
        };
        match self.tx.try_send(command) {
            Ok(()) => true,
            Err(e) => {
                let _ = self.queued_flushes.fetch_sub(1, Ordering::AcqRel);
                self.stats.record_dropped();
                match e {
                    TrySendError::Full(_) => warn!("flush dropped: command queue full"),
                    TrySendError::Closed(_) => warn!("flush dropped: dispatcher stopped"),
                }
                false
            }
        }
    }
}

/// Handle to the dispatcher worker.
pub struct Dispatcher {
    shared: Arc<Shared>,
    runtime: Handle,
    timer: Mutex<Option<JoinHandle<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Spawn the worker on the current Tokio runtime.
    pub(crate) fn spawn(drainer: Drainer, capacity: usize) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| DispatchError::NoRuntime(e.to_string()))?;
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let queued_flushes = Arc::new(AtomicUsize::new(0));
        let shared = Arc::new(Shared {
            tx,
            queued_flushes: queued_flushes.clone(),
            stats: drainer.stats.clone(),
        });

        // The worker holds no sender, so dropping every handle ends it.
        let worker = runtime.spawn(ON_WORKER.scope((), run_worker(rx, drainer, queued_flushes)));

        Ok(Self {
            shared,
            runtime,
            timer: Mutex::new(None),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Queue a command to run as soon as the worker is free.
    ///
    /// A flush is dropped (and counted) when the queue is full. A delete-all
    /// is never dropped while the worker is alive: if the queue is full the
    /// send waits on the runtime instead.
    pub fn submit(&self, request: FlushRequest) {
        match request {
            FlushRequest::Flush => {
                let _ = self.shared.submit_flush(None);
            }
            FlushRequest::DeleteAll => self.submit_delete_all(),
        }
    }

    fn submit_delete_all(&self) {
        let command = Command::Request {
            request: FlushRequest::DeleteAll,
            reply: None,
        };
        match self.shared.tx.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(command)) => {
                debug!("command queue full, delete-all waiting for room");
                let shared = self.shared.clone();
                let _ = self.runtime.spawn(async move {
                    if shared.tx.send(command).await.is_err() {
                        shared.stats.record_dropped();
                        warn!("delete-all dropped: dispatcher stopped");
                    }
                });
            }
            Err(TrySendError::Closed(_)) => {
                self.shared.stats.record_dropped();
                warn!("delete-all dropped: dispatcher stopped");
            }
        }
    }

    /// Flush after `delay`, unless a flush is already pending.
    pub fn flush_after(&self, delay: Duration) {
        let mut timer = self.timer.lock();
        let armed = timer.as_ref().is_some_and(|t| !t.is_finished());
        if armed || self.shared.queued_flushes.load(Ordering::Acquire) > 0 {
            self.shared.stats.record_coalesced();
            debug!(armed, "flush already pending, request coalesced");
            return;
        }

        let shared = self.shared.clone();
        *timer = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = shared.submit_flush(None);
        }));
    }

    /// Queue a flush whose report can be awaited.
    ///
    /// `None` when the command could not be queued.
    pub fn request_flush(&self) -> Option<oneshot::Receiver<FlushReport>> {
        let (tx, rx) = oneshot::channel();
        self.shared.submit_flush(Some(tx)).then_some(rx)
    }

    /// Queue a flush and block the calling thread for its report.
    ///
    /// For synchronous contexts such as a panic hook. Gives up after
    /// `timeout`; the flush itself still runs to completion.
    pub fn flush_blocking(&self, timeout: Duration) -> Option<FlushReport> {
        let rx = self.request_flush()?;
        let (done_tx, done_rx) = std::sync::mpsc::sync_channel(1);
        let _ = self.runtime.spawn(async move {
            if let Ok(report) = rx.await {
                let _ = done_tx.send(report);
            }
        });
        done_rx.recv_timeout(timeout).ok()
    }

    /// Counters shared with the worker.
    pub fn stats(&self) -> &DispatchStats {
        &self.shared.stats
    }

    /// Cancel any armed timer, let queued commands finish, stop the worker.
    ///
    /// Later calls are no-ops.
    pub async fn shutdown(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.abort();
        }
        let worker = self.worker.lock().take();
        let Some(worker) = worker else {
            return;
        };
        if self.shared.tx.send(Command::Stop).await.is_err() {
            debug!("dispatcher already stopped");
        }
        if let Err(e) = worker.await {
            warn!(error = %e, "dispatcher worker ended abnormally");
        }
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<Command>,
    drainer: Drainer,
    queued_flushes: Arc<AtomicUsize>,
) {
    while let Some(command) = rx.recv().await {
        let (request, reply) = match command {
            Command::Stop => break,
            Command::Request { request, reply } => (request, reply),
        };

        match request {
            FlushRequest::Flush => {
                let _ = queued_flushes.fetch_sub(1, Ordering::AcqRel);
                match AssertUnwindSafe(drainer.flush()).catch_unwind().await {
                    Ok(Ok(report)) => {
                        if let Some(reply) = reply {
                            let _ = reply.send(report);
                        }
                    }
                    Ok(Err(e)) => error!(error = %e, kind = e.error_kind(), "flush failed"),
                    Err(panic) => error!(panic = panic_message(panic.as_ref()), "flush panicked"),
                }
            }
            FlushRequest::DeleteAll => {
                match std::panic::catch_unwind(AssertUnwindSafe(|| drainer.delete_all())) {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => error!(error = %e, kind = e.error_kind(), "delete-all failed"),
                    Err(panic) => error!(panic = panic_message(panic.as_ref()), "delete-all panicked"),
                }
            }
        }
    }
    debug!("dispatcher worker stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
