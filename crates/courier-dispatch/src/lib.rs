//! # courier-dispatch
//!
//! The single worker that decides when to flush and reconciles the store
//! with what the collector said.
//!
//! - [`Pipeline`]: producer handle (enqueue, flush, delete-all, stats)
//! - [`Dispatcher`]: bounded command channel, debounced flush timer, worker
//! - [`drain`]: the read, encode, deliver, reconcile loop and its [`FlushReport`]
//! - [`gates`]: pre-flight checks that can skip a flush
//! - [`crash`]: panic hook that attempts one last flush
//!
//! Data is deleted only after a disposition that allows it. A transient
//! failure stops the current cycle and leaves retry to the next trigger.

#![deny(unsafe_code)]

pub mod crash;
pub mod dispatcher;
pub mod drain;
pub mod errors;
pub mod gates;
pub mod pipeline;
pub mod stats;

#[cfg(test)]
mod testing;

pub use crash::{crash_flush, install_crash_hook};
pub use dispatcher::Dispatcher;
pub use drain::{DRAIN_SEED, FlushReport, StopReason};
pub use errors::{DispatchError, Result};
pub use gates::SkipReason;
pub use pipeline::{Enqueued, Pipeline};
pub use stats::{DispatchStats, StatsSnapshot};
