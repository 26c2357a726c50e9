//! # courier-core
//!
//! Foundation types shared by every courier crate.
//!
//! - **Records**: [`RecordId`], [`EventRecord`], and the oldest-first [`Batch`]
//! - **Delivery**: [`FlushRequest`] commands and the [`DeliveryDisposition`] of one upload
//! - **Modes**: [`DebugMode`] (sandbox behaviour during development)
//! - **Network**: [`NetworkClass`], [`NetworkPolicy`], and the [`DeviceState`] collaborator
//! - **Logging**: `tracing` subscriber initialisation

#![deny(unsafe_code)]

pub mod delivery;
pub mod logging;
pub mod modes;
pub mod network;
pub mod records;

pub use delivery::{DeliveryDisposition, FlushRequest};
pub use modes::DebugMode;
pub use network::{AlwaysOnline, DeviceState, NetworkClass, NetworkPolicy};
pub use records::{Batch, EventRecord, RecordId};
