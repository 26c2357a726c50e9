//! # courier-store
//!
//! Durable, ordered event queue over `SQLite`.
//!
//! - [`Database`] owns the connection behind a single mutex
//! - [`EventStore`] implements append, oldest-first read, delete-through a
//!   watermark, and delete-all, with a byte-size ceiling on append
//!
//! The queue never evicts: when an append would pass the ceiling it fails
//! with [`StoreError::CapacityExceeded`] and the caller flushes.

#![deny(unsafe_code)]

pub mod database;
pub mod errors;
pub mod queue;
pub mod schema;

pub use database::Database;
pub use errors::{Result, StoreError};
pub use queue::EventStore;
