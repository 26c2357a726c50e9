//! Error types for the dispatcher and producer handle.

use courier_store::StoreError;
use thiserror::Error;

/// Errors surfaced by the dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The event store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An event could not be serialized for the queue.
    #[error("event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Started outside a Tokio runtime.
    #[error("no tokio runtime: {0}")]
    NoRuntime(String),
}

impl DispatchError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Store(e) => e.error_kind(),
            Self::Serialize(_) => "serialize",
            Self::NoRuntime(_) => "no_runtime",
        }
    }
}

/// Convenience type alias for dispatcher results.
pub type Result<T> = std::result::Result<T, DispatchError>;
