//! Error types for the event store.

use thiserror::Error;

/// Errors that can occur during event store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The append would push the local footprint past the configured ceiling.
    ///
    /// Not a failure for the producer: the dispatcher reacts with an
    /// immediate flush.
    #[error("capacity exceeded: footprint {footprint} + {incoming} bytes > limit {limit}")]
    CapacityExceeded {
        /// Current footprint in bytes.
        footprint: u64,
        /// Size of the rejected payload in bytes.
        incoming: u64,
        /// Configured ceiling in bytes.
        limit: u64,
    },

    /// Filesystem error while preparing the database location.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Schema setup failed.
    #[error("schema error: {0}")]
    Schema(String),
}

impl StoreError {
    /// Whether this is the distinguished capacity signal.
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "sqlite",
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::Io(_) => "io",
            Self::Schema(_) => "schema",
        }
    }
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;
