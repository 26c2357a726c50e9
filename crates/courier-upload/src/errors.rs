//! Error types for encoding and delivery.

use courier_core::{DeliveryDisposition, RecordId};
use thiserror::Error;

/// A batch could not be turned into its wire form.
///
/// Always permanent for the batch in question: the dispatcher discards it.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A queued record is not valid JSON.
    #[error("record {id} is not valid JSON: {source}")]
    MalformedRecord {
        /// Offending record.
        id: RecordId,
        /// Parser error.
        #[source]
        source: serde_json::Error,
    },

    /// The compressor failed.
    #[error("compression failed: {0}")]
    Compression(#[from] std::io::Error),

    /// Encoded text could not be turned back into a payload.
    #[error("decode failed: {0}")]
    Decode(String),
}

impl CodecError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::MalformedRecord { .. } => "malformed_record",
            Self::Compression(_) => "compression",
            Self::Decode(_) => "decode",
        }
    }
}

/// One delivery attempt did not succeed.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The endpoint (or a redirect target) is not a usable URL.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// The server could not be reached or the exchange broke off.
    #[error("connection error: {0}")]
    Connection(String),

    /// The server answered with a non-2xx status.
    #[error("server responded {status}: {body}")]
    Response {
        /// HTTP status code of the final response.
        status: u16,
        /// Response body, read for diagnostics.
        body: String,
    },
}

impl UploadError {
    /// Whether the rest of the current drain cycle should be abandoned.
    ///
    /// True for everything that is not a server answer.
    pub fn aborts_cycle(&self) -> bool {
        !matches!(self, Self::Response { .. })
    }

    /// Disposition for the batch that produced this error.
    pub fn disposition(&self) -> DeliveryDisposition {
        match self {
            Self::Response { status, .. } => DeliveryDisposition::from_status(*status),
            Self::InvalidEndpoint(_) | Self::Connection(_) => DeliveryDisposition::RetryKeep,
        }
    }

    /// HTTP status when the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Response { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidEndpoint(_) => "invalid_endpoint",
            Self::Connection(_) => "connection",
            Self::Response { .. } => "response",
        }
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::InvalidEndpoint(err.to_string())
        } else {
            Self::Connection(err.to_string())
        }
    }
}
