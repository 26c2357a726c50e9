//! # courier-upload
//!
//! Turning a [`Batch`](courier_core::Batch) into one HTTP delivery attempt.
//!
//! - [`codec`]: JSON array payload, checksum, gzip + base64
//! - [`uploader`]: the [`BatchTransport`] seam and its `reqwest` implementation
//!
//! Non-2xx answers surface as [`UploadError::Response`] and map to a
//! [`DeliveryDisposition`](courier_core::DeliveryDisposition) through
//! [`UploadError::disposition`].

#![deny(unsafe_code)]

pub mod codec;
pub mod errors;
pub mod uploader;

pub use codec::{EncodedBatch, checksum, encode, encode_batch};
pub use errors::{CodecError, UploadError};
pub use uploader::{
    BatchTransport, DeliveryOptions, DeliveryReceipt, HttpUploader, UploaderConfig,
};
