//! Batch wire form: JSON array, gzip, base64, plus a checksum of the raw text.
//!
//! Encoding is deterministic for identical input. The gzip header carries no
//! file name and a zero modification time.

use std::io::{Read, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::de::IgnoredAny;

use courier_core::Batch;

use crate::errors::CodecError;

/// Value of the `gzip` request parameter.
pub const GZIP_MARKER: &str = "1";

/// A batch ready for one delivery attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedBatch {
    /// Decimal checksum of the raw payload; `None` when the payload is empty.
    pub checksum: Option<String>,
    /// Base64 text of the gzip-compressed payload.
    pub data: String,
    /// Number of records carried.
    pub record_count: usize,
}

/// Join the batch's records into one JSON array, in id order.
///
/// Record texts are kept verbatim. A record that is not valid JSON fails the
/// whole batch.
pub fn batch_payload(batch: &Batch) -> Result<String, CodecError> {
    let capacity = batch.records().iter().map(|r| r.payload.len() + 1).sum::<usize>() + 1;
    let mut payload = String::with_capacity(capacity);
    payload.push('[');
    for (i, record) in batch.records().iter().enumerate() {
        let _: IgnoredAny = serde_json::from_str(&record.payload).map_err(|source| {
            CodecError::MalformedRecord {
                id: record.id,
                source,
            }
        })?;
        if i > 0 {
            payload.push(',');
        }
        payload.push_str(&record.payload);
    }
    payload.push(']');
    Ok(payload)
}

/// 32-bit string hash over UTF-16 code units: `h = 31 * h + unit`, wrapping.
pub fn checksum(payload: &str) -> i32 {
    payload
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

/// Compress and encode a raw payload.
pub fn encode(payload: &str, record_count: usize) -> Result<EncodedBatch, CodecError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(payload.len() / 4), Compression::default());
    encoder.write_all(payload.as_bytes())?;
    let compressed = encoder.finish()?;

    Ok(EncodedBatch {
        checksum: (!payload.is_empty()).then(|| checksum(payload).to_string()),
        data: STANDARD.encode(compressed),
        record_count,
    })
}

/// Build the payload for a batch and encode it.
pub fn encode_batch(batch: &Batch) -> Result<EncodedBatch, CodecError> {
    let payload = batch_payload(batch)?;
    encode(&payload, batch.len())
}

/// Reverse [`encode`]: base64 decode then gunzip.
pub fn decode(data: &str) -> Result<String, CodecError> {
    let compressed = STANDARD
        .decode(data)
        .map_err(|e| CodecError::Decode(e.to_string()))?;
    let mut payload = String::new();
    let _ = GzDecoder::new(compressed.as_slice()).read_to_string(&mut payload)?;
    Ok(payload)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use courier_core::{EventRecord, RecordId};

    use super::*;

    fn batch(payloads: &[&str]) -> Batch {
        let records = payloads
            .iter()
            .zip(1..)
            .map(|(payload, id)| EventRecord {
                id: RecordId::new(id),
                payload: (*payload).to_string(),
                created_at: 0,
            })
            .collect();
        Batch::from_records(records).unwrap()
    }

    #[test]
    fn payload_is_json_array_in_order() {
        let b = batch(&[r#"{"a":1}"#, r#"{"b":2}"#, "3"]);
        assert_eq!(batch_payload(&b).unwrap(), r#"[{"a":1},{"b":2},3]"#);
    }

    #[test]
    fn malformed_record_fails_whole_batch() {
        let b = batch(&[r#"{"a":1}"#, r#"{"b":"#]);
        let err = encode_batch(&b).unwrap_err();
        assert_matches!(err, CodecError::MalformedRecord { id, .. } if id == RecordId::new(2));
    }

    #[test]
    fn checksum_matches_string_hash() {
        assert_eq!(checksum(""), 0);
        assert_eq!(checksum("a"), 97);
        assert_eq!(checksum("abc"), 96_354);
        assert_eq!(checksum("hello world"), 1_794_106_052);
        // Overflow wraps into the negative range.
        assert_eq!(checksum(r#"[{"event":"view"}]"#), -158_845_557);
        assert_eq!(checksum("polygenelubricants"), i32::MIN);
    }

    #[test]
    fn checksum_counts_utf16_units() {
        // U+1F600 is a surrogate pair: 0xD83D 0xDE00.
        let expected = 0xD83Di32.wrapping_mul(31).wrapping_add(0xDE00);
        assert_eq!(checksum("\u{1F600}"), expected);
    }

    #[test]
    fn encode_is_deterministic() {
        let payload = r#"[{"event":"view","n":1}]"#;
        assert_eq!(encode(payload, 1).unwrap(), encode(payload, 1).unwrap());
    }

    #[test]
    fn decoded_payload_reproduces_checksum() {
        let b = batch(&[r#"{"event":"signup","props":{"plan":"pro"}}"#, r#"{"event":"päge"}"#]);
        let encoded = encode_batch(&b).unwrap();
        assert_eq!(encoded.record_count, 2);

        let payload = decode(&encoded.data).unwrap();
        assert_eq!(payload, batch_payload(&b).unwrap());
        assert_eq!(encoded.checksum, Some(checksum(&payload).to_string()));
    }

    #[test]
    fn empty_payload_has_no_checksum() {
        let encoded = encode("", 0).unwrap();
        assert!(encoded.checksum.is_none());
        assert_eq!(decode(&encoded.data).unwrap(), "");
    }

    #[test]
    fn decode_rejects_bad_text() {
        assert_matches!(decode("not base64!"), Err(CodecError::Decode(_)));
    }
}
