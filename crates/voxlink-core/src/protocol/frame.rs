//! Record framing for the hub protocol.
//!
//! Wire rules:
//! - Every record is a JSON document followed by the record separator `0x1E`.
//! - A network read may carry zero, one, or many records and may stop
//!   mid-record; the decoder keeps the remainder for the next read.
//! - Blank records (only whitespace between separators) are skipped.

use bytes::{Buf, Bytes, BytesMut};
use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, VoxlinkError};

/// Record separator byte (ASCII RS).
pub const RECORD_SEPARATOR: u8 = 0x1e;

/// Default upper bound for a record still waiting for its separator.
pub const DEFAULT_MAX_RECORD_BYTES: usize = 1024 * 1024;

/// Serialize `value` as JSON and terminate it with the record separator.
pub fn encode<T: Serialize>(value: &T) -> Result<Bytes> {
    let mut out = serde_json::to_vec(value)
        .map_err(|e| VoxlinkError::Internal(format!("record serialization failed: {e}")))?;
    out.push(RECORD_SEPARATOR);
    Ok(Bytes::from(out))
}

/// Same as [`encode`], returned as a `String` for WebSocket text frames.
pub fn encode_text<T: Serialize>(value: &T) -> Result<String> {
    let mut out = serde_json::to_string(value)
        .map_err(|e| VoxlinkError::Internal(format!("record serialization failed: {e}")))?;
    out.push(char::from(RECORD_SEPARATOR));
    Ok(out)
}

/// Parse one record (without its separator) as a JSON object.
pub fn decode_record(record: &[u8]) -> Result<Value> {
    let value: Value = serde_json::from_slice(record)
        .map_err(|e| VoxlinkError::MalformedFrame(format!("invalid record json: {e}")))?;
    if !value.is_object() {
        return Err(VoxlinkError::MalformedFrame(
            "record is not a JSON object".into(),
        ));
    }
    Ok(value)
}

fn is_blank(record: &[u8]) -> bool {
    record.iter().all(u8::is_ascii_whitespace)
}

/// Incremental record decoder owning the partial-record remainder.
#[derive(Debug)]
pub struct RecordDecoder {
    buf: BytesMut,
    max_record_bytes: usize,
}

impl Default for RecordDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordDecoder {
    pub fn new() -> Self {
        Self::with_max_record_bytes(DEFAULT_MAX_RECORD_BYTES)
    }

    pub fn with_max_record_bytes(max_record_bytes: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_record_bytes: max_record_bytes.max(1),
        }
    }

    /// Bytes received after the last separator.
    pub fn remainder(&self) -> &[u8] {
        &self.buf
    }

    /// Consume a chunk and return every record it completes.
    ///
    /// An `Err` item means the pending remainder outgrew the record limit and
    /// was discarded; records completed before it are still returned.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<Bytes>> {
        // Bytes already buffered hold no separator, so only scan the new tail.
        let mut scan_from = self.buf.len();
        self.buf.extend_from_slice(chunk);

        let mut out = Vec::new();
        while let Some(offset) = self.buf[scan_from..]
            .iter()
            .position(|b| *b == RECORD_SEPARATOR)
        {
            let record = self.buf.split_to(scan_from + offset).freeze();
            self.buf.advance(1);
            scan_from = 0;
            if !is_blank(&record) {
                out.push(Ok(record));
            }
        }

        if self.buf.len() > self.max_record_bytes {
            let dropped = self.buf.len();
            self.buf.clear();
            tracing::warn!(dropped, limit = self.max_record_bytes, "record remainder discarded");
            out.push(Err(VoxlinkError::MalformedFrame(format!(
                "record exceeds {} bytes without separator",
                self.max_record_bytes
            ))));
        }

        out
    }

    /// [`feed`](Self::feed) followed by [`decode_record`] on every record.
    pub fn feed_json(&mut self, chunk: &[u8]) -> Vec<Result<Value>> {
        self.feed(chunk)
            .into_iter()
            .map(|r| r.and_then(|rec| decode_record(&rec)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn encode_appends_separator() {
        let bytes = encode(&json!({"protocol": "json", "version": 1})).unwrap();
        assert_eq!(bytes.last(), Some(&RECORD_SEPARATOR));
        assert_eq!(
            &bytes[..bytes.len() - 1],
            br#"{"protocol":"json","version":1}"#
        );
    }

    #[test]
    fn feed_across_many_reads() {
        let mut dec = RecordDecoder::new();
        assert!(dec.feed(b"{\"ty").is_empty());
        assert!(dec.feed(b"pe\":6").is_empty());
        let out = dec.feed(b"}\x1e{\"type\"");
        assert_eq!(out.len(), 1);
        assert_eq!(&out[0].as_ref().unwrap()[..], b"{\"type\":6}");
        assert_eq!(dec.remainder(), b"{\"type\"");
    }

    #[test]
    fn blank_records_are_skipped() {
        let mut dec = RecordDecoder::new();
        let out = dec.feed(b"{}\x1e\x1e  \x1e");
        assert_eq!(out.len(), 1);
        assert!(dec.remainder().is_empty());
    }

    #[test]
    fn malformed_record_does_not_poison_neighbours() {
        let mut dec = RecordDecoder::new();
        let out = dec.feed_json(b"{\"type\":6}\x1enot json\x1e{\"type\":7}\x1e");
        assert_eq!(out.len(), 3);
        assert!(out[0].is_ok());
        assert_eq!(
            out[1].as_ref().unwrap_err().code().as_str(),
            "MALFORMED_FRAME"
        );
        assert_eq!(out[2].as_ref().unwrap()["type"], 7);
    }

    #[test]
    fn oversized_remainder_is_discarded() {
        let mut dec = RecordDecoder::with_max_record_bytes(8);
        let out = dec.feed(b"{}\x1e0123456789");
        assert_eq!(out.len(), 2);
        assert!(out[0].is_ok());
        assert!(out[1].is_err());
        assert!(dec.remainder().is_empty());

        // decoder keeps working afterwards
        let out = dec.feed(b"{}\x1e");
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn non_object_record_is_malformed() {
        let err = decode_record(b"[1,2]").unwrap_err();
        assert_eq!(err.code().as_str(), "MALFORMED_FRAME");
    }
}
