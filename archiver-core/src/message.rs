//! Records as they flow through one invocation: a [RawStreamRecord] comes in from the stream,
//! is decoded into a [RecordBody], and leaves as a [DecodedRecord] carrying its provenance.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One record exactly as delivered by the stream. It is never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct RawStreamRecord {
    /// Position of the record in its partition. The failure report is keyed by it.
    pub sequence_id: Option<String>,
    pub partition_key: String,
    /// Arrival time at the stream, in epoch seconds.
    pub arrival_timestamp: f64,
    pub payload: Bytes,
}

impl RawStreamRecord {
    /// The sequence id, treating an empty string the same as an absent one.
    pub fn sequence_id(&self) -> Option<&str> {
        self.sequence_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Encoding of a body that could not be decoded as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryEncoding {
    Base64,
}

/// The decoded payload. Decoding degrades through these variants instead of failing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RecordBody {
    /// The payload was text holding a JSON document.
    Parsed(serde_json::Value),
    /// The payload was text, but not JSON.
    Unparsed { raw: String, parse_error: String },
    /// The payload was not text in any supported encoding.
    Opaque {
        raw: String,
        encoding: BinaryEncoding,
        parse_error: String,
    },
}

impl RecordBody {
    pub fn is_parsed(&self) -> bool {
        matches!(self, RecordBody::Parsed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Origin {
    pub sequence_id: String,
    pub partition_key: String,
    pub arrival_timestamp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordMetadata {
    pub processed_at: DateTime<Utc>,
    pub environment: String,
    pub origin: Origin,
    pub payload_size_bytes: usize,
}

/// A record ready to be archived. One of these becomes one NDJSON line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedRecord {
    pub source_sequence_id: String,
    pub body: RecordBody,
    pub metadata: RecordMetadata,
}
