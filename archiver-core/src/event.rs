//! Wire format of an invocation as handed over by the stream runtime.
//!
//! ```json
//! {
//!   "invocationId": "optional, generated when absent",
//!   "records": [
//!     {"sequenceId": "...", "partitionKey": "...", "arrivalTimestamp": 1709971199.5, "payload": "<base64>"}
//!   ]
//! }
//! ```

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use bytes::Bytes;
use serde::{Deserialize, Deserializer};

use crate::message::RawStreamRecord;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationEvent {
    #[serde(default)]
    pub invocation_id: Option<String>,
    pub records: Vec<EventRecord>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    #[serde(default)]
    pub sequence_id: Option<String>,
    #[serde(default)]
    pub partition_key: String,
    #[serde(default)]
    pub arrival_timestamp: f64,
    #[serde(deserialize_with = "base64_payload")]
    pub payload: Bytes,
}

fn base64_payload<'de, D>(deserializer: D) -> std::result::Result<Bytes, D::Error>
where
    D: Deserializer<'de>,
{
    let encoded = String::deserialize(deserializer)?;
    BASE64_STANDARD
        .decode(encoded.as_bytes())
        .map(Bytes::from)
        .map_err(serde::de::Error::custom)
}

impl From<EventRecord> for RawStreamRecord {
    fn from(record: EventRecord) -> Self {
        RawStreamRecord {
            sequence_id: record.sequence_id,
            partition_key: record.partition_key,
            arrival_timestamp: record.arrival_timestamp,
            payload: record.payload,
        }
    }
}

impl InvocationEvent {
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data)
            .map_err(|e| Error::Event(format!("Failed to parse invocation event: {e}")))
    }

    /// Splits the event into its id, if the host gave one, and the records in delivery order.
    pub fn into_parts(self) -> (Option<String>, Vec<RawStreamRecord>) {
        let invocation_id = self.invocation_id.filter(|id| !id.trim().is_empty());
        let records = self.records.into_iter().map(RawStreamRecord::from).collect();
        (invocation_id, records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event() {
        let event = InvocationEvent::from_slice(
            br#"{
                "invocationId": "inv-1",
                "records": [
                    {"sequenceId": "seq-1", "partitionKey": "host-1", "arrivalTimestamp": 1709971199.5, "payload": "eyJtc2ciOiJvayJ9"},
                    {"partitionKey": "host-2", "arrivalTimestamp": 1709971200, "payload": "wyg="}
                ]
            }"#,
        )
        .unwrap();

        let (invocation_id, records) = event.into_parts();
        assert_eq!(invocation_id.as_deref(), Some("inv-1"));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sequence_id(), Some("seq-1"));
        assert_eq!(records[0].payload, Bytes::from_static(br#"{"msg":"ok"}"#));
        assert_eq!(records[0].arrival_timestamp, 1709971199.5);
        assert_eq!(records[1].sequence_id(), None);
        assert_eq!(records[1].payload, Bytes::from_static(&[0xc3, 0x28]));
    }

    #[test]
    fn test_blank_invocation_id_is_absent() {
        let event =
            InvocationEvent::from_slice(br#"{"invocationId": " ", "records": []}"#).unwrap();
        let (invocation_id, records) = event.into_parts();
        assert_eq!(invocation_id, None);
        assert!(records.is_empty());
    }

    #[test]
    fn test_invalid_event() {
        for data in [
            &br#"{"records": [{"sequenceId": "1", "payload": "not base64!"}]}"#[..],
            br#"{"records": [{"sequenceId": "1"}]}"#,
            br#"[]"#,
            b"",
        ] {
            assert!(matches!(
                InvocationEvent::from_slice(data),
                Err(Error::Event(_))
            ));
        }
    }
}
