use chrono::{DateTime, Utc};

use crate::error::RecordError;
use crate::message::{DecodedRecord, Origin, RawStreamRecord, RecordBody, RecordMetadata};

/// Stamps decoded bodies with where they came from and when they were processed.
#[derive(Debug, Clone)]
pub struct Enricher {
    environment: String,
}

impl Enricher {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
        }
    }

    /// Builds the [DecodedRecord] for `raw`. A record without a sequence id cannot be reported
    /// back to the stream, so it is refused.
    pub fn enrich(
        &self,
        raw: &RawStreamRecord,
        body: RecordBody,
    ) -> Result<DecodedRecord, RecordError> {
        self.enrich_at(raw, body, Utc::now())
    }

    pub(crate) fn enrich_at(
        &self,
        raw: &RawStreamRecord,
        body: RecordBody,
        processed_at: DateTime<Utc>,
    ) -> Result<DecodedRecord, RecordError> {
        let sequence_id = raw.sequence_id().ok_or(RecordError::MissingOriginId)?;

        Ok(DecodedRecord {
            source_sequence_id: sequence_id.to_string(),
            body,
            metadata: RecordMetadata {
                processed_at,
                environment: self.environment.clone(),
                origin: Origin {
                    sequence_id: sequence_id.to_string(),
                    partition_key: raw.partition_key.clone(),
                    arrival_timestamp: raw.arrival_timestamp,
                },
                payload_size_bytes: raw.payload.len(),
            },
        })
    }
}
