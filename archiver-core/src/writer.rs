//! Turns a drained batch into an archive object and writes it with bounded retries.
//!
//! An archive is the gzip of the batch as NDJSON, one [DecodedRecord] per line, stored under
//! `{prefix}/year=YYYY/month=MM/day=DD/hour=HH/{batch_id}.jsonl.gz`. The hour partition comes
//! from the flush time and the batch id is unique per flush, so keys never collide and an
//! object is never overwritten.

use std::collections::HashMap;
use std::io::Write;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::{debug, error, info, warn};

use crate::config::{RetryConfig, Settings};
use crate::message::DecodedRecord;
use crate::metrics::{MetricDatum, MetricName, MetricsSink};
use crate::retry::Backoff;
use crate::store::{ArchiveObject, ObjectStore};
use crate::{Error, Result};

pub const CONTENT_TYPE_NDJSON: &str = "application/x-ndjson";
pub const CONTENT_ENCODING_GZIP: &str = "gzip";
pub const ARCHIVE_EXTENSION: &str = "jsonl.gz";

// object metadata keys
pub const METADATA_RECORD_COUNT: &str = "record_count";
pub const METADATA_ENVIRONMENT: &str = "environment";
pub const METADATA_BATCH_ID: &str = "batch_id";

/// Identifier of one flush: the invocation, the index of the record that triggered the flush
/// and the flush time in milliseconds.
pub fn batch_id(invocation_id: &str, record_index: usize, flushed_at: DateTime<Utc>) -> String {
    format!(
        "{invocation_id}-{record_index:06}-{}",
        flushed_at.timestamp_millis()
    )
}

/// Destination key of an archive, partitioned by the hour of `flushed_at`.
pub fn archive_key(prefix: &str, flushed_at: DateTime<Utc>, batch_id: &str) -> String {
    format!(
        "{prefix}/year={}/month={}/day={}/hour={}/{batch_id}.{ARCHIVE_EXTENSION}",
        flushed_at.format("%Y"),
        flushed_at.format("%m"),
        flushed_at.format("%d"),
        flushed_at.format("%H"),
    )
}

pub(crate) fn serialize_ndjson(records: &[DecodedRecord]) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    for record in records {
        serde_json::to_writer(&mut output, record).map_err(|e| {
            Error::Serialization(format!(
                "Failed to serialize record {}: {e}",
                record.source_sequence_id
            ))
        })?;
        output.push(b'\n');
    }
    Ok(output)
}

pub(crate) fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| Error::Serialization(format!("Failed to compress archive with gzip: {e}")))?;
    encoder
        .finish()
        .map_err(|e| Error::Serialization(format!("Failed to finish gzip compression: {e}")))
}

/// Outcome of a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    pub key: String,
    pub record_count: usize,
    pub compressed_size: usize,
    /// Number of puts it took, 1 when the first attempt succeeded.
    pub attempts: u16,
}

pub struct DurableBatchWriter<S, M> {
    store: S,
    metrics: M,
    bucket: String,
    environment: String,
    key_prefix: String,
    retry: RetryConfig,
}

impl<S, M> DurableBatchWriter<S, M>
where
    S: ObjectStore,
    M: MetricsSink,
{
    pub fn new(settings: &Settings, store: S, metrics: M) -> Self {
        Self {
            store,
            metrics,
            bucket: settings.bucket_name.clone(),
            environment: settings.environment.clone(),
            key_prefix: settings.key_prefix.clone(),
            retry: settings.retry.clone(),
        }
    }

    /// Archives `records` under `batch_id`. Every attempt re-sends the whole object; after the
    /// configured number of attempts the last store error is returned inside
    /// [Error::WriteExhausted]. Metrics are only emitted for a successful write.
    pub async fn write(
        &self,
        records: Vec<DecodedRecord>,
        batch_id: &str,
        flushed_at: DateTime<Utc>,
    ) -> Result<WriteReceipt> {
        if records.is_empty() {
            return Err(Error::Serialization(format!(
                "Refusing to write empty batch {batch_id}"
            )));
        }

        let record_count = records.len();
        let ndjson = serialize_ndjson(&records)?;
        let compressed = gzip(&ndjson)?;
        let compressed_size = compressed.len();
        let key = archive_key(&self.key_prefix, flushed_at, batch_id);

        debug!(
            %key,
            record_count,
            uncompressed_size = ndjson.len(),
            compressed_size,
            "Writing archive"
        );

        let object = ArchiveObject {
            bucket: self.bucket.clone(),
            key: key.clone(),
            body: Bytes::from(compressed),
            content_type: CONTENT_TYPE_NDJSON,
            content_encoding: CONTENT_ENCODING_GZIP,
            metadata: HashMap::from([
                (METADATA_RECORD_COUNT.to_string(), record_count.to_string()),
                (METADATA_ENVIRONMENT.to_string(), self.environment.clone()),
                (METADATA_BATCH_ID.to_string(), batch_id.to_string()),
            ]),
        };

        let mut backoff = Backoff::new(&self.retry);
        let mut attempts: u16 = 0;
        loop {
            attempts += 1;
            match self.store.put_object(object.clone()).await {
                Ok(()) => break,
                Err(e) => match backoff.next() {
                    Some(delay) => {
                        warn!(
                            %key,
                            attempt = attempts,
                            ?delay,
                            error = %e,
                            "Archive write failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        error!(%key, attempts, error = %e, "Archive write retries exhausted");
                        return Err(Error::WriteExhausted {
                            attempts,
                            last_error: Box::new(e),
                        });
                    }
                },
            }
        }

        info!(
            bucket = %self.bucket,
            %key,
            record_count,
            compressed_size,
            attempts,
            "Archive written"
        );

        self.metrics
            .emit(vec![
                MetricDatum::count(MetricName::BatchWrites, 1),
                MetricDatum::count(MetricName::RecordsPerBatch, record_count),
                MetricDatum::count(MetricName::CompressedSizeBytes, compressed_size),
            ])
            .await;

        Ok(WriteReceipt {
            key,
            record_count,
            compressed_size,
            attempts,
        })
    }
}
