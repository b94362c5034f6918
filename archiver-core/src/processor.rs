//! Runs one invocation: every record goes through the size check, the decoder and the enricher
//! into the [BatchBuffer], which is flushed through the [DurableBatchWriter] whenever it is full
//! or the last record has been appended.
//!
//! A record that fails is reported and takes the in-flight buffer down with it. Processing then
//! carries on with the next record. Only an exhausted write aborts the invocation.

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::buffer::BatchBuffer;
use crate::config::Settings;
use crate::decode::{check_size, decode};
use crate::enrich::Enricher;
use crate::error::{ErrorKind, RecordError};
use crate::event::InvocationEvent;
use crate::message::{DecodedRecord, RawStreamRecord};
use crate::metrics::{MetricDatum, MetricName, MetricsSink};
use crate::store::ObjectStore;
use crate::tracker::{FailureTracker, InvocationResult};
use crate::writer::{DurableBatchWriter, batch_id};
use crate::Result;

/// Processes invocations against an object store and a metrics sink. It holds no per-invocation
/// state, so one instance serves any number of invocations.
pub struct Processor<S, M> {
    max_payload_size: usize,
    batch_write_threshold: usize,
    enricher: Enricher,
    writer: DurableBatchWriter<S, M>,
    metrics: M,
}

/// Counters of a single invocation.
#[derive(Debug, Default)]
struct Tally {
    processed: usize,
    discarded: usize,
}

impl<S, M> Processor<S, M>
where
    S: ObjectStore,
    M: MetricsSink + Clone,
{
    pub fn new(settings: &Settings, store: S, metrics: M) -> Self {
        Self {
            max_payload_size: settings.max_payload_size,
            batch_write_threshold: settings.batch_write_threshold,
            enricher: Enricher::new(settings.environment.clone()),
            writer: DurableBatchWriter::new(settings, store, metrics.clone()),
            metrics,
        }
    }

    pub async fn process_event(&self, event: InvocationEvent) -> Result<InvocationResult> {
        let (invocation_id, records) = event.into_parts();
        self.process(invocation_id, records).await
    }

    /// Processes `records` in delivery order and returns the ids of the records that failed.
    /// An exhausted write is returned as an error; archives flushed before it stay in place.
    pub async fn process(
        &self,
        invocation_id: Option<String>,
        records: Vec<RawStreamRecord>,
    ) -> Result<InvocationResult> {
        let start = Instant::now();
        let invocation_id = invocation_id.unwrap_or_else(|| Uuid::now_v7().to_string());
        let total = records.len();
        info!(%invocation_id, records = total, "Processing invocation");

        let mut buffer = BatchBuffer::new(self.batch_write_threshold);
        let mut tracker = FailureTracker::new();
        let mut tally = Tally::default();

        for (index, raw) in records.iter().enumerate() {
            let last_record = index + 1 == total;

            let record = match self.prepare(raw) {
                Ok(record) => record,
                Err(error) => {
                    tracker.record(raw.sequence_id().unwrap_or_default(), &error);
                    let dropped = buffer.discard();
                    if !dropped.is_empty() {
                        warn!(
                            %invocation_id,
                            count = dropped.len(),
                            sequence_ids = ?dropped,
                            "Discarding buffered records after a record failed"
                        );
                        tally.discarded += dropped.len();
                    }
                    continue;
                }
            };

            buffer.append(record);
            if buffer.should_flush(last_record) {
                self.flush(&invocation_id, index, &mut buffer, &mut tally, start)
                    .await?;
            }
        }

        // normally empty here, the last record already forced a flush
        if !buffer.is_empty() {
            self.flush(&invocation_id, total, &mut buffer, &mut tally, start)
                .await?;
        }

        let elapsed = start.elapsed();
        self.metrics
            .emit(vec![
                MetricDatum::count(MetricName::ProcessedRecords, tally.processed),
                MetricDatum::count(MetricName::FailedRecords, tracker.len()),
                MetricDatum::count(MetricName::DiscardedRecords, tally.discarded),
                MetricDatum::new(
                    MetricName::ProcessingDuration,
                    elapsed.as_secs_f64() * 1000.0,
                ),
            ])
            .await;

        let outcome = if tracker.is_empty() {
            "Completed"
        } else {
            "PartialFailure"
        };
        info!(
            %invocation_id,
            outcome,
            records = total,
            processed = tally.processed,
            failed = tracker.len(),
            discarded = tally.discarded,
            ?elapsed,
            "Invocation finished"
        );

        Ok(tracker.into_reporter().build())
    }

    fn prepare(&self, raw: &RawStreamRecord) -> std::result::Result<DecodedRecord, RecordError> {
        check_size(&raw.payload, self.max_payload_size)?;

        let body = decode(&raw.payload);
        if !body.is_parsed() {
            debug!(
                sequence_id = raw.sequence_id().unwrap_or_default(),
                "Payload is not JSON, archiving it unparsed"
            );
        }

        self.enricher.enrich(raw, body)
    }

    async fn flush(
        &self,
        invocation_id: &str,
        record_index: usize,
        buffer: &mut BatchBuffer,
        tally: &mut Tally,
        start: Instant,
    ) -> Result<()> {
        let records = buffer.drain();
        let flushed_at = Utc::now();
        let batch_id = batch_id(invocation_id, record_index, flushed_at);

        match self.writer.write(records, &batch_id, flushed_at).await {
            Ok(receipt) => {
                tally.processed += receipt.record_count;
                Ok(())
            }
            Err(e) => {
                match e.kind() {
                    Some(ErrorKind::WriteExhausted) => error!(
                        %invocation_id,
                        %batch_id,
                        error = %e,
                        "Archive write retries exhausted, failing the invocation"
                    ),
                    _ => error!(%invocation_id, %batch_id, error = %e, "Invocation failed"),
                }
                self.metrics
                    .emit(vec![
                        MetricDatum::count(MetricName::ProcessingErrors, 1),
                        MetricDatum::count(MetricName::ProcessedRecords, tally.processed),
                        MetricDatum::new(
                            MetricName::ProcessingDuration,
                            start.elapsed().as_secs_f64() * 1000.0,
                        ),
                    ])
                    .await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use parking_lot::Mutex;
    use test_log::test;

    use super::*;
    use crate::Error;
    use crate::store::{ArchiveObject, MemoryObjectStore};

    struct UnavailableStore;

    impl ObjectStore for UnavailableStore {
        async fn put_object(&self, _object: ArchiveObject) -> Result<()> {
            Err(Error::Store("ServiceUnavailable".to_string()))
        }
    }

    #[derive(Clone, Default)]
    struct RecordingMetrics {
        data: Arc<Mutex<Vec<MetricDatum>>>,
    }

    impl RecordingMetrics {
        fn total(&self, name: MetricName) -> f64 {
            self.data
                .lock()
                .iter()
                .filter(|d| d.name == name)
                .map(|d| d.value)
                .sum()
        }
    }

    impl MetricsSink for RecordingMetrics {
        async fn emit(&self, data: Vec<MetricDatum>) {
            self.data.lock().extend(data);
        }
    }

    fn raw(sequence_id: Option<&str>, payload: &[u8]) -> RawStreamRecord {
        RawStreamRecord {
            sequence_id: sequence_id.map(str::to_string),
            partition_key: "host-1".to_string(),
            arrival_timestamp: 1_709_971_199.5,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    fn processor(
        threshold: usize,
    ) -> (
        Processor<MemoryObjectStore, RecordingMetrics>,
        MemoryObjectStore,
        RecordingMetrics,
    ) {
        let mut settings = Settings::new("archive", "test");
        settings.batch_write_threshold = threshold;
        settings.max_payload_size = 16;
        let store = MemoryObjectStore::new();
        let metrics = RecordingMetrics::default();
        (
            Processor::new(&settings, store.clone(), metrics.clone()),
            store,
            metrics,
        )
    }

    #[test(tokio::test)]
    async fn test_empty_invocation() {
        let (processor, store, metrics) = processor(3);

        let result = processor.process(None, vec![]).await.unwrap();

        assert!(result.failed_item_ids.is_empty());
        assert!(store.is_empty());
        assert_eq!(metrics.total(MetricName::ProcessedRecords), 0.0);
        assert_eq!(metrics.total(MetricName::BatchWrites), 0.0);
    }

    #[test(tokio::test)]
    async fn test_oversized_and_missing_id_are_reported() {
        let (processor, store, metrics) = processor(10);

        let result = processor
            .process(
                Some("inv".to_string()),
                vec![
                    raw(Some("seq-1"), br#"{"a":1}"#),
                    raw(Some("seq-2"), &[b'x'; 17]),
                    raw(None, b"{}"),
                    raw(Some("seq-4"), &[b'y'; 16]),
                ],
            )
            .await
            .unwrap();

        assert_eq!(result.failed_item_ids, vec!["seq-2", ""]);
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.objects()[0].metadata["record_count"],
            "1".to_string()
        );
        assert_eq!(metrics.total(MetricName::ProcessedRecords), 1.0);
        assert_eq!(metrics.total(MetricName::FailedRecords), 2.0);
        assert_eq!(metrics.total(MetricName::DiscardedRecords), 1.0);
    }

    #[test(tokio::test)]
    async fn test_generated_invocation_id() {
        let (processor, store, _) = processor(1);

        processor
            .process(None, vec![raw(Some("seq-1"), b"{}")])
            .await
            .unwrap();

        let key = store.objects()[0].key.clone();
        assert!(key.starts_with("logs/year="), "{key}");
        let batch_id = store.objects()[0].metadata["batch_id"].clone();
        let invocation_id = &batch_id[..36];
        assert!(Uuid::parse_str(invocation_id).is_ok(), "{batch_id}");
        assert!(key.ends_with(&format!("{batch_id}.jsonl.gz")));
    }

    #[test(tokio::test)]
    async fn test_process_event() {
        let (processor, store, _) = processor(5);
        let event = InvocationEvent::from_slice(
            br#"{"invocationId": "inv-7", "records": [
                {"sequenceId": "1", "partitionKey": "p", "arrivalTimestamp": 1.0, "payload": "e30="},
                {"sequenceId": "2", "partitionKey": "p", "arrivalTimestamp": 2.0, "payload": "aGk="}
            ]}"#,
        )
        .unwrap();

        let result = processor.process_event(event).await.unwrap();

        assert!(result.failed_item_ids.is_empty());
        assert_eq!(store.len(), 1);
        assert!(store.objects()[0].metadata["batch_id"].starts_with("inv-7-000001-"));
    }

    #[test(tokio::test(start_paused = true))]
    async fn test_write_exhausted_fails_the_invocation() {
        let mut settings = Settings::new("archive", "test");
        settings.batch_write_threshold = 1;
        let metrics = RecordingMetrics::default();
        let processor = Processor::new(&settings, UnavailableStore, metrics.clone());

        let err = processor
            .process(Some("inv".to_string()), vec![raw(Some("seq-1"), b"{}")])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), Some(ErrorKind::WriteExhausted));
        assert!(err.to_string().contains("ServiceUnavailable"), "{err}");
        assert_eq!(metrics.total(MetricName::ProcessingErrors), 1.0);
        assert_eq!(metrics.total(MetricName::ProcessedRecords), 0.0);
    }
}
