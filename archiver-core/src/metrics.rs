//! Metrics emitted by an invocation.
//!
//! The archiver only knows the [MetricsSink] seam; where the numbers go is up to the
//! implementation. Submission is fire-and-forget: a sink logs its own failures and never
//! fails the invocation.

use std::fmt;
use std::iter;
use std::sync::Arc;

use parking_lot::Mutex;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

use crate::{Error, Result};

/// Name of the dimension (or label) carrying the environment tag.
pub const ENVIRONMENT_DIMENSION: &str = "Environment";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    BatchWrites,
    RecordsPerBatch,
    CompressedSizeBytes,
    ProcessedRecords,
    FailedRecords,
    DiscardedRecords,
    ProcessingDuration,
    ProcessingErrors,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricUnit {
    Count,
    Bytes,
    Milliseconds,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::BatchWrites => "S3BatchWrites",
            MetricName::RecordsPerBatch => "RecordsPerBatch",
            MetricName::CompressedSizeBytes => "CompressedSizeBytes",
            MetricName::ProcessedRecords => "ProcessedRecords",
            MetricName::FailedRecords => "FailedRecords",
            MetricName::DiscardedRecords => "DiscardedRecords",
            MetricName::ProcessingDuration => "ProcessingDuration",
            MetricName::ProcessingErrors => "ProcessingErrors",
        }
    }

    pub fn unit(&self) -> MetricUnit {
        match self {
            MetricName::CompressedSizeBytes => MetricUnit::Bytes,
            MetricName::ProcessingDuration => MetricUnit::Milliseconds,
            _ => MetricUnit::Count,
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricDatum {
    pub name: MetricName,
    pub value: f64,
}

impl MetricDatum {
    pub fn new(name: MetricName, value: f64) -> Self {
        Self { name, value }
    }

    pub fn count(name: MetricName, value: usize) -> Self {
        Self::new(name, value as f64)
    }
}

/// Destination of the invocation metrics.
#[trait_variant::make(MetricsSink: Send)]
#[allow(dead_code)]
pub trait LocalMetricsSink {
    /// Submits a set of data points. Never fails; implementations log what they cannot send.
    async fn emit(&self, data: Vec<MetricDatum>);
}

type Labels = Vec<(String, String)>;

/// Exponential bucket distribution with range, lowest bucket `min` and highest bucket `max`.
/// The +Inf bucket is implicit.
fn exponential_buckets_range(min: f64, max: f64, length: u16) -> impl Iterator<Item = f64> {
    let length = length.max(2);
    let min = if min > 0.0 { min } else { 1.0 };
    let growth_factor = (max / min).powf(1.0 / (length as f64 - 1.0));

    iter::successors(Some(min), move |prev| Some(prev * growth_factor)).take(length.into())
}

struct PrometheusMetrics {
    registry: Mutex<Registry>,
    batch_writes: Family<Labels, Counter>,
    processed_records: Family<Labels, Counter>,
    failed_records: Family<Labels, Counter>,
    discarded_records: Family<Labels, Counter>,
    processing_errors: Family<Labels, Counter>,
    records_per_batch: Family<Labels, Histogram>,
    compressed_size_bytes: Family<Labels, Histogram>,
    processing_duration: Family<Labels, Histogram>,
}

/// [MetricsSink] backed by a prometheus registry. The registry prefix is the metrics
/// namespace in snake case and every series carries an `environment` label.
#[derive(Clone)]
pub struct PrometheusMetricsSink {
    metrics: Arc<PrometheusMetrics>,
    labels: Labels,
}

impl PrometheusMetricsSink {
    pub fn new(namespace: &str, environment: &str) -> Self {
        let metrics = PrometheusMetrics {
            registry: Mutex::new(Registry::with_prefix(snake_case(namespace))),
            batch_writes: Family::default(),
            processed_records: Family::default(),
            failed_records: Family::default(),
            discarded_records: Family::default(),
            processing_errors: Family::default(),
            records_per_batch: Family::<Labels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets_range(1.0, 1000.0, 10))
            }),
            compressed_size_bytes: Family::<Labels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets_range(256.0, 64.0 * 1024.0 * 1024.0, 12))
            }),
            processing_duration: Family::<Labels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets_range(1.0, 900_000.0, 12))
            }),
        };

        {
            let mut registry = metrics.registry.lock();
            registry.register(
                "s3_batch_writes",
                "Total number of archives written to the object store",
                metrics.batch_writes.clone(),
            );
            registry.register(
                "processed_records",
                "Total number of records durably archived",
                metrics.processed_records.clone(),
            );
            registry.register(
                "failed_records",
                "Total number of records reported back as failed",
                metrics.failed_records.clone(),
            );
            registry.register(
                "discarded_records",
                "Total number of buffered records dropped because a later record failed",
                metrics.discarded_records.clone(),
            );
            registry.register(
                "processing_errors",
                "Total number of invocations that failed",
                metrics.processing_errors.clone(),
            );
            registry.register(
                "records_per_batch",
                "A Histogram of the number of records in each archive",
                metrics.records_per_batch.clone(),
            );
            registry.register(
                "compressed_size_bytes",
                "A Histogram of the compressed size of each archive, in bytes",
                metrics.compressed_size_bytes.clone(),
            );
            registry.register(
                "processing_duration_milliseconds",
                "A Histogram of the time taken by an invocation, in milliseconds",
                metrics.processing_duration.clone(),
            );
        }

        Self {
            metrics: Arc::new(metrics),
            labels: vec![("environment".to_string(), environment.to_string())],
        }
    }

    /// Snapshot of the registry in the OpenMetrics text format.
    pub fn encode(&self) -> Result<String> {
        let registry = self.metrics.registry.lock();
        let mut buffer = String::new();
        encode(&mut buffer, &registry)
            .map_err(|e| Error::Metrics(format!("Encoding the metrics registry: {e}")))?;
        Ok(buffer)
    }

    fn record(&self, datum: MetricDatum) {
        let labels = &self.labels;
        let value = datum.value.max(0.0);
        match datum.name {
            MetricName::BatchWrites => {
                self.metrics.batch_writes.get_or_create(labels).inc_by(value as u64);
            }
            MetricName::ProcessedRecords => {
                self.metrics
                    .processed_records
                    .get_or_create(labels)
                    .inc_by(value as u64);
            }
            MetricName::FailedRecords => {
                self.metrics.failed_records.get_or_create(labels).inc_by(value as u64);
            }
            MetricName::DiscardedRecords => {
                self.metrics
                    .discarded_records
                    .get_or_create(labels)
                    .inc_by(value as u64);
            }
            MetricName::ProcessingErrors => {
                self.metrics
                    .processing_errors
                    .get_or_create(labels)
                    .inc_by(value as u64);
            }
            MetricName::RecordsPerBatch => {
                self.metrics.records_per_batch.get_or_create(labels).observe(value);
            }
            MetricName::CompressedSizeBytes => {
                self.metrics
                    .compressed_size_bytes
                    .get_or_create(labels)
                    .observe(value);
            }
            MetricName::ProcessingDuration => {
                self.metrics
                    .processing_duration
                    .get_or_create(labels)
                    .observe(value);
            }
        }
    }
}

impl MetricsSink for PrometheusMetricsSink {
    async fn emit(&self, data: Vec<MetricDatum>) {
        for datum in data {
            self.record(datum);
        }
    }
}

/// "LogAnalytics" -> "log_analytics"
fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else if c.is_ascii_alphanumeric() {
            out.push(c);
            prev_lower = true;
        } else {
            out.push('_');
            prev_lower = false;
        }
    }
    out
}
