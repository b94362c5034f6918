//! Archives batches of stream records as gzip-compressed NDJSON objects and reports which
//! records could not be archived, so the stream only redelivers those.
//!
//! One invocation, driven by the [Processor](processor::Processor):
//! - check the size of each record, decode it and stamp it with its provenance
//! - buffer the records and flush them to the [ObjectStore](store::ObjectStore) in batches
//! - drop the in-flight batch whenever a record fails, and report the failed record
//! - emit the invocation metrics to the [MetricsSink](metrics::MetricsSink)

pub use self::error::{Error, Result};

mod error;
pub use crate::error::{ErrorKind, RecordError};

pub mod buffer;
pub mod config;
pub mod decode;
pub mod enrich;
pub mod event;
pub mod message;
pub mod metrics;
pub mod processor;
pub mod retry;
pub mod store;
pub mod tracker;
pub mod writer;
