//! Per-record failure bookkeeping and the partial-failure report returned to the stream.

use serde::Serialize;
use tracing::warn;

use crate::error::{ErrorKind, RecordError};

/// A record that could not be processed. It only lives long enough to build the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub sequence_id: String,
    pub error_message: String,
    pub error_kind: ErrorKind,
}

/// What the invocation hands back to the stream runtime. The stream redelivers exactly the
/// listed records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    pub failed_item_ids: Vec<String>,
}

/// Collects failures in record order.
#[derive(Debug, Default)]
pub struct FailureTracker {
    failures: Vec<FailureRecord>,
}

impl FailureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a failure for `sequence_id`. Never fails.
    ///
    /// A record that arrived without a sequence id is reported as `""`, the only id there is.
    /// The stream runtime cannot redeliver that record alone, so a host receiving an empty id
    /// should treat it as a failure of the whole batch.
    pub fn record(&mut self, sequence_id: &str, error: &RecordError) {
        warn!(
            sequence_id,
            kind = %error.kind(),
            %error,
            "Record failed"
        );
        self.failures.push(FailureRecord {
            sequence_id: sequence_id.to_string(),
            error_message: error.to_string(),
            error_kind: error.kind(),
        });
    }

    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn into_reporter(self) -> ResultReporter {
        ResultReporter {
            failures: self.failures,
        }
    }
}

/// Turns the collected failures into an [InvocationResult].
#[derive(Debug)]
pub struct ResultReporter {
    failures: Vec<FailureRecord>,
}

impl ResultReporter {
    pub fn build(self) -> InvocationResult {
        InvocationResult {
            failed_item_ids: self
                .failures
                .into_iter()
                .map(|failure| failure.sequence_id)
                .collect(),
        }
    }
}
