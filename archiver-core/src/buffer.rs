//! The in-flight write batch of an invocation.
//!
//! Records are appended in arrival order. The buffer is emptied in exactly two ways: [drain]
//! hands its records to the writer, [discard] drops them after a record failed. A record that
//! was appended before a failure is therefore never flushed together with records that come
//! after it.
//!
//! [drain]: BatchBuffer::drain
//! [discard]: BatchBuffer::discard

use crate::message::DecodedRecord;

#[derive(Debug)]
pub struct BatchBuffer {
    records: Vec<DecodedRecord>,
    threshold: usize,
}

impl BatchBuffer {
    /// `threshold` is the number of records at which the buffer asks to be flushed.
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            records: Vec::with_capacity(threshold),
            threshold,
        }
    }

    pub fn append(&mut self, record: DecodedRecord) {
        self.records.push(record);
    }

    /// Whether the buffer must be flushed now. `last_record` tells whether the record just
    /// appended was the last one of the invocation.
    pub fn should_flush(&self, last_record: bool) -> bool {
        !self.records.is_empty() && (self.records.len() >= self.threshold || last_record)
    }

    /// Returns the buffered records in arrival order and leaves the buffer empty.
    pub fn drain(&mut self) -> Vec<DecodedRecord> {
        std::mem::replace(&mut self.records, Vec::with_capacity(self.threshold))
    }

    /// Drops the buffered records and returns their sequence ids.
    pub fn discard(&mut self) -> Vec<String> {
        self.records
            .drain(..)
            .map(|record| record.source_sequence_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
