use super::config::BatchLimits;
use crate::{
    core::{interval::Interval, record::VariantRecord},
    store::{Batch, BatchEntry},
};

/// Records pulled since the last flush, with per-column byte accounting.
#[derive(Debug)]
pub struct BatchBuffer {
    limits: BatchLimits,
    entries: Vec<BatchEntry>,
    column_bytes: Vec<u64>,
    total_bytes: u64,
}

impl BatchBuffer {
    pub fn new(columns: usize, limits: BatchLimits) -> Self {
        Self {
            limits,
            entries: Vec::new(),
            column_bytes: vec![0; columns],
            total_bytes: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Buffers `record` and reports whether a flush threshold has been reached.
    pub fn push(&mut self, column: usize, sample: &str, record: VariantRecord) -> bool {
        let size = record.buffered_size();
        if column >= self.column_bytes.len() {
            self.column_bytes.resize(column + 1, 0);
        }
        self.column_bytes[column] += size;
        self.total_bytes += size;
        self.entries.push(BatchEntry {
            column,
            sample: sample.to_string(),
            record,
        });
        self.column_bytes[column] >= self.limits.size_per_column_partition
            || self.total_bytes >= self.limits.segment_size
    }

    pub fn take(&mut self, sequence: u64, interval: &Interval) -> Batch {
        let batch = Batch {
            sequence,
            interval: interval.clone(),
            entries: std::mem::take(&mut self.entries),
            bytes: self.total_bytes,
        };
        self.column_bytes.iter_mut().for_each(|bytes| *bytes = 0);
        self.total_bytes = 0;
        batch
    }
}
