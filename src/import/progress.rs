use crate::store::Batch;

/// Where an import job stands: per-sample counts plus the round-robin cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportProgress {
    consumed: Vec<u64>,
    exhausted: Vec<bool>,
    next_column: usize,
    batches_flushed: u64,
    records_written: u64,
    bytes_written: u64,
}

impl ImportProgress {
    pub fn new(columns: usize) -> Self {
        Self {
            consumed: vec![0; columns],
            exhausted: vec![false; columns],
            ..Default::default()
        }
    }

    pub fn consumed(&self, column: usize) -> u64 {
        self.consumed.get(column).copied().unwrap_or(0)
    }

    pub fn record_consumed(&mut self, column: usize) {
        if let Some(count) = self.consumed.get_mut(column) {
            *count += 1;
        }
    }

    pub fn is_exhausted(&self, column: usize) -> bool {
        self.exhausted.get(column).copied().unwrap_or(true)
    }

    pub fn mark_exhausted(&mut self, column: usize) {
        if let Some(flag) = self.exhausted.get_mut(column) {
            *flag = true;
        }
    }

    pub fn all_exhausted(&self) -> bool {
        self.exhausted.iter().all(|&flag| flag)
    }

    /// Returns the column to pull from next and moves the cursor past it.
    pub fn advance(&mut self) -> usize {
        let column = self.next_column;
        if !self.exhausted.is_empty() {
            self.next_column = (self.next_column + 1) % self.exhausted.len();
        }
        column
    }

    pub fn record_flush(&mut self, batch: &Batch) {
        self.batches_flushed += 1;
        self.records_written += batch.entries.len() as u64;
        self.bytes_written += batch.bytes;
    }

    pub fn batches_flushed(&self) -> u64 {
        self.batches_flushed
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}
