use crate::{
    core::{header::SampleHeader, record::VariantRecord},
    utils::util::Result,
};
use std::collections::VecDeque;

/// A forward-only stream of one sample's records.
///
/// Records come out in the order the source stores them; readers never
/// re-sort. Any handle on the underlying source is released when the reader
/// is dropped.
pub trait SampleReader {
    fn header(&self) -> &SampleHeader;

    /// Returns `Ok(None)` once the source is exhausted.
    fn next_record(&mut self) -> Result<Option<VariantRecord>>;

    /// Human-readable origin used in log and error messages.
    fn source_name(&self) -> String {
        self.header()
            .single_sample()
            .map_or_else(|| "<unnamed>".to_string(), str::to_owned)
    }
}

impl<R: SampleReader + ?Sized> SampleReader for Box<R> {
    fn header(&self) -> &SampleHeader {
        (**self).header()
    }

    fn next_record(&mut self) -> Result<Option<VariantRecord>> {
        (**self).next_record()
    }

    fn source_name(&self) -> String {
        (**self).source_name()
    }
}

/// Serves records from memory.
#[derive(Debug, Clone)]
pub struct MemoryReader {
    header: SampleHeader,
    records: VecDeque<VariantRecord>,
}

impl MemoryReader {
    pub fn new(header: SampleHeader, records: Vec<VariantRecord>) -> Self {
        Self {
            header,
            records: records.into(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.records.len()
    }
}

impl SampleReader for MemoryReader {
    fn header(&self) -> &SampleHeader {
        &self.header
    }

    fn next_record(&mut self) -> Result<Option<VariantRecord>> {
        Ok(self.records.pop_front())
    }
}
