pub mod buffer;
pub mod config;
pub mod progress;


use crate::{
    core::{
        header_merge::MergedHeader, interval::Interval, record::VariantRecord,
        registry::SampleRegistry,
    },
    error::VarstoreError,
    io::sample_reader::SampleReader,
    store::{ArrayHandle, ArrayStore, ArrayTarget},
    utils::util::Result,
};
use buffer::BatchBuffer;
use config::{BatchLimits, ImportConfig};
use progress::ImportProgress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    Idle,
    Validating,
    Writing,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub sequence: u64,
    pub records: usize,
    pub samples: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub interval: Interval,
    pub batches: u64,
    pub records: u64,
    pub bytes: u64,
    /// Records imported per sample, in column order.
    pub per_sample: Vec<(String, u64)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportStatus {
    Flushed(BatchReport),
    Done(ImportSummary),
}

/// Fully resolves the job interval against the merged header's contigs.
///
/// Headers that declare no contigs accept any interval. A whole-contig interval
/// is narrowed to the declared length when one is known.
pub fn resolve_interval(header: &MergedHeader, interval: &Interval) -> Result<Interval> {
    if header.contigs().is_empty() {
        return Ok(interval.clone());
    }
    let Some(contig) = header.contig(interval.contig()) else {
        return Err(VarstoreError::invalid_interval(
            interval,
            format!(
                "contig {} is not declared in the merged header",
                interval.contig()
            ),
        ));
    };
    match contig.length {
        Some(length) if interval.is_whole_contig() => Interval::new(interval.contig(), 1, length),
        Some(length) if interval.end() > length => Err(VarstoreError::invalid_interval(
            interval,
            format!("end exceeds contig length {length}"),
        )),
        _ => Ok(interval.clone()),
    }
}

/// Moves every registered sample's records inside one interval into one array.
///
/// Each call to [`ImportJob::import_batch`] flushes at most one batch, so a job
/// can be driven incrementally or run to completion with [`ImportJob::run`].
pub struct ImportJob<R, S: ArrayStore> {
    registry: SampleRegistry<R>,
    header: MergedHeader,
    target: ArrayTarget,
    fail_if_updating: bool,
    store: S,
    handle: Option<S::Handle>,
    buffer: BatchBuffer,
    progress: ImportProgress,
    state: ImportState,
}

impl<R: SampleReader, S: ArrayStore> ImportJob<R, S> {
    pub fn new(
        registry: SampleRegistry<R>,
        header: MergedHeader,
        config: &ImportConfig,
        store: S,
    ) -> Self {
        Self::with_target(
            registry,
            header,
            config.target.clone(),
            config.limits,
            config.fail_if_updating,
            store,
        )
    }

    pub fn with_target(
        registry: SampleRegistry<R>,
        header: MergedHeader,
        target: ArrayTarget,
        limits: BatchLimits,
        fail_if_updating: bool,
        store: S,
    ) -> Self {
        let columns = registry.len();
        Self {
            registry,
            header,
            target,
            fail_if_updating,
            store,
            handle: None,
            buffer: BatchBuffer::new(columns, limits),
            progress: ImportProgress::new(columns),
            state: ImportState::Idle,
        }
    }

    pub fn state(&self) -> ImportState {
        self.state
    }

    pub fn progress(&self) -> &ImportProgress {
        &self.progress
    }

    pub fn registry(&self) -> &SampleRegistry<R> {
        &self.registry
    }

    pub fn target(&self) -> &ArrayTarget {
        &self.target
    }

    pub fn header(&self) -> &MergedHeader {
        &self.header
    }

    /// Advances the job until one batch is flushed or every source is exhausted.
    pub fn import_batch(&mut self) -> Result<ImportStatus> {
        match self.state {
            ImportState::Failed => return Err(VarstoreError::JobFailed),
            ImportState::Done => return Ok(ImportStatus::Done(self.summary())),
            ImportState::Idle => {
                self.state = ImportState::Validating;
                if let Err(e) = self.prepare() {
                    self.fail();
                    return Err(e);
                }
                self.state = ImportState::Writing;
            }
            ImportState::Validating | ImportState::Writing => {}
        }

        match self.write_next() {
            Ok(ImportStatus::Done(summary)) => {
                self.finish();
                Ok(ImportStatus::Done(summary))
            }
            Ok(status) => Ok(status),
            Err(e) => {
                self.fail();
                Err(e)
            }
        }
    }

    pub fn batches(&mut self) -> Batches<'_, R, S> {
        Batches {
            job: self,
            finished: false,
        }
    }

    pub fn run(&mut self) -> Result<ImportSummary> {
        loop {
            if let ImportStatus::Done(summary) = self.import_batch()? {
                return Ok(summary);
            }
        }
    }

    pub fn summary(&self) -> ImportSummary {
        ImportSummary {
            interval: self.target.interval.clone(),
            batches: self.progress.batches_flushed(),
            records: self.progress.records_written(),
            bytes: self.progress.bytes_written(),
            per_sample: self
                .registry
                .samples()
                .enumerate()
                .map(|(column, sample)| (sample.to_string(), self.progress.consumed(column)))
                .collect(),
        }
    }

    fn prepare(&mut self) -> Result<()> {
        self.target.interval = resolve_interval(&self.header, &self.target.interval)?;

        let samples = self
            .registry
            .samples()
            .map(str::to_owned)
            .collect::<Vec<_>>();
        let handle = self
            .store
            .create_or_open(&self.target, &self.header, &samples)?;

        if self.fail_if_updating {
            for sample in &samples {
                if handle.exists(sample, &self.target.interval)? {
                    return Err(VarstoreError::OverwriteConflict {
                        sample: sample.clone(),
                        interval: self.target.interval.to_string(),
                    });
                }
            }
        }

        log::debug!(
            "Importing {} samples into {}",
            samples.len(),
            self.target
        );
        self.handle = Some(handle);
        Ok(())
    }

    fn write_next(&mut self) -> Result<ImportStatus> {
        loop {
            if self.progress.all_exhausted() {
                if self.buffer.is_empty() {
                    return Ok(ImportStatus::Done(self.summary()));
                }
                return self.flush().map(ImportStatus::Flushed);
            }

            let column = self.progress.advance();
            if self.progress.is_exhausted(column) {
                continue;
            }

            match self.pull(column)? {
                Some(record) => {
                    self.progress.record_consumed(column);
                    let sample = self
                        .registry
                        .entries()
                        .get(column)
                        .map(|entry| entry.sample.as_str())
                        .unwrap_or_default();
                    if self.buffer.push(column, sample, record) {
                        return self.flush().map(ImportStatus::Flushed);
                    }
                }
                None => {
                    self.progress.mark_exhausted(column);
                    self.registry.release(column);
                }
            }
        }
    }

    /// Next record of `column` overlapping the interval, or `None` once the
    /// source has nothing more to contribute.
    fn pull(&mut self, column: usize) -> Result<Option<VariantRecord>> {
        let interval = &self.target.interval;
        let Some(entry) = self.registry.entry_mut(column) else {
            return Ok(None);
        };
        let sample = entry.sample.clone();
        let Some(reader) = entry.reader_mut() else {
            return Ok(None);
        };

        loop {
            match reader.next_record() {
                Ok(Some(record)) if record.overlaps(interval) => return Ok(Some(record)),
                Ok(Some(record)) if record.is_past(interval) => return Ok(None),
                Ok(Some(_)) => continue,
                Ok(None) => return Ok(None),
                Err(e) => {
                    return Err(VarstoreError::PartialSourceExhaustion {
                        sample,
                        records_read: self.progress.consumed(column),
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    fn flush(&mut self) -> Result<BatchReport> {
        let batch = self
            .buffer
            .take(self.progress.batches_flushed(), &self.target.interval);
        let array = &self.target.array;
        let handle = self
            .handle
            .as_mut()
            .ok_or_else(|| VarstoreError::store_write(array, "array is not open"))?;
        handle.write_batch(&batch).map_err(|e| match e {
            VarstoreError::StoreWriteError { .. } => e,
            other => VarstoreError::store_write(array, other),
        })?;

        self.progress.record_flush(&batch);
        let report = BatchReport {
            sequence: batch.sequence,
            records: batch.entries.len(),
            samples: batch.samples().len(),
            bytes: batch.bytes,
        };
        log::trace!(
            "Flushed batch {} to {}: {} records from {} samples",
            report.sequence,
            array,
            report.records,
            report.samples
        );
        Ok(report)
    }

    fn finish(&mut self) {
        self.state = ImportState::Done;
        self.registry.release_all();
        self.handle = None;
    }

    fn fail(&mut self) {
        self.state = ImportState::Failed;
        self.registry.release_all();
        self.handle = None;
    }
}

/// Iterator over the batches of a job; ends after completion or the first error.
pub struct Batches<'a, R, S: ArrayStore> {
    job: &'a mut ImportJob<R, S>,
    finished: bool,
}

impl<R: SampleReader, S: ArrayStore> Iterator for Batches<'_, R, S> {
    type Item = Result<BatchReport>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.job.import_batch() {
            Ok(ImportStatus::Flushed(report)) => Some(Ok(report)),
            Ok(ImportStatus::Done(_)) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
