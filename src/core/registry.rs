use crate::{error::VarstoreError, io::sample_reader::SampleReader, utils::util::Result};
use std::collections::HashSet;

/// How samples are laid out as columns in the destination array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOrder {
    /// Keep the order sources were supplied in.
    InputOrder,
    /// Sort by sample identifier (byte-wise).
    Canonical,
}

impl SampleOrder {
    pub fn from_use_samples_in_order(use_samples_in_order: bool) -> Self {
        if use_samples_in_order {
            SampleOrder::InputOrder
        } else {
            SampleOrder::Canonical
        }
    }
}

pub struct SampleEntry<R> {
    pub sample: String,
    reader: Option<R>,
}

impl<R> SampleEntry<R> {
    pub fn reader_mut(&mut self) -> Option<&mut R> {
        self.reader.as_mut()
    }

    pub fn is_released(&self) -> bool {
        self.reader.is_none()
    }
}

/// Sample identifier to reader mapping, fixed before any import starts.
///
/// Column `i` of the destination belongs to `entries()[i]`.
pub struct SampleRegistry<R> {
    entries: Vec<SampleEntry<R>>,
    order: SampleOrder,
}

impl<R> SampleRegistry<R> {
    pub fn build(sources: Vec<(String, R)>, order: SampleOrder) -> Result<Self> {
        if sources.is_empty() {
            return Err(crate::varstore_error!(
                "At least one sample is required to build a registry"
            ));
        }

        let mut observed = HashSet::with_capacity(sources.len());
        for (sample, _) in &sources {
            if !observed.insert(sample.as_str()) {
                return Err(VarstoreError::DuplicateSampleIdentifier {
                    sample: sample.clone(),
                });
            }
        }

        let mut entries = sources
            .into_iter()
            .map(|(sample, reader)| SampleEntry {
                sample,
                reader: Some(reader),
            })
            .collect::<Vec<_>>();
        if order == SampleOrder::Canonical {
            entries.sort_by(|a, b| a.sample.cmp(&b.sample));
        }

        log::debug!("Registered {} samples ({:?})", entries.len(), order);
        Ok(Self { entries, order })
    }

    pub fn order(&self) -> SampleOrder {
        self.order
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn samples(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.sample.as_str())
    }

    pub fn entries(&self) -> &[SampleEntry<R>] {
        &self.entries
    }

    pub fn entry_mut(&mut self, column: usize) -> Option<&mut SampleEntry<R>> {
        self.entries.get_mut(column)
    }

    pub fn column_of(&self, sample: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.sample == sample)
    }

    /// Drops the reader of `column`, closing its source.
    pub fn release(&mut self, column: usize) {
        if let Some(entry) = self.entries.get_mut(column) {
            if entry.reader.take().is_some() {
                log::trace!("Released reader for sample {}", entry.sample);
            }
        }
    }

    pub fn release_all(&mut self) {
        for column in 0..self.entries.len() {
            self.release(column);
        }
    }
}

impl<R: SampleReader> SampleRegistry<R> {
    /// Keys each reader by the single sample named in its header.
    pub fn from_readers(readers: Vec<R>, order: SampleOrder) -> Result<Self> {
        let sources = readers
            .into_iter()
            .map(|reader| {
                let sample = reader
                    .header()
                    .single_sample()
                    .map(str::to_owned)
                    .ok_or_else(|| {
                        crate::varstore_error!(
                            "Source {} does not name exactly one sample",
                            reader.source_name()
                        )
                    })?;
                Ok((sample, reader))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::build(sources, order)
    }
}
