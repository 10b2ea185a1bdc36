pub mod file_store;
pub mod memory;

use crate::{
    core::{header_merge::MergedHeader, interval::Interval, record::VariantRecord},
    utils::util::Result,
};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};

/// Where an import job writes: one array inside a workspace, scoped to an interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayTarget {
    pub workspace: PathBuf,
    pub array: String,
    pub interval: Interval,
}

impl ArrayTarget {
    pub fn new(workspace: impl Into<PathBuf>, array: impl Into<String>, interval: Interval) -> Self {
        Self {
            workspace: workspace.into(),
            array: array.into(),
            interval,
        }
    }
}

impl fmt::Display for ArrayTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} [{}]",
            self.workspace.display(),
            self.array,
            self.interval
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    /// Column assigned by the sample registry.
    pub column: usize,
    pub sample: String,
    pub record: VariantRecord,
}

/// One commit unit. A store persists a batch entirely or not at all.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub sequence: u64,
    pub interval: Interval,
    pub entries: Vec<BatchEntry>,
    pub bytes: u64,
}

impl Batch {
    pub fn samples(&self) -> Vec<String> {
        let mut samples = Vec::new();
        for entry in &self.entries {
            if !samples.contains(&entry.sample) {
                samples.push(entry.sample.clone());
            }
        }
        samples
    }
}

pub trait ArrayStore {
    type Handle: ArrayHandle;

    /// Opens `target`, creating it if needed.
    ///
    /// Opening must not alter committed content; `header` and `samples` are
    /// persisted together with the first batch written through the handle.
    /// The handle holds exclusive access to the array until dropped.
    fn create_or_open(
        &self,
        target: &ArrayTarget,
        header: &MergedHeader,
        samples: &[String],
    ) -> Result<Self::Handle>;
}

pub trait ArrayHandle {
    /// Whether committed data for `sample` overlaps `interval`.
    fn exists(&self, sample: &str, interval: &Interval) -> Result<bool>;

    fn write_batch(&mut self, batch: &Batch) -> Result<()>;
}
