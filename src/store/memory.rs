use super::{ArrayHandle, ArrayStore, ArrayTarget, Batch};
use crate::{
    core::{header_merge::MergedHeader, interval::Interval},
    error::VarstoreError,
    utils::util::Result,
};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

type ArrayKey = (PathBuf, String);

#[derive(Debug, Clone, Default)]
pub struct MemoryArray {
    pub header: Vec<String>,
    pub columns: Vec<String>,
    pub batches: Vec<Batch>,
    locked: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    arrays: HashMap<ArrayKey, MemoryArray>,
    writes_before_failure: Option<usize>,
}

/// Array store kept in process memory. Clones share the same arrays.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

fn lock_state<'a>(state: &'a Mutex<MemoryState>, array: &str) -> Result<MutexGuard<'a, MemoryState>> {
    state
        .lock()
        .map_err(|_| VarstoreError::store_write(array, "memory store lock poisoned"))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lets `writes` more batches succeed, then fails every later write.
    pub fn fail_after(&self, writes: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.writes_before_failure = Some(writes);
        }
    }

    /// Snapshot of the committed content of `array` in `workspace`.
    pub fn array(&self, workspace: impl AsRef<Path>, array: &str) -> Option<MemoryArray> {
        let key = (workspace.as_ref().to_path_buf(), array.to_string());
        self.state
            .lock()
            .ok()
            .and_then(|state| state.arrays.get(&key).cloned())
    }
}

impl ArrayStore for MemoryStore {
    type Handle = MemoryArrayHandle;

    fn create_or_open(
        &self,
        target: &ArrayTarget,
        header: &MergedHeader,
        samples: &[String],
    ) -> Result<MemoryArrayHandle> {
        let key = (target.workspace.clone(), target.array.clone());
        let mut state = lock_state(&self.state, &target.array)?;
        let array = state.arrays.entry(key.clone()).or_default();
        if array.locked {
            return Err(VarstoreError::store_write(
                &target.array,
                "array is locked by another import",
            ));
        }
        array.locked = true;
        Ok(MemoryArrayHandle {
            state: Arc::clone(&self.state),
            key,
            header: header.to_vcf_lines(),
            samples: samples.to_vec(),
        })
    }
}

pub struct MemoryArrayHandle {
    state: Arc<Mutex<MemoryState>>,
    key: ArrayKey,
    header: Vec<String>,
    samples: Vec<String>,
}

impl ArrayHandle for MemoryArrayHandle {
    fn exists(&self, sample: &str, interval: &Interval) -> Result<bool> {
        let state = lock_state(&self.state, &self.key.1)?;
        Ok(state.arrays.get(&self.key).is_some_and(|array| {
            array.batches.iter().any(|batch| {
                batch.interval.overlaps_interval(interval)
                    && batch.entries.iter().any(|entry| entry.sample == sample)
            })
        }))
    }

    fn write_batch(&mut self, batch: &Batch) -> Result<()> {
        let name = self.key.1.as_str();
        let mut state = lock_state(&self.state, name)?;
        match state.writes_before_failure {
            Some(0) => return Err(VarstoreError::store_write(name, "injected write failure")),
            Some(ref mut remaining) => *remaining -= 1,
            None => {}
        }

        let array = state.arrays.entry(self.key.clone()).or_default();
        let mut columns = array.columns.clone();
        for sample in &self.samples {
            if !columns.contains(sample) {
                columns.push(sample.clone());
            }
        }
        let mut stored = batch.clone();
        for entry in &mut stored.entries {
            entry.column = columns
                .iter()
                .position(|column| *column == entry.sample)
                .ok_or_else(|| {
                    VarstoreError::store_write(
                        name,
                        format!("sample {} has no column in array", entry.sample),
                    )
                })?;
        }

        array.header = self.header.clone();
        array.columns = columns;
        array.batches.push(stored);
        Ok(())
    }
}

impl Drop for MemoryArrayHandle {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(array) = state.arrays.get_mut(&self.key) {
                array.locked = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{header::SampleHeader, header_merge::HeaderMerger, record::VariantRecord},
        store::BatchEntry,
    };

    fn target() -> ArrayTarget {
        ArrayTarget::new("/ws", "arr", Interval::new("chr1", 1, 100).unwrap())
    }

    fn header() -> MergedHeader {
        HeaderMerger::new(false)
            .merge(&[SampleHeader::new("A")])
            .unwrap()
    }

    fn batch(sequence: u64) -> Batch {
        Batch {
            sequence,
            interval: target().interval,
            entries: vec![BatchEntry {
                column: 0,
                sample: "A".to_string(),
                record: VariantRecord::new("chr1", 10, "A", &["G"]),
            }],
            bytes: 0,
        }
    }

    #[test]
    fn open_registers_nothing_until_first_write() {
        let store = MemoryStore::new();
        let mut handle = store
            .create_or_open(&target(), &header(), &["A".to_string()])
            .unwrap();
        assert!(store.array("/ws", "arr").unwrap().columns.is_empty());
        handle.write_batch(&batch(0)).unwrap();
        let array = store.array("/ws", "arr").unwrap();
        assert_eq!(array.columns, vec!["A".to_string()]);
        assert!(handle.exists("A", &target().interval).unwrap());
        assert!(!handle.exists("B", &target().interval).unwrap());
    }

    #[test]
    fn injected_failure_keeps_earlier_batches() {
        let store = MemoryStore::new();
        store.fail_after(1);
        let mut handle = store
            .create_or_open(&target(), &header(), &["A".to_string()])
            .unwrap();
        handle.write_batch(&batch(0)).unwrap();
        let err = handle.write_batch(&batch(1)).unwrap_err();
        assert!(matches!(err, VarstoreError::StoreWriteError { .. }));
        assert_eq!(store.array("/ws", "arr").unwrap().batches.len(), 1);
    }

    #[test]
    fn arrays_are_scoped_by_workspace() {
        let store = MemoryStore::new();
        let mut handle = store
            .create_or_open(&target(), &header(), &["A".to_string()])
            .unwrap();
        handle.write_batch(&batch(0)).unwrap();

        let other = ArrayTarget::new("/other", "arr", target().interval);
        let other_handle = store
            .create_or_open(&other, &header(), &["A".to_string()])
            .unwrap();
        assert!(!other_handle.exists("A", &target().interval).unwrap());
        assert!(store.array("/other", "arr").unwrap().batches.is_empty());
        assert_eq!(store.array("/ws", "arr").unwrap().batches.len(), 1);
    }

    #[test]
    fn reopened_array_keeps_its_column_numbers() {
        let store = MemoryStore::new();
        let mut first = store
            .create_or_open(&target(), &header(), &["A".to_string()])
            .unwrap();
        first.write_batch(&batch(0)).unwrap();
        drop(first);

        let samples = ["B".to_string(), "A".to_string()];
        let mut second = store.create_or_open(&target(), &header(), &samples).unwrap();
        let mut update = batch(1);
        update.entries = vec![
            BatchEntry {
                column: 0,
                sample: "B".to_string(),
                record: VariantRecord::new("chr1", 20, "C", &["T"]),
            },
            BatchEntry {
                column: 1,
                sample: "A".to_string(),
                record: VariantRecord::new("chr1", 30, "G", &["A"]),
            },
        ];
        second.write_batch(&update).unwrap();

        let array = store.array("/ws", "arr").unwrap();
        assert_eq!(array.columns, vec!["A".to_string(), "B".to_string()]);
        let columns = array.batches[1]
            .entries
            .iter()
            .map(|entry| (entry.sample.as_str(), entry.column))
            .collect::<Vec<_>>();
        assert_eq!(columns, vec![("B", 1), ("A", 0)]);
    }

    #[test]
    fn concurrent_open_is_rejected() {
        let store = MemoryStore::new();
        let first = store
            .create_or_open(&target(), &header(), &["A".to_string()])
            .unwrap();
        assert!(store
            .create_or_open(&target(), &header(), &["A".to_string()])
            .is_err());
        drop(first);
        assert!(store
            .create_or_open(&target(), &header(), &["A".to_string()])
            .is_ok());
    }
}
