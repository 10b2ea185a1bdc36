use super::{ArrayHandle, ArrayStore, ArrayTarget, Batch};
use crate::{
    constants::{
        FRAGMENT_PREFIX, FRAGMENT_SUFFIX, LOCK_FILE_NAME, MANIFEST_FILE_NAME, MANIFEST_VERSION,
    },
    core::{header_merge::MergedHeader, interval::Interval, record::VariantRecord},
    error::VarstoreError,
    utils::util::Result,
};
use flate2::{read::MultiGzDecoder, write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, BufWriter, ErrorKind, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentMeta {
    pub file: String,
    pub interval: Interval,
    pub samples: Vec<String>,
    pub records: u64,
    pub created: String,
}

/// The array's table of contents. A fragment is committed once it is listed here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayManifest {
    pub version: u32,
    pub array: String,
    pub header: Vec<String>,
    pub columns: Vec<String>,
    pub fragments: Vec<FragmentMeta>,
}

impl ArrayManifest {
    fn new(array: &str) -> Self {
        Self {
            version: MANIFEST_VERSION,
            array: array.to_string(),
            header: Vec::new(),
            columns: Vec::new(),
            fragments: Vec::new(),
        }
    }

    pub fn column_of(&self, sample: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == sample)
    }
}

/// One line of a fragment file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub column: usize,
    pub sample: String,
    pub record: VariantRecord,
}

pub fn array_dir(workspace: &Path, array: &str) -> PathBuf {
    workspace.join(array)
}

pub fn load_manifest(dir: &Path) -> Result<Option<ArrayManifest>> {
    let path = dir.join(MANIFEST_FILE_NAME);
    let file = match File::open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let manifest: ArrayManifest = serde_json::from_reader(BufReader::new(file))?;
    if manifest.version != MANIFEST_VERSION {
        return Err(crate::varstore_error!(
            "Unsupported array manifest version {} in {}",
            manifest.version,
            path.display()
        ));
    }
    Ok(Some(manifest))
}

pub fn read_fragment(path: &Path) -> Result<Vec<StoredEntry>> {
    let reader = BufReader::new(MultiGzDecoder::new(File::open(path)?));
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(&line)?);
    }
    Ok(entries)
}

/// All committed entries of an array, in commit order.
pub fn read_array(dir: &Path) -> Result<Vec<StoredEntry>> {
    let Some(manifest) = load_manifest(dir)? else {
        return Ok(Vec::new());
    };
    let mut entries = Vec::new();
    for fragment in &manifest.fragments {
        entries.extend(read_fragment(&dir.join(&fragment.file))?);
    }
    Ok(entries)
}

/// Stores each array as a directory of gzip JSON-lines fragments plus a manifest.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileStore;

impl FileStore {
    pub fn new() -> Self {
        Self
    }
}

impl ArrayStore for FileStore {
    type Handle = FileArray;

    fn create_or_open(
        &self,
        target: &ArrayTarget,
        header: &MergedHeader,
        samples: &[String],
    ) -> Result<FileArray> {
        FileArray::open(target, header, samples)
    }
}

/// Exclusive lock on an array directory, removed on drop.
struct ArrayLock {
    path: PathBuf,
}

impl ArrayLock {
    fn acquire(dir: &Path, array: &str) -> Result<Self> {
        let path = dir.join(LOCK_FILE_NAME);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(VarstoreError::store_write(
                    array,
                    format!(
                        "array is locked by another import (remove {} if stale)",
                        path.display()
                    ),
                ));
            }
            Err(e) => return Err(VarstoreError::store_write(array, e)),
        };
        writeln!(file, "{}", std::process::id())
            .map_err(|e| VarstoreError::store_write(array, e))?;
        Ok(Self { path })
    }
}

impl Drop for ArrayLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("Failed to remove lock {}: {e}", self.path.display());
        }
    }
}

pub struct FileArray {
    dir: PathBuf,
    array: String,
    manifest: ArrayManifest,
    header_lines: Vec<String>,
    samples: Vec<String>,
    _lock: ArrayLock,
}

impl FileArray {
    pub fn open(target: &ArrayTarget, header: &MergedHeader, samples: &[String]) -> Result<Self> {
        let dir = array_dir(&target.workspace, &target.array);
        fs::create_dir_all(&dir).map_err(|e| {
            VarstoreError::store_write(
                &target.array,
                format!("cannot create {}: {e}", dir.display()),
            )
        })?;
        let lock = ArrayLock::acquire(&dir, &target.array)?;
        let manifest = match load_manifest(&dir)? {
            Some(manifest) => {
                log::debug!(
                    "Opened array {} with {} columns and {} fragments",
                    target.array,
                    manifest.columns.len(),
                    manifest.fragments.len()
                );
                manifest
            }
            None => {
                log::debug!("Creating array {} in {}", target.array, dir.display());
                ArrayManifest::new(&target.array)
            }
        };

        Ok(Self {
            dir,
            array: target.array.clone(),
            manifest,
            header_lines: header.to_vcf_lines(),
            samples: samples.to_vec(),
            _lock: lock,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest(&self) -> &ArrayManifest {
        &self.manifest
    }

    fn write_fragment(&self, file_name: &str, batch: &Batch, manifest: &ArrayManifest) -> Result<()> {
        let temp = NamedTempFile::new_in(&self.dir)?;
        {
            let mut encoder = GzEncoder::new(BufWriter::new(temp.as_file()), Compression::default());
            for entry in &batch.entries {
                let column = manifest.column_of(&entry.sample).ok_or_else(|| {
                    crate::varstore_error!("Sample {} has no column in array", entry.sample)
                })?;
                let stored = StoredEntry {
                    column,
                    sample: entry.sample.clone(),
                    record: entry.record.clone(),
                };
                serde_json::to_writer(&mut encoder, &stored)?;
                encoder.write_all(b"\n")?;
            }
            encoder.finish()?.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(self.dir.join(file_name))
            .map_err(|e| VarstoreError::Io(e.error))?;
        Ok(())
    }

    fn write_manifest(&self, manifest: &ArrayManifest) -> Result<()> {
        let temp = NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, manifest)?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(self.dir.join(MANIFEST_FILE_NAME))
            .map_err(|e| VarstoreError::Io(e.error))?;
        Ok(())
    }

    fn commit(&mut self, batch: &Batch) -> Result<()> {
        let mut next = self.manifest.clone();
        next.header = self.header_lines.clone();
        for sample in &self.samples {
            if next.column_of(sample).is_none() {
                next.columns.push(sample.clone());
            }
        }

        let file_name = format!(
            "{FRAGMENT_PREFIX}{:06}{FRAGMENT_SUFFIX}",
            next.fragments.len()
        );
        self.write_fragment(&file_name, batch, &next)?;
        next.fragments.push(FragmentMeta {
            file: file_name,
            interval: batch.interval.clone(),
            samples: batch.samples(),
            records: batch.entries.len() as u64,
            created: chrono::Utc::now().to_rfc3339(),
        });
        self.write_manifest(&next)?;
        self.manifest = next;
        Ok(())
    }
}

impl ArrayHandle for FileArray {
    fn exists(&self, sample: &str, interval: &Interval) -> Result<bool> {
        Ok(self.manifest.fragments.iter().any(|fragment| {
            fragment.interval.overlaps_interval(interval)
                && fragment.samples.iter().any(|s| s == sample)
        }))
    }

    fn write_batch(&mut self, batch: &Batch) -> Result<()> {
        let array = self.array.clone();
        self.commit(batch)
            .map_err(|e| VarstoreError::store_write(array, e))
    }
}
