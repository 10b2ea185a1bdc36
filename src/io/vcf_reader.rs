use crate::{
    core::{
        header::{FieldKind, SampleHeader, ValueType},
        interval::Interval,
        record::VariantRecord,
    },
    error::VarstoreError,
    io::sample_reader::SampleReader,
    utils::util::{is_missing_float, is_missing_integer, Result},
};
use rust_htslib::{
    bcf::{self, Read},
    errors::Error as HtsError,
};
use std::{
    ffi::OsString,
    fmt::Display,
    path::{Path, PathBuf},
};

fn add_extension(path: &Path, ext: &str) -> PathBuf {
    let mut out = path.to_path_buf();
    let new_ext: OsString = match path.extension() {
        Some(old) => {
            let mut s = old.to_os_string();
            s.push(".");
            s.push(ext);
            s
        }
        None => OsString::from(ext),
    };
    out.set_extension(new_ext);
    out
}

pub fn is_indexed(file: &Path) -> bool {
    add_extension(file, "csi").exists() || add_extension(file, "tbi").exists()
}

enum HtsSource {
    Indexed(bcf::IndexedReader),
    Stream(bcf::Reader),
}

/// A single-sample VCF/BCF opened through htslib.
///
/// Indexed inputs are region-fetched to the requested interval; anything else is
/// streamed from the start and filtered. The htslib handle is closed on drop.
pub struct VcfSampleReader {
    path: PathBuf,
    source: HtsSource,
    current_record: bcf::Record,
    header: SampleHeader,
    region: Option<Interval>,
    info_tags: Vec<(Vec<u8>, ValueType)>,
    format_tags: Vec<(Vec<u8>, ValueType)>,
    exhausted: bool,
}

fn unreadable(path: &Path, message: impl Display) -> VarstoreError {
    VarstoreError::SourceUnreadable {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

fn typed_tags(header: &SampleHeader, kind: FieldKind) -> Vec<(Vec<u8>, ValueType)> {
    header
        .fields
        .iter()
        .filter(|field| field.kind == kind)
        .filter_map(|field| {
            field
                .value_type
                .map(|value_type| (field.id.as_bytes().to_vec(), value_type))
        })
        .collect()
}

fn join_integers(values: &[i32]) -> Option<String> {
    let kept = values
        .iter()
        .filter(|value| !is_missing_integer(**value))
        .map(|value| value.to_string())
        .collect::<Vec<_>>();
    (!kept.is_empty()).then(|| kept.join(","))
}

fn join_floats(values: &[f32]) -> Option<String> {
    let kept = values
        .iter()
        .filter(|value| !is_missing_float(**value))
        .map(|value| value.to_string())
        .collect::<Vec<_>>();
    (!kept.is_empty()).then(|| kept.join(","))
}

fn join_strings<'a>(values: impl Iterator<Item = &'a [u8]>) -> Option<String> {
    let kept = values
        .filter(|value| !value.is_empty() && *value != b".")
        .map(|value| String::from_utf8_lossy(value).into_owned())
        .collect::<Vec<_>>();
    (!kept.is_empty()).then(|| kept.join(","))
}

fn is_absent_tag(error: &HtsError) -> bool {
    matches!(
        error,
        HtsError::BcfMissingTag { .. } | HtsError::BcfUndefinedTag { .. }
    )
}

impl VcfSampleReader {
    pub fn open(path: &Path, region: Option<&Interval>) -> Result<Self> {
        log::trace!("Start loading VCF {:?}", path);
        if !path.exists() {
            return Err(unreadable(path, "file does not exist"));
        }

        let mut exhausted = false;
        let (source, view_header) = if is_indexed(path) {
            let mut reader = bcf::IndexedReader::from_path(path)
                .map_err(|e| unreadable(path, format!("failed to open indexed VCF: {e}")))?;
            let view_header = SampleHeader::from_header_view(reader.header())
                .map_err(|e| unreadable(path, e))?;
            if let Some(region) = region {
                exhausted = !Self::fetch_region(&mut reader, region, path)?;
            }
            (HtsSource::Indexed(reader), view_header)
        } else {
            let reader = bcf::Reader::from_path(path)
                .map_err(|e| unreadable(path, format!("failed to open VCF: {e}")))?;
            let view_header = SampleHeader::from_header_view(reader.header())
                .map_err(|e| unreadable(path, e))?;
            (HtsSource::Stream(reader), view_header)
        };

        if view_header.samples.len() != 1 {
            return Err(unreadable(
                path,
                format!(
                    "must contain exactly 1 sample (n = {})",
                    view_header.samples.len()
                ),
            ));
        }

        let current_record = match &source {
            HtsSource::Indexed(reader) => reader.empty_record(),
            HtsSource::Stream(reader) => reader.empty_record(),
        };
        let info_tags = typed_tags(&view_header, FieldKind::Info);
        let format_tags = typed_tags(&view_header, FieldKind::Format)
            .into_iter()
            .filter(|(tag, _)| tag.as_slice() != b"GT")
            .collect();

        log::trace!("Finished loading VCF {:?}", path);
        Ok(Self {
            path: path.to_path_buf(),
            source,
            current_record,
            header: view_header,
            region: region.cloned(),
            info_tags,
            format_tags,
            exhausted,
        })
    }

    /// Positions an indexed reader on `region`; `false` when the contig has no data.
    fn fetch_region(
        reader: &mut bcf::IndexedReader,
        region: &Interval,
        path: &Path,
    ) -> Result<bool> {
        let rid = match reader.header().name2rid(region.contig().as_bytes()) {
            Ok(rid) => rid,
            Err(_) => {
                log::trace!(
                    "{}: Contig {} not found, skipping",
                    path.display(),
                    region.contig()
                );
                return Ok(false);
            }
        };
        let start = region.start().saturating_sub(1);
        let end = region.bounded_end();
        match reader.fetch(rid, start, end) {
            Ok(()) => Ok(true),
            Err(HtsError::GenomicSeek { .. }) => {
                log::debug!(
                    "{}: Contig {} declared in header but absent from index; skipping",
                    path.display(),
                    region.contig()
                );
                Ok(false)
            }
            Err(e) => Err(unreadable(path, format!("error fetching {region}: {e}"))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn advance(&mut self) -> Result<bool> {
        let read = match &mut self.source {
            HtsSource::Indexed(reader) => reader.read(&mut self.current_record),
            HtsSource::Stream(reader) => reader.read(&mut self.current_record),
        };
        match read {
            Some(Ok(())) => Ok(true),
            Some(Err(e)) => Err(crate::varstore_error!(
                "Error reading record from {}: {e}",
                self.path.display()
            )),
            None => Ok(false),
        }
    }

    fn convert_current(&self) -> Result<VariantRecord> {
        let record = &self.current_record;
        let rid = record.rid().ok_or_else(|| {
            crate::varstore_error!("Record without contig in {}", self.path.display())
        })?;
        let contig = std::str::from_utf8(record.header().rid2name(rid)?)?.to_string();
        let start = u64::try_from(record.pos())? + 1;
        let end = u64::try_from(record.pos() + record.rlen().max(1))?;

        let raw_id = record.id();
        let id = (raw_id.as_slice() != b".")
            .then(|| String::from_utf8_lossy(&raw_id).into_owned());
        let alleles = record
            .alleles()
            .iter()
            .map(|allele| String::from_utf8_lossy(allele).into_owned())
            .collect();
        let qual = Some(record.qual()).filter(|qual| !is_missing_float(*qual));
        let filters = record
            .filters()
            .map(|filter| {
                String::from_utf8_lossy(&record.header().id_to_name(filter)).into_owned()
            })
            .collect();

        let mut info = Vec::new();
        for (tag, value_type) in &self.info_tags {
            let value = match value_type {
                ValueType::Flag => record.info(tag).flag()?.then(String::new),
                ValueType::Integer => record
                    .info(tag)
                    .integer()?
                    .and_then(|values| join_integers(&values)),
                ValueType::Float => record
                    .info(tag)
                    .float()?
                    .and_then(|values| join_floats(&values)),
                ValueType::String | ValueType::Character => record
                    .info(tag)
                    .string()?
                    .and_then(|values| join_strings(values.iter().copied())),
            };
            if let Some(value) = value {
                info.push((String::from_utf8_lossy(tag).into_owned(), value));
            }
        }

        let genotype = if self.header.field(FieldKind::Format, "GT").is_some() {
            match record.genotypes() {
                Ok(genotypes) => Some(genotypes.get(0).to_string()),
                Err(e) if is_absent_tag(&e) => None,
                Err(e) => return Err(e.into()),
            }
        } else {
            None
        };

        let mut format = Vec::new();
        for (tag, value_type) in &self.format_tags {
            let value = match value_type {
                ValueType::Integer => match record.format(tag).integer() {
                    Ok(values) => values.first().and_then(|sample| join_integers(sample)),
                    Err(e) if is_absent_tag(&e) => None,
                    Err(e) => return Err(e.into()),
                },
                ValueType::Float => match record.format(tag).float() {
                    Ok(values) => values.first().and_then(|sample| join_floats(sample)),
                    Err(e) if is_absent_tag(&e) => None,
                    Err(e) => return Err(e.into()),
                },
                ValueType::String | ValueType::Character => match record.format(tag).string() {
                    Ok(values) => values
                        .first()
                        .and_then(|sample| join_strings(std::iter::once(*sample))),
                    Err(e) if is_absent_tag(&e) => None,
                    Err(e) => return Err(e.into()),
                },
                ValueType::Flag => None,
            };
            if let Some(value) = value {
                format.push((String::from_utf8_lossy(tag).into_owned(), value));
            }
        }

        Ok(VariantRecord {
            contig,
            start,
            end,
            id,
            alleles,
            qual,
            filters,
            info,
            genotype,
            format,
        })
    }
}

impl SampleReader for VcfSampleReader {
    fn header(&self) -> &SampleHeader {
        &self.header
    }

    fn next_record(&mut self) -> Result<Option<VariantRecord>> {
        while !self.exhausted {
            if !self.advance()? {
                self.exhausted = true;
                break;
            }
            let record = self.convert_current()?;
            match &self.region {
                Some(region) if record.is_past(region) => {
                    self.exhausted = true;
                }
                Some(region) if !record.overlaps(region) => continue,
                _ => return Ok(Some(record)),
            }
        }
        Ok(None)
    }

    fn source_name(&self) -> String {
        self.path.display().to_string()
    }
}

impl Drop for VcfSampleReader {
    fn drop(&mut self) {
        log::trace!("Closing VCF {:?}", self.path);
    }
}
