use rust_htslib::bcf::{self, record::GenotypeAllele, Header};
use std::path::{Path, PathBuf};

pub const FIXTURE_CONTIG: &[u8] = br#"##contig=<ID=chr1,length=1000>"#;

enum FixtureValue {
    Integer(&'static [u8], i32),
    Float(&'static [u8], f32),
    Flag(&'static [u8]),
}

pub struct FixtureRecord {
    pos: i64,
    reference: &'static [u8],
    alternate: &'static [u8],
    info: Vec<FixtureValue>,
    format_integers: Vec<(&'static [u8], i32)>,
}

impl FixtureRecord {
    /// `pos` is 1-based.
    pub fn new(pos: i64, reference: &'static [u8], alternate: &'static [u8]) -> Self {
        Self {
            pos,
            reference,
            alternate,
            info: Vec::new(),
            format_integers: Vec::new(),
        }
    }

    pub fn info_integer(mut self, tag: &'static [u8], value: i32) -> Self {
        self.info.push(FixtureValue::Integer(tag, value));
        self
    }

    pub fn info_float(mut self, tag: &'static [u8], value: f32) -> Self {
        self.info.push(FixtureValue::Float(tag, value));
        self
    }

    pub fn info_flag(mut self, tag: &'static [u8]) -> Self {
        self.info.push(FixtureValue::Flag(tag));
        self
    }

    pub fn format_integer(mut self, tag: &'static [u8], value: i32) -> Self {
        self.format_integers.push((tag, value));
        self
    }
}

/// Writes a one-sample VCF with a `chr1` contig and a GT FORMAT line.
///
/// Indexed fixtures are BGZF-compressed and tabix-indexed.
pub fn write_single_sample_vcf(
    dir: &Path,
    sample: &str,
    header_lines: &[&[u8]],
    records: &[FixtureRecord],
    indexed: bool,
) -> PathBuf {
    let path = if indexed {
        dir.join(format!("{sample}.vcf.gz"))
    } else {
        dir.join(format!("{sample}.vcf"))
    };

    let mut header = Header::new();
    header.push_record(FIXTURE_CONTIG);
    for line in header_lines {
        header.push_record(line);
    }
    header.push_record(br#"##FORMAT=<ID=GT,Number=1,Type=String,Description="Genotype">"#);
    header.push_sample(sample.as_bytes());

    {
        let mut writer = bcf::Writer::from_path(&path, &header, !indexed, bcf::Format::Vcf)
            .expect("fixture writer should open");
        for fixture in records {
            let mut record = writer.empty_record();
            record.set_rid(Some(0));
            record.set_pos(fixture.pos - 1);
            record
                .set_alleles(&[fixture.reference, fixture.alternate])
                .expect("fixture alleles should be set");
            for value in &fixture.info {
                let pushed = match value {
                    FixtureValue::Integer(tag, v) => record.push_info_integer(tag, &[*v]),
                    FixtureValue::Float(tag, v) => record.push_info_float(tag, &[*v]),
                    FixtureValue::Flag(tag) => record.push_info_flag(tag),
                };
                pushed.expect("fixture INFO should be set");
            }
            record
                .push_genotypes(&[GenotypeAllele::Unphased(0), GenotypeAllele::Unphased(1)])
                .expect("fixture genotype should be set");
            for (tag, value) in &fixture.format_integers {
                record
                    .push_format_integer(tag, &[*value])
                    .expect("fixture FORMAT should be set");
            }
            writer.write(&record).expect("fixture record should be written");
        }
    }

    if indexed {
        bcf::index::build(&path, None, 1, bcf::index::Type::Tbx)
            .expect("fixture index should be built");
    }
    path
}
