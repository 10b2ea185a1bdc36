use crate::utils::util::Result;
use rust_htslib::bcf::{header::HeaderView, HeaderRecord};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    Info,
    Format,
    Filter,
    Alt,
}

impl FieldKind {
    pub fn key(self) -> &'static str {
        match self {
            FieldKind::Info => "INFO",
            FieldKind::Format => "FORMAT",
            FieldKind::Filter => "FILTER",
            FieldKind::Alt => "ALT",
        }
    }

    fn carries_type(self) -> bool {
        matches!(self, FieldKind::Info | FieldKind::Format)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Flag,
    Integer,
    Float,
    Character,
    String,
}

impl ValueType {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "Flag" => Ok(ValueType::Flag),
            "Integer" => Ok(ValueType::Integer),
            "Float" => Ok(ValueType::Float),
            "Character" => Ok(ValueType::Character),
            "String" => Ok(ValueType::String),
            _ => Err(crate::varstore_error!("Unsupported header Type {value}")),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::Flag => "Flag",
            ValueType::Integer => "Integer",
            ValueType::Float => "Float",
            ValueType::Character => "Character",
            ValueType::String => "String",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Number {
    Count(u32),
    PerAltAllele,
    PerAllele,
    PerGenotype,
    Unbounded,
}

impl Number {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "A" => Ok(Number::PerAltAllele),
            "R" => Ok(Number::PerAllele),
            "G" => Ok(Number::PerGenotype),
            "." => Ok(Number::Unbounded),
            count => count
                .parse::<u32>()
                .map(Number::Count)
                .map_err(|e| crate::varstore_error!("Invalid header Number {count}: {e}")),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Count(count) => write!(f, "{count}"),
            Number::PerAltAllele => f.write_str("A"),
            Number::PerAllele => f.write_str("R"),
            Number::PerGenotype => f.write_str("G"),
            Number::Unbounded => f.write_str("."),
        }
    }
}

/// One structured `##INFO`, `##FORMAT`, `##FILTER` or `##ALT` line.
///
/// `number` and `value_type` are only present for INFO and FORMAT.
/// Attributes beyond ID/Number/Type/Description are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub kind: FieldKind,
    pub id: String,
    pub number: Option<Number>,
    pub value_type: Option<ValueType>,
    pub description: String,
    pub extra: BTreeMap<String, String>,
}

impl FieldDefinition {
    pub fn new(
        kind: FieldKind,
        id: impl Into<String>,
        number: Option<Number>,
        value_type: Option<ValueType>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            id: id.into(),
            number,
            value_type,
            description: description.into(),
            extra: BTreeMap::new(),
        }
    }

    pub fn info(id: &str, number: Number, value_type: ValueType, description: &str) -> Self {
        Self::new(
            FieldKind::Info,
            id,
            Some(number),
            Some(value_type),
            description,
        )
    }

    pub fn format(id: &str, number: Number, value_type: ValueType, description: &str) -> Self {
        Self::new(
            FieldKind::Format,
            id,
            Some(number),
            Some(value_type),
            description,
        )
    }

    pub fn filter(id: &str, description: &str) -> Self {
        Self::new(FieldKind::Filter, id, None, None, description)
    }

    fn from_values<'a>(
        kind: FieldKind,
        values: impl Iterator<Item = (&'a String, &'a String)>,
    ) -> Result<Self> {
        let mut id = None;
        let mut number = None;
        let mut value_type = None;
        let mut description = String::new();
        let mut extra = BTreeMap::new();
        for (key, value) in values {
            match key.as_str() {
                "ID" => id = Some(value.clone()),
                "Number" if kind.carries_type() => number = Some(Number::parse(value)?),
                "Type" if kind.carries_type() => value_type = Some(ValueType::parse(value)?),
                "Description" => description = value.trim_matches('"').to_string(),
                // htslib bookkeeping, regenerated on write
                "IDX" => {}
                _ => {
                    extra.insert(key.clone(), value.clone());
                }
            }
        }
        let id = id.ok_or_else(|| {
            crate::varstore_error!("{kind} header record is missing required ID field")
        })?;
        if kind.carries_type() && value_type.is_none() {
            return Err(crate::varstore_error!(
                "{kind} header record for {id} is missing required Type field"
            ));
        }
        Ok(Self {
            kind,
            id,
            number,
            value_type,
            description,
            extra,
        })
    }

    pub fn to_vcf_line(&self) -> String {
        let mut line = format!("##{}=<ID={}", self.kind.key(), self.id);
        if let Some(number) = self.number {
            line.push_str(&format!(",Number={number}"));
        }
        if let Some(value_type) = self.value_type {
            line.push_str(&format!(",Type={}", value_type.as_str()));
        }
        line.push_str(&format!(",Description=\"{}\"", self.description));
        for (key, value) in &self.extra {
            line.push_str(&format!(",{key}={value}"));
        }
        line.push('>');
        line
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContigDefinition {
    pub id: String,
    pub length: Option<u64>,
}

impl ContigDefinition {
    pub fn new(id: impl Into<String>, length: Option<u64>) -> Self {
        Self {
            id: id.into(),
            length,
        }
    }

    pub fn to_vcf_line(&self) -> String {
        match self.length {
            Some(length) => format!("##contig=<ID={},length={}>", self.id, length),
            None => format!("##contig=<ID={}>", self.id),
        }
    }
}

pub(crate) fn parse_contig_header_fields(
    id: Option<&str>,
    length: Option<&str>,
) -> Result<(String, Option<u64>)> {
    let id = id
        .ok_or_else(|| crate::varstore_error!("Contig header is missing required 'ID' field"))?
        .to_string();
    let length = match length {
        Some(length) => Some(length.parse::<u64>().map_err(|e| {
            crate::varstore_error!("Contig '{id}' has invalid 'length' value '{length}': {e}")
        })?),
        None => None,
    };

    Ok((id, length))
}

/// Keys of structured lines that identify a sample rather than describe the schema.
pub const SAMPLE_METADATA_KEYS: [&str; 2] = ["SAMPLE", "PEDIGREE"];

/// Schema metadata of one single-sample source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleHeader {
    pub file_format: Option<String>,
    pub fields: Vec<FieldDefinition>,
    pub contigs: Vec<ContigDefinition>,
    /// Unstructured or non-standard meta lines, rendered without the leading `##`.
    pub other_lines: Vec<String>,
    /// `##SAMPLE`/`##PEDIGREE` lines, rendered without the leading `##`.
    pub sample_lines: Vec<String>,
    pub samples: Vec<String>,
}

impl SampleHeader {
    pub fn new(sample: impl Into<String>) -> Self {
        Self {
            file_format: Some("VCFv4.2".to_string()),
            samples: vec![sample.into()],
            ..Default::default()
        }
    }

    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_contig(mut self, id: &str, length: Option<u64>) -> Self {
        self.contigs.push(ContigDefinition::new(id, length));
        self
    }

    pub fn with_line(mut self, line: &str) -> Self {
        self.other_lines.push(line.trim_start_matches("##").to_string());
        self
    }

    pub fn field(&self, kind: FieldKind, id: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.kind == kind && f.id == id)
    }

    pub fn contig(&self, id: &str) -> Option<&ContigDefinition> {
        self.contigs.iter().find(|c| c.id == id)
    }

    /// The sample this source describes; `None` for sites-only or multi-sample headers.
    pub fn single_sample(&self) -> Option<&str> {
        match self.samples.as_slice() {
            [sample] => Some(sample.as_str()),
            _ => None,
        }
    }

    pub fn from_header_view(view: &HeaderView) -> Result<Self> {
        let mut header = SampleHeader::default();
        for record in view.header_records() {
            match record {
                HeaderRecord::Info { values, .. } => header
                    .fields
                    .push(FieldDefinition::from_values(FieldKind::Info, values.iter())?),
                HeaderRecord::Format { values, .. } => header
                    .fields
                    .push(FieldDefinition::from_values(FieldKind::Format, values.iter())?),
                HeaderRecord::Filter { values, .. } => header
                    .fields
                    .push(FieldDefinition::from_values(FieldKind::Filter, values.iter())?),
                HeaderRecord::Contig { values, .. } => {
                    let (id, length) = parse_contig_header_fields(
                        values.get("ID").map(String::as_str),
                        values.get("length").map(String::as_str),
                    )?;
                    header.contigs.push(ContigDefinition::new(id, length));
                }
                HeaderRecord::Structured { key, values } if key == "ALT" => header
                    .fields
                    .push(FieldDefinition::from_values(FieldKind::Alt, values.iter())?),
                HeaderRecord::Structured { key, values } => {
                    let body = values
                        .iter()
                        .filter(|(k, _)| k.as_str() != "IDX")
                        .map(|(k, v)| format!("{k}={v}"))
                        .collect::<Vec<_>>()
                        .join(",");
                    let line = format!("{key}=<{body}>");
                    if SAMPLE_METADATA_KEYS.contains(&key.as_str()) {
                        header.sample_lines.push(line);
                    } else {
                        header.other_lines.push(line);
                    }
                }
                HeaderRecord::Generic { key, value } if key == "fileformat" => {
                    header.file_format = Some(value)
                }
                HeaderRecord::Generic { key, value } => {
                    header.other_lines.push(format!("{key}={value}"))
                }
                _ => {}
            }
        }
        header.samples = view
            .samples()
            .iter()
            .map(|sample| std::str::from_utf8(sample).map(str::to_owned))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        // htslib always injects PASS; it is not part of the authored schema.
        header.fields.retain(|f| {
            !(f.kind == FieldKind::Filter
                && f.id == "PASS"
                && f.description == "All filters passed")
        });
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_round_trips_through_display() {
        for raw in ["1", "0", "A", "R", "G", "."] {
            assert_eq!(Number::parse(raw).unwrap().to_string(), raw);
        }
        assert!(Number::parse("many").is_err());
    }

    #[test]
    fn info_definition_renders_vcf_line() {
        let field = FieldDefinition::info("DP", Number::Count(1), ValueType::Integer, "Depth");
        assert_eq!(
            field.to_vcf_line(),
            r#"##INFO=<ID=DP,Number=1,Type=Integer,Description="Depth">"#
        );
        let filter = FieldDefinition::filter("q10", "Quality below 10");
        assert_eq!(
            filter.to_vcf_line(),
            r#"##FILTER=<ID=q10,Description="Quality below 10">"#
        );
    }

    #[test]
    fn contig_fields_parse_optional_length() {
        assert_eq!(
            parse_contig_header_fields(Some("chr1"), None).unwrap(),
            ("chr1".to_string(), None)
        );
        assert!(parse_contig_header_fields(None, Some("10"))
            .unwrap_err()
            .to_string()
            .contains("ID"));
        assert!(parse_contig_header_fields(Some("chr1"), Some("abc"))
            .unwrap_err()
            .to_string()
            .contains("length"));
    }

    #[test]
    fn single_sample_requires_exactly_one_name() {
        assert_eq!(SampleHeader::new("NA12878").single_sample(), Some("NA12878"));
        let mut header = SampleHeader::new("a");
        header.samples.push("b".to_string());
        assert_eq!(header.single_sample(), None);
    }

    #[test]
    fn reads_header_view_from_vcf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.vcf");
        std::fs::write(
            &path,
            "##fileformat=VCFv4.2\n\
             ##contig=<ID=chr1,length=1000>\n\
             ##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Depth\">\n\
             ##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">\n\
             ##FILTER=<ID=q10,Description=\"Low quality\">\n\
             ##source=caller-1.0\n\
             #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\n",
        )
        .unwrap();
        let reader = rust_htslib::bcf::Reader::from_path(&path).unwrap();
        let header = SampleHeader::from_header_view(rust_htslib::bcf::Read::header(&reader)).unwrap();

        assert_eq!(header.samples, vec!["S1".to_string()]);
        assert_eq!(header.contig("chr1").unwrap().length, Some(1000));
        let dp = header.field(FieldKind::Info, "DP").unwrap();
        assert_eq!(dp.value_type, Some(ValueType::Integer));
        assert_eq!(dp.number, Some(Number::Count(1)));
        assert_eq!(dp.description, "Depth");
        assert!(header.field(FieldKind::Filter, "q10").is_some());
        assert!(header.other_lines.contains(&"source=caller-1.0".to_string()));
    }
}
