use crate::{constants::RECORD_OVERHEAD_BYTES, core::interval::Interval};
use serde::{Deserialize, Serialize};

/// One variant site as seen by a single sample.
///
/// Coordinates are 1-based and closed. INFO and FORMAT values are kept in
/// their VCF text rendering, keyed by tag, in the order the source emitted them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantRecord {
    pub contig: String,
    pub start: u64,
    pub end: u64,
    pub id: Option<String>,
    pub alleles: Vec<String>,
    pub qual: Option<f32>,
    pub filters: Vec<String>,
    pub info: Vec<(String, String)>,
    pub genotype: Option<String>,
    pub format: Vec<(String, String)>,
}

impl VariantRecord {
    /// A bare site spanning its reference allele.
    pub fn new(contig: &str, start: u64, reference: &str, alternates: &[&str]) -> Self {
        let span = reference.len().max(1) as u64;
        let mut alleles = vec![reference.to_string()];
        alleles.extend(alternates.iter().map(|alt| alt.to_string()));
        Self {
            contig: contig.to_string(),
            start,
            end: start + span - 1,
            id: None,
            alleles,
            qual: None,
            filters: Vec::new(),
            info: Vec::new(),
            genotype: None,
            format: Vec::new(),
        }
    }

    pub fn with_info(mut self, key: &str, value: &str) -> Self {
        self.info.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_genotype(mut self, genotype: &str) -> Self {
        self.genotype = Some(genotype.to_string());
        self
    }

    pub fn overlaps(&self, interval: &Interval) -> bool {
        interval.overlaps(&self.contig, self.start, self.end)
    }

    /// Whether the record lies wholly beyond `interval` on the same contig.
    pub fn is_past(&self, interval: &Interval) -> bool {
        self.contig == interval.contig() && self.start > interval.end()
    }

    /// Bytes this record contributes to a batch buffer.
    pub fn buffered_size(&self) -> u64 {
        let pairs = |values: &[(String, String)]| -> usize {
            values.iter().map(|(k, v)| k.len() + v.len() + 2).sum()
        };
        let variable = self.contig.len()
            + self.id.as_ref().map_or(0, String::len)
            + self.alleles.iter().map(|a| a.len() + 1).sum::<usize>()
            + self.filters.iter().map(|f| f.len() + 1).sum::<usize>()
            + pairs(&self.info)
            + self.genotype.as_ref().map_or(0, String::len)
            + pairs(&self.format);
        RECORD_OVERHEAD_BYTES + variable as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_spans_reference_allele() {
        let snv = VariantRecord::new("chr1", 100, "A", &["T"]);
        assert_eq!((snv.start, snv.end), (100, 100));
        let deletion = VariantRecord::new("chr1", 100, "ACGT", &["A"]);
        assert_eq!(deletion.end, 103);
    }

    #[test]
    fn overlap_and_past_relative_to_interval() {
        let interval = Interval::new("chr1", 100, 200).unwrap();
        assert!(VariantRecord::new("chr1", 98, "ACGT", &["A"]).overlaps(&interval));
        assert!(!VariantRecord::new("chr1", 99, "A", &["T"]).overlaps(&interval));
        assert!(VariantRecord::new("chr1", 201, "A", &["T"]).is_past(&interval));
        assert!(!VariantRecord::new("chr2", 201, "A", &["T"]).is_past(&interval));
    }

    #[test]
    fn buffered_size_grows_with_payload() {
        let bare = VariantRecord::new("chr1", 100, "A", &["T"]);
        let annotated = bare.clone().with_info("DP", "35").with_genotype("0/1");
        assert_eq!(bare.buffered_size(), RECORD_OVERHEAD_BYTES + 4 + 4);
        assert!(annotated.buffered_size() > bare.buffered_size());
    }
}
