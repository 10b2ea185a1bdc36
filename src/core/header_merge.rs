use crate::{
    core::header::{
        ContigDefinition, FieldDefinition, FieldKind, Number, SampleHeader, ValueType,
    },
    error::VarstoreError,
    utils::util::Result,
};
use std::collections::{BTreeMap, BTreeSet};

/// The reconciled schema of every input source.
///
/// Owns all of its data; the per-sample headers it was built from can be
/// dropped or mutated freely afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedHeader {
    file_format: String,
    fields: BTreeMap<(FieldKind, String), FieldDefinition>,
    contigs: Vec<ContigDefinition>,
    other_lines: BTreeSet<String>,
    sample_lines: Vec<String>,
    samples: Vec<String>,
}

impl MergedHeader {
    pub fn file_format(&self) -> &str {
        &self.file_format
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.values()
    }

    pub fn field(&self, kind: FieldKind, id: &str) -> Option<&FieldDefinition> {
        self.fields.get(&(kind, id.to_string()))
    }

    pub fn contigs(&self) -> &[ContigDefinition] {
        &self.contigs
    }

    pub fn contig(&self, id: &str) -> Option<&ContigDefinition> {
        self.contigs.iter().find(|contig| contig.id == id)
    }

    pub fn other_lines(&self) -> impl Iterator<Item = &String> {
        self.other_lines.iter()
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    /// Meta lines in VCF order, ending with the `#CHROM` column line.
    pub fn to_vcf_lines(&self) -> Vec<String> {
        let mut lines = vec![format!("##fileformat={}", self.file_format)];
        lines.extend(self.other_lines.iter().map(|line| format!("##{line}")));
        for kind in [
            FieldKind::Filter,
            FieldKind::Alt,
            FieldKind::Info,
            FieldKind::Format,
        ] {
            lines.extend(
                self.fields
                    .values()
                    .filter(|field| field.kind == kind)
                    .map(FieldDefinition::to_vcf_line),
            );
        }
        lines.extend(self.contigs.iter().map(ContigDefinition::to_vcf_line));
        lines.extend(self.sample_lines.iter().map(|line| format!("##{line}")));

        let mut columns = vec![
            "#CHROM", "POS", "ID", "REF", "ALT", "QUAL", "FILTER", "INFO",
        ]
        .into_iter()
        .map(str::to_owned)
        .collect::<Vec<_>>();
        if !self.samples.is_empty() {
            columns.push("FORMAT".to_string());
            columns.extend(self.samples.iter().cloned());
        }
        lines.push(columns.join("\t"));
        lines
    }
}

/// Reconciles per-sample headers into one [`MergedHeader`].
///
/// With `enforce_compatibility` any disagreement on Type or Number for the same
/// field is a [`VarstoreError::HeaderConflict`]. Otherwise definitions are
/// widened: Integer and Float become Float, any other type mismatch becomes
/// String, differing Numbers become `.`, and the lexicographically smallest
/// non-empty description wins. Contig length disagreements always fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderMerger {
    enforce_compatibility: bool,
}

impl HeaderMerger {
    pub fn new(enforce_compatibility: bool) -> Self {
        Self {
            enforce_compatibility,
        }
    }

    pub fn merge(&self, headers: &[SampleHeader]) -> Result<MergedHeader> {
        let mut by_key: BTreeMap<(FieldKind, String), Vec<&FieldDefinition>> = BTreeMap::new();
        for header in headers {
            for field in &header.fields {
                by_key
                    .entry((field.kind, field.id.clone()))
                    .or_default()
                    .push(field);
            }
        }

        let mut fields = BTreeMap::new();
        for (key, definitions) in by_key {
            let merged = self.merge_field(&definitions)?;
            fields.insert(key, merged);
        }

        let contigs = merge_contigs(headers)?;

        let file_format = headers
            .iter()
            .filter_map(|header| header.file_format.clone())
            .max()
            .unwrap_or_else(|| "VCFv4.2".to_string());

        let other_lines = headers
            .iter()
            .flat_map(|header| header.other_lines.iter().cloned())
            .collect();

        let sample_lines = headers
            .iter()
            .flat_map(|header| header.sample_lines.iter().cloned())
            .collect();
        let samples = headers
            .iter()
            .flat_map(|header| header.samples.iter().cloned())
            .collect();

        log::debug!(
            "Merged {} headers: {} fields, {} contigs",
            headers.len(),
            fields.len(),
            contigs.len()
        );

        Ok(MergedHeader {
            file_format,
            fields,
            contigs,
            other_lines,
            sample_lines,
            samples,
        })
    }

    fn merge_field(&self, definitions: &[&FieldDefinition]) -> Result<FieldDefinition> {
        let first = definitions[0];
        let mut merged = first.clone();
        for other in &definitions[1..] {
            if self.enforce_compatibility {
                if other.value_type != merged.value_type {
                    return Err(conflict(
                        first,
                        format!(
                            "Type {} is incompatible with Type {}",
                            type_name(merged.value_type),
                            type_name(other.value_type)
                        ),
                    ));
                }
                if other.number != merged.number {
                    return Err(conflict(
                        first,
                        format!(
                            "Number {} is incompatible with Number {}",
                            number_name(merged.number),
                            number_name(other.number)
                        ),
                    ));
                }
            } else if other.value_type != merged.value_type || other.number != merged.number {
                log::warn!(
                    "{} {} has conflicting definitions across inputs; widening",
                    first.kind,
                    first.id
                );
            }

            merged.value_type = widen_type(merged.value_type, other.value_type);
            merged.number = widen_number(merged.number, other.number);
            merged.description = pick_description(&merged.description, &other.description);
            for (key, value) in &other.extra {
                merged
                    .extra
                    .entry(key.clone())
                    .and_modify(|existing| {
                        if value < existing {
                            *existing = value.clone();
                        }
                    })
                    .or_insert_with(|| value.clone());
            }
        }

        let widened_from_flag = merged.value_type != Some(ValueType::Flag)
            && definitions
                .iter()
                .any(|definition| definition.value_type == Some(ValueType::Flag));
        if widened_from_flag && merged.number == Some(Number::Count(0)) {
            merged.number = Some(Number::Unbounded);
        }
        Ok(merged)
    }
}

fn conflict(field: &FieldDefinition, message: String) -> VarstoreError {
    VarstoreError::HeaderConflict {
        kind: field.kind.to_string(),
        id: field.id.clone(),
        message,
    }
}

fn type_name(value_type: Option<ValueType>) -> &'static str {
    value_type.map_or("<none>", ValueType::as_str)
}

fn number_name(number: Option<Number>) -> String {
    number.map_or_else(|| "<none>".to_string(), |n| n.to_string())
}

pub fn widen_type(a: Option<ValueType>, b: Option<ValueType>) -> Option<ValueType> {
    match (a, b) {
        (a, b) if a == b => a,
        (None, other) | (other, None) => other,
        (Some(ValueType::Integer), Some(ValueType::Float))
        | (Some(ValueType::Float), Some(ValueType::Integer)) => Some(ValueType::Float),
        _ => Some(ValueType::String),
    }
}

pub fn widen_number(a: Option<Number>, b: Option<Number>) -> Option<Number> {
    match (a, b) {
        (a, b) if a == b => a,
        (None, other) | (other, None) => other,
        _ => Some(Number::Unbounded),
    }
}

fn pick_description(a: &str, b: &str) -> String {
    match (a.is_empty(), b.is_empty()) {
        (true, _) => b.to_string(),
        (_, true) => a.to_string(),
        _ => a.min(b).to_string(),
    }
}

/// Unions contig lists. Every header orders its adjacent contigs, and the
/// union is a topological order of those constraints that always takes the
/// lexicographically smallest ready contig. Headers that disagree on order
/// are resolved by placing the smallest remaining contig.
fn merge_contigs(headers: &[SampleHeader]) -> Result<Vec<ContigDefinition>> {
    let mut definitions: BTreeMap<String, ContigDefinition> = BTreeMap::new();
    let mut successors: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for header in headers {
        for contig in &header.contigs {
            match definitions.get_mut(&contig.id) {
                Some(known) => match (known.length, contig.length) {
                    (Some(a), Some(b)) if a != b => {
                        return Err(VarstoreError::HeaderConflict {
                            kind: "contig".to_string(),
                            id: contig.id.clone(),
                            message: format!(
                                "defined with multiple lengths: {} and {}",
                                a.min(b),
                                a.max(b)
                            ),
                        });
                    }
                    (None, Some(length)) => known.length = Some(length),
                    _ => {}
                },
                None => {
                    definitions.insert(contig.id.clone(), contig.clone());
                }
            }
            successors.entry(contig.id.clone()).or_default();
        }
        for pair in header.contigs.windows(2) {
            if pair[0].id != pair[1].id {
                successors
                    .entry(pair[0].id.clone())
                    .or_default()
                    .insert(pair[1].id.clone());
            }
        }
    }

    let mut pending: BTreeMap<&str, usize> =
        successors.keys().map(|id| (id.as_str(), 0)).collect();
    for next in successors.values().flatten() {
        if let Some(degree) = pending.get_mut(next.as_str()) {
            *degree += 1;
        }
    }
    let mut ready: BTreeSet<&str> = pending
        .iter()
        .filter(|(_, &degree)| degree == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut order = Vec::with_capacity(definitions.len());
    loop {
        let id = match ready.pop_first() {
            Some(id) => id,
            None => match pending.keys().next() {
                Some(&id) => {
                    log::warn!("Contig {id} is ordered inconsistently across inputs");
                    id
                }
                None => break,
            },
        };
        pending.remove(id);
        for next in successors.get(id).into_iter().flatten() {
            if let Some(degree) = pending.get_mut(next.as_str()) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(next.as_str());
                }
            }
        }
        if let Some(contig) = definitions.remove(id) {
            order.push(contig);
        }
    }
    Ok(order)
}
