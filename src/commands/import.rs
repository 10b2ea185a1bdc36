use crate::{
    cli::ImportArgs,
    core::{
        header::SampleHeader,
        header_merge::{HeaderMerger, MergedHeader},
        interval::Interval,
        registry::SampleRegistry,
    },
    import::{config::ImportConfig, ImportJob, ImportSummary},
    io::{sample_reader::SampleReader, vcf_reader::VcfSampleReader},
    store::{file_store::FileStore, ArrayStore},
    utils::util::{format_number_with_commas, readable_size, Result},
};
use rayon::{prelude::*, ThreadPoolBuilder};
use std::{
    io::{self, Write},
    path::PathBuf,
};

/// Opens every input restricted to `interval`, preserving input order.
pub fn open_readers(
    paths: &[PathBuf],
    interval: &Interval,
    num_threads: usize,
) -> Result<Vec<VcfSampleReader>> {
    log::debug!(
        "Opening {} inputs with {} threads...",
        paths.len(),
        num_threads
    );
    let pool = ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|i| format!("varstore-open-{i}"))
        .build()
        .map_err(|e| crate::varstore_error!("Failed to initialize reader thread pool: {e}"))?;
    pool.install(|| {
        paths
            .par_iter()
            .map(|path| VcfSampleReader::open(path, Some(interval)))
            .collect::<Result<Vec<_>>>()
    })
}

pub fn merge_headers<R: SampleReader>(readers: &[R], strict: bool) -> Result<MergedHeader> {
    let headers = readers
        .iter()
        .map(|reader| reader.header().clone())
        .collect::<Vec<SampleHeader>>();
    HeaderMerger::new(strict).merge(&headers)
}

/// Registers `readers` and drives an import job to completion, logging each batch.
pub fn import_readers<R: SampleReader, S: ArrayStore>(
    readers: Vec<R>,
    header: MergedHeader,
    config: &ImportConfig,
    store: S,
) -> Result<ImportSummary> {
    let registry = SampleRegistry::from_readers(readers, config.sample_order())?;
    log::info!(
        "Importing {} samples into {}",
        registry.len(),
        config.target
    );

    let mut job = ImportJob::new(registry, header, config, store);
    for report in job.batches() {
        let report = report?;
        let (size, unit) = readable_size(report.bytes);
        log::debug!(
            "Batch {}: {} records from {} samples ({:.2} {})",
            report.sequence,
            format_number_with_commas(report.records),
            report.samples,
            size,
            unit
        );
    }
    Ok(job.summary())
}

pub fn import(args: ImportArgs) -> Result<()> {
    let config = args.to_config()?;
    let vcf_paths = args.process_vcf_paths()?;
    if vcf_paths.is_empty() {
        return Err(crate::varstore_error!("Expected at least one input file"));
    }

    let readers = open_readers(&vcf_paths, &config.target.interval, args.num_threads)?;
    let header = merge_headers(&readers, config.strict_headers)?;
    log::debug!(
        "Merged header: {} fields, {} contigs, {} samples",
        header.fields().count(),
        header.contigs().len(),
        header.samples().len()
    );

    if args.print_header {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        for line in header.to_vcf_lines() {
            writeln!(out, "{line}")?;
        }
        return Ok(());
    }

    let summary = import_readers(readers, header, &config, FileStore::new())?;
    let (size, unit) = readable_size(summary.bytes);
    log::info!(
        "Imported {} records in {} batches ({:.2} {}) over {}",
        format_number_with_commas(summary.records),
        summary.batches,
        size,
        unit,
        summary.interval
    );
    for (sample, records) in &summary.per_sample {
        log::debug!("{sample}: {} records", format_number_with_commas(*records));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::header::{FieldKind, ValueType},
        error::VarstoreError,
        import::config::BatchLimits,
        io::test_utils::{write_single_sample_vcf, FixtureRecord},
        store::file_store::{array_dir, load_manifest, read_array},
        utils::util::init_logger,
        FRAGMENT_PREFIX, LOCK_FILE_NAME, MANIFEST_FILE_NAME,
    };
    use std::{collections::BTreeMap, fs, path::Path};

    const DP: &[u8] = br#"##INFO=<ID=DP,Number=1,Type=Integer,Description="Depth">"#;
    const DP_FLOAT: &[u8] = br#"##INFO=<ID=DP,Number=1,Type=Float,Description="Depth">"#;
    const AF: &[u8] = br#"##INFO=<ID=AF,Number=A,Type=Float,Description="Allele frequency">"#;
    const DB: &[u8] = br#"##INFO=<ID=DB,Number=0,Type=Flag,Description="dbSNP member">"#;
    const GQ: &[u8] = br#"##FORMAT=<ID=GQ,Number=1,Type=Integer,Description="Genotype quality">"#;

    fn write_inputs(dir: &Path, indexed: bool) -> Vec<PathBuf> {
        vec![
            write_single_sample_vcf(
                dir,
                "C",
                &[DP, GQ],
                &[
                    FixtureRecord::new(90, b"A", b"G"),
                    FixtureRecord::new(160, b"T", b"C")
                        .info_integer(b"DP", 7)
                        .format_integer(b"GQ", 40),
                ],
                indexed,
            ),
            write_single_sample_vcf(
                dir,
                "A",
                &[DP, AF],
                &[
                    FixtureRecord::new(100, b"A", b"G").info_integer(b"DP", 20),
                    FixtureRecord::new(200, b"C", b"T").info_float(b"AF", 0.5),
                    FixtureRecord::new(201, b"C", b"T"),
                ],
                indexed,
            ),
            write_single_sample_vcf(
                dir,
                "B",
                &[DP, DB],
                &[FixtureRecord::new(150, b"G", b"A").info_flag(b"DB")],
                indexed,
            ),
        ]
    }

    /// Raw bytes of every file in an array directory, keyed by file name.
    fn snapshot(dir: &Path) -> BTreeMap<String, Vec<u8>> {
        fs::read_dir(dir)
            .unwrap()
            .map(|entry| {
                let entry = entry.unwrap();
                (
                    entry.file_name().to_string_lossy().into_owned(),
                    fs::read(entry.path()).unwrap(),
                )
            })
            .collect()
    }

    fn run_import(paths: &[PathBuf], config: &ImportConfig) -> Result<ImportSummary> {
        let readers = open_readers(paths, &config.target.interval, 2)?;
        let header = merge_headers(&readers, config.strict_headers)?;
        import_readers(readers, header, config, FileStore::new())
    }

    fn import_config(workspace: &Path) -> ImportConfig {
        ImportConfig::new(
            workspace,
            "cohort",
            "chr1:100-200".parse().unwrap(),
            BatchLimits::default(),
        )
        .unwrap()
    }

    fn check_scenario(indexed: bool) {
        init_logger();
        let inputs = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();
        let paths = write_inputs(inputs.path(), indexed);
        let config = import_config(workspace.path());

        let summary = run_import(&paths, &config).unwrap();
        assert_eq!(summary.records, 4);
        assert_eq!(
            summary.per_sample,
            vec![
                ("A".to_string(), 2),
                ("B".to_string(), 1),
                ("C".to_string(), 1)
            ]
        );

        let dir = array_dir(workspace.path(), "cohort");
        let manifest = load_manifest(&dir).unwrap().unwrap();
        assert_eq!(manifest.columns, vec!["A", "B", "C"]);
        for prefix in [
            "##INFO=<ID=DP,Number=1,Type=Integer",
            "##INFO=<ID=AF,",
            "##INFO=<ID=DB,",
            "##FORMAT=<ID=GQ,",
        ] {
            let count = manifest
                .header
                .iter()
                .filter(|line| line.starts_with(prefix))
                .count();
            assert_eq!(count, 1, "{prefix}");
        }

        let entries = read_array(&dir).unwrap();
        let mut starts = entries
            .iter()
            .map(|entry| (entry.sample.as_str(), entry.record.start))
            .collect::<Vec<_>>();
        starts.sort();
        assert_eq!(starts, vec![("A", 100), ("A", 200), ("B", 150), ("C", 160)]);

        let a100 = entries
            .iter()
            .find(|entry| entry.sample == "A" && entry.record.start == 100)
            .unwrap();
        assert_eq!(a100.record.info, vec![("DP".to_string(), "20".to_string())]);
        assert_eq!(a100.record.genotype.as_deref(), Some("0/1"));
        let c160 = entries.iter().find(|entry| entry.sample == "C").unwrap();
        assert_eq!(c160.record.format, vec![("GQ".to_string(), "40".to_string())]);
    }

    #[test]
    fn imports_streamed_inputs() {
        check_scenario(false);
    }

    #[test]
    fn imports_indexed_inputs() {
        check_scenario(true);
    }

    #[test]
    fn strict_headers_reject_conflicting_definitions() {
        let inputs = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();
        let mut paths = write_inputs(inputs.path(), false);
        paths[2] = write_single_sample_vcf(
            inputs.path(),
            "B",
            &[DP_FLOAT],
            &[FixtureRecord::new(150, b"G", b"A").info_float(b"DP", 3.5)],
            false,
        );
        let lenient = import_config(workspace.path());
        let readers = open_readers(&paths, &lenient.target.interval, 1).unwrap();
        let merged = merge_headers(&readers, false).unwrap();
        let dp = merged.field(FieldKind::Info, "DP").unwrap();
        assert_eq!(dp.value_type, Some(ValueType::Float));
        drop(readers);

        let config = lenient.with_strict_headers(true);

        match run_import(&paths, &config) {
            Err(VarstoreError::HeaderConflict { id, .. }) => assert_eq!(id, "DP"),
            other => panic!("expected header conflict, got {other:?}"),
        }
        assert!(!array_dir(workspace.path(), "cohort").exists());
    }

    #[test]
    fn duplicate_samples_are_rejected_before_writing() {
        let inputs = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();
        let mut paths = write_inputs(inputs.path(), false);
        paths.push(write_single_sample_vcf(
            other.path(),
            "A",
            &[DP],
            &[FixtureRecord::new(120, b"A", b"T")],
            false,
        ));
        let config = import_config(workspace.path());

        assert!(matches!(
            run_import(&paths, &config),
            Err(VarstoreError::DuplicateSampleIdentifier { .. })
        ));
        assert!(!array_dir(workspace.path(), "cohort").exists());
    }

    #[test]
    fn second_import_with_fail_if_updating_keeps_first_content() {
        let inputs = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();
        let paths = write_inputs(inputs.path(), false);
        let config = import_config(workspace.path());
        run_import(&paths, &config).unwrap();

        let dir = array_dir(workspace.path(), "cohort");
        let before = snapshot(&dir);
        assert!(before.contains_key(MANIFEST_FILE_NAME));
        assert!(before.keys().any(|name| name.starts_with(FRAGMENT_PREFIX)));
        let entries = read_array(&dir).unwrap();

        let config = config.with_fail_if_updating(true);
        assert!(matches!(
            run_import(&paths, &config),
            Err(VarstoreError::OverwriteConflict { .. })
        ));
        assert_eq!(snapshot(&dir), before);
        assert_eq!(read_array(&dir).unwrap(), entries);
        assert!(!dir.join(LOCK_FILE_NAME).exists());
    }

    #[test]
    fn missing_input_is_unreadable() {
        let interval = Interval::new("chr1", 1, 10).unwrap();
        let paths = vec![PathBuf::from("/nonexistent/sample.vcf.gz")];
        assert!(matches!(
            open_readers(&paths, &interval, 1),
            Err(VarstoreError::SourceUnreadable { .. })
        ));
    }
}
