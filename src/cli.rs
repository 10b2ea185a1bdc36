use crate::{
    constants::*,
    core::interval::Interval,
    import::config::{BatchLimits, ImportConfig},
    utils::util::Result,
};
use anyhow::anyhow;
use chrono::Datelike;
use clap::{ArgAction, ArgGroup, Parser, Subcommand};
use env_logger::fmt::Color;
use log::{Level, LevelFilter};
use once_cell::sync::Lazy;
use std::{
    fs::File,
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

/// Full version string including the crate version and git description.
///
/// # Examples
/// * `0.1.0-1ba958a-dirty` - while on a dirty branch
/// * `0.1.0-1ba958a` - with a fresh commit
pub static FULL_VERSION: Lazy<String> = Lazy::new(|| {
    let git_describe = env!("VERGEN_GIT_DESCRIBE");
    if git_describe.is_empty() {
        env!("CARGO_PKG_VERSION").to_string()
    } else {
        format!("{}-{}", env!("CARGO_PKG_VERSION"), git_describe)
    }
});

#[derive(Parser, Debug)]
#[command(name="varstore",
          author="Tom Mokveld <tmokveld@pacificbiosciences.com>",
          version=&**FULL_VERSION,
          about="Import single-sample VCFs into an interval-partitioned array store",
          long_about = None,
          after_help = format!("Copyright (C) 2004-{}     Pacific Biosciences of California, Inc.
          This program comes with ABSOLUTELY NO WARRANTY; it is intended for
          Research Use Only and not for use in diagnostic procedures.", chrono::Utc::now().year()),
          help_template = "{name} {version}\n{author}{about-section}\n{usage-heading}\n    {usage}\n\n{all-args}{after-help}",
          )]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Specify multiple times to increase verbosity level (e.g., -vv for more verbosity)
    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        global = true
    )]
    pub verbosity: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Import(ImportArgs),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Import(_) => "import",
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(group(
    ArgGroup::new("input")
        .required(true)
        .args(["vcfs", "vcf_list"]),
))]
#[command(arg_required_else_help(true))]
pub struct ImportArgs {
    /// Single-sample VCF/BCF files to import
    #[arg(value_name = "VCF", num_args = 1.., value_parser = check_file_exists)]
    pub vcfs: Option<Vec<PathBuf>>,

    /// File containing paths of VCF files to import (one per line)
    #[arg(
        long = "vcf-list",
        value_name = "VCF_LIST",
        value_parser = check_file_exists
    )]
    pub vcf_list: Option<PathBuf>,

    /// Genomic interval to import (contig, contig:pos or contig:start-end)
    #[arg(
        short = 'L',
        long = "interval",
        value_name = "INTERVAL",
        value_parser = parse_interval
    )]
    pub interval: Interval,

    /// Workspace directory holding the arrays
    #[arg(short = 'w', long = "workspace", value_name = "DIR")]
    pub workspace: PathBuf,

    /// Name of the array to import into
    #[arg(short = 'A', long = "array", value_name = "NAME")]
    pub array: String,

    /// Number of threads to use for opening inputs
    #[arg(
        short = '@',
        value_name = "THREADS",
        default_value = "1",
        value_parser = threads_in_range
    )]
    pub num_threads: usize,

    /// Keep samples in input order instead of sorting them by name
    #[arg(long = "use-samples-in-order", default_value_t = DEFAULT_USE_SAMPLES_IN_ORDER)]
    pub use_samples_in_order: bool,

    /// Fail if the array already holds data for any sample in the interval
    #[arg(long = "fail-if-updating", default_value_t = DEFAULT_FAIL_IF_UPDATING)]
    pub fail_if_updating: bool,

    /// Fail on conflicting INFO/FORMAT definitions instead of widening them
    #[arg(long = "strict-headers", default_value_t = DEFAULT_STRICT_HEADERS)]
    pub strict_headers: bool,

    /// Buffered bytes per sample that trigger a flush
    #[arg(
        help_heading = "Advanced",
        long = "size-per-column-partition",
        value_name = "BYTES",
        default_value_t = DEFAULT_SIZE_PER_COLUMN_PARTITION,
        value_parser = bytes_in_range
    )]
    pub size_per_column_partition: u64,

    /// Total buffered bytes that trigger a flush
    #[arg(
        help_heading = "Advanced",
        long = "segment-size",
        value_name = "BYTES",
        default_value_t = DEFAULT_SEGMENT_SIZE,
        value_parser = bytes_in_range
    )]
    pub segment_size: u64,

    /// Print only the merged header and exit
    #[arg(long = "print-header", help_heading = "Advanced")]
    pub print_header: bool,
}

/// Initializes the verbosity level for logging based on the command-line arguments.
///
/// Each occurrence of `-v` raises the level one step from `Info`.
pub fn init_verbose(args: &Cli) {
    let filter_level: LevelFilter = match args.verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            let level = record.level();
            let mut style = buf.style();
            match record.level() {
                Level::Error => style.set_color(Color::Red),
                Level::Warn => style.set_color(Color::Yellow),
                Level::Info => style.set_color(Color::Green),
                Level::Debug => style.set_color(Color::Blue),
                Level::Trace => style.set_color(Color::Cyan),
            };

            writeln!(
                buf,
                "{} [{}] {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                style.value(level),
                record.module_path().unwrap_or("unknown_module"),
                record.args()
            )
        })
        .filter_level(filter_level)
        .init();
}

fn threads_in_range(s: &str) -> anyhow::Result<usize> {
    let thread: usize = s
        .parse::<usize>()
        .map_err(|_| anyhow!("`{}` is not a valid thread number", s))?;
    if thread == 0 {
        return Err(anyhow!("Number of threads must be >= 1"));
    }
    Ok(thread)
}

fn bytes_in_range(s: &str) -> anyhow::Result<u64> {
    let bytes: u64 = s
        .replace('_', "")
        .parse::<u64>()
        .map_err(|_| anyhow!("`{}` is not a valid byte count", s))?;
    if bytes == 0 {
        return Err(anyhow!("Byte limits must be >= 1"));
    }
    Ok(bytes)
}

fn parse_interval(s: &str) -> anyhow::Result<Interval> {
    s.parse::<Interval>().map_err(|e| anyhow!("{e}"))
}

/// Checks that the provided file path exists.
fn check_file_exists(s: &str) -> anyhow::Result<PathBuf> {
    let path = Path::new(s);
    if !path.exists() {
        return Err(anyhow!("File does not exist: {}", path.display()));
    }
    Ok(path.to_path_buf())
}

impl ImportArgs {
    pub fn process_vcf_paths(&self) -> Result<Vec<PathBuf>> {
        match (&self.vcfs, &self.vcf_list) {
            (Some(vcfs), None) => Ok(vcfs.clone()),
            (None, Some(list_path)) => Self::read_vcf_paths_from_file(list_path),
            _ => Err(crate::varstore_error!(
                "Provide either VCF paths or --vcf-list, not both"
            )),
        }
    }

    fn read_vcf_paths_from_file(path: &Path) -> Result<Vec<PathBuf>> {
        let file = File::open(path).map_err(|e| {
            crate::varstore_error!("Failed to open VCF list file {}: {}", path.display(), e)
        })?;
        let reader = BufReader::new(file);

        let mut paths = Vec::new();
        for (line_num, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| {
                crate::varstore_error!("Error reading line {}: {}", line_num + 1, e)
            })?;
            let trimmed = line.trim();
            // Skip empty or comment lines
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let path = PathBuf::from(trimmed);
            if !path.exists() {
                return Err(crate::varstore_error!(
                    "VCF file does not exist: {}",
                    path.display()
                ));
            }
            paths.push(path);
        }

        if paths.is_empty() {
            return Err(crate::varstore_error!("No VCF paths found in the input file"));
        }

        Ok(paths)
    }

    pub fn to_config(&self) -> Result<ImportConfig> {
        let limits = BatchLimits::new(self.size_per_column_partition, self.segment_size)?;
        Ok(
            ImportConfig::new(&self.workspace, &self.array, self.interval.clone(), limits)?
                .with_samples_in_order(self.use_samples_in_order)
                .with_fail_if_updating(self.fail_if_updating)
                .with_strict_headers(self.strict_headers),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn parse_import_args(args: &[&str]) -> ImportArgs {
        let parsed = Cli::try_parse_from(args).expect("CLI parse should succeed");
        let Command::Import(args) = parsed.command;
        args
    }

    #[test]
    fn import_args_convert_into_config() {
        let dir = tempfile::tempdir().unwrap();
        let vcf = dir.path().join("a.vcf");
        fs::write(&vcf, "").unwrap();
        let vcf = vcf.to_str().unwrap();

        let args = parse_import_args(&[
            "varstore",
            "import",
            "-L",
            "chr1:100-200",
            "-w",
            "/ws",
            "-A",
            "arr",
            "--fail-if-updating",
            "--segment-size",
            "4096",
            vcf,
        ]);
        assert_eq!(args.process_vcf_paths().unwrap(), vec![PathBuf::from(vcf)]);

        let config = args.to_config().unwrap();
        assert_eq!(config.target.array, "arr");
        assert_eq!(config.target.interval.to_string(), "chr1:100-200");
        assert_eq!(config.limits.segment_size, 4096);
        assert_eq!(
            config.limits.size_per_column_partition,
            DEFAULT_SIZE_PER_COLUMN_PARTITION
        );
        assert!(config.fail_if_updating);
        assert!(!config.use_samples_in_order);
    }

    #[test]
    fn reversed_interval_is_rejected_by_the_parser() {
        let dir = tempfile::tempdir().unwrap();
        let vcf = dir.path().join("a.vcf");
        fs::write(&vcf, "").unwrap();
        let result = Cli::try_parse_from([
            "varstore",
            "import",
            "-L",
            "chr1:200-100",
            "-w",
            "/ws",
            "-A",
            "arr",
            vcf.to_str().unwrap(),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn zero_byte_limits_are_rejected() {
        assert!(bytes_in_range("0").is_err());
        assert_eq!(bytes_in_range("1_000").unwrap(), 1000);
        assert!(threads_in_range("0").is_err());
    }

    #[test]
    fn vcf_list_skips_comments_and_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let vcf = dir.path().join("a.vcf");
        fs::write(&vcf, "").unwrap();
        let list = dir.path().join("list.txt");
        fs::write(&list, format!("# inputs\n\n{}\n", vcf.display())).unwrap();
        assert_eq!(
            ImportArgs::read_vcf_paths_from_file(&list).unwrap(),
            vec![vcf]
        );

        let empty = dir.path().join("empty.txt");
        fs::write(&empty, "# nothing\n").unwrap();
        assert!(ImportArgs::read_vcf_paths_from_file(&empty).is_err());
    }
}
