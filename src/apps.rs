use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use clap::{Parser, error::ErrorKind};
use tracing_subscriber::EnvFilter;

use crate::artifacts::validate_artifacts;
use crate::config::SplitConfig;
use crate::constants::inventory::{DEFAULT_MASTER_INDEX_FILENAME, DEFAULT_STATS_FILENAME};
use crate::constants::splits::{ALL_SPLITS, DEFAULT_RATIO_TOLERANCE, DEFAULT_SEED};
use crate::inventory::scan::MasterIndexScanner;
use crate::inventory::stats::DatasetStatistics;
use crate::metadata::SplitMetadata;
use crate::pipeline::PatientSplitter;
use crate::splits::SplitRatios;
use crate::validation::ValidationReport;

/// Exit status for a split that was written but failed validation.
pub const EXIT_INVALID_SPLIT: u8 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "split_patients",
    disable_help_subcommand = true,
    about = "Patient-level stratified train/val/test split",
    long_about = "Group master index images by patient, stratify patients by their highest-priority disease tag, and write disjoint train/val/test tables plus a validation report.",
    after_help = "Exit status: 0 when the split validates, 2 when it was written but failed validation, 1 on any fatal error (nothing written)."
)]
struct SplitPatientsCli {
    #[arg(long = "master-index", value_name = "PATH", help = "Master index CSV")]
    master_index: PathBuf,
    #[arg(
        long = "output-dir",
        value_name = "DIR",
        help = "Directory receiving split tables and reports"
    )]
    output_dir: PathBuf,
    #[arg(
        long = "split-ratios",
        value_name = "TRAIN,VAL,TEST",
        value_parser = parse_split_ratios_arg,
        default_value = "0.8,0.1,0.1",
        help = "Comma-separated split ratios that must sum to 1.0"
    )]
    split_ratios: SplitRatios,
    #[arg(
        long = "random-seed",
        default_value_t = DEFAULT_SEED,
        help = "Deterministic seed used for stratified allocation"
    )]
    random_seed: u64,
    #[arg(
        long = "data-root",
        value_name = "DIR",
        help = "Root for relative caption paths (defaults to the working directory)"
    )]
    data_root: Option<PathBuf>,
    #[arg(
        long = "ratio-tolerance",
        default_value_t = DEFAULT_RATIO_TOLERANCE,
        value_parser = parse_tolerance_arg,
        help = "Allowed deviation of each split's patient fraction from its target"
    )]
    ratio_tolerance: f64,
}

#[derive(Debug, Parser)]
#[command(
    name = "build_master_index",
    disable_help_subcommand = true,
    about = "Build a master index from image and caption directories"
)]
struct BuildMasterIndexCli {
    #[arg(long = "images-dir", value_name = "DIR", help = "Directory of images")]
    images_dir: PathBuf,
    #[arg(
        long = "captions-dir",
        value_name = "DIR",
        help = "Directory of <stem>.txt captions"
    )]
    captions_dir: PathBuf,
    #[arg(
        long = "base-dir",
        value_name = "DIR",
        help = "Write image and caption paths relative to this directory"
    )]
    base_dir: Option<PathBuf>,
    #[arg(
        long,
        value_name = "PATH",
        default_value = DEFAULT_MASTER_INDEX_FILENAME,
        help = "Master index CSV to write"
    )]
    output: PathBuf,
    #[arg(
        long = "stats-output",
        value_name = "PATH",
        help = "Optional dataset statistics JSON (e.g. dataset_statistics.json)"
    )]
    stats_output: Option<PathBuf>,
    #[arg(long = "follow-links", help = "Follow symlinks while walking the images directory")]
    follow_links: bool,
}

#[derive(Debug, Parser)]
#[command(
    name = "validate_split",
    disable_help_subcommand = true,
    about = "Re-validate persisted split artifacts against a master index",
    after_help = "Exit status: 0 when every check passes, 2 otherwise, 1 on any fatal error."
)]
struct ValidateSplitCli {
    #[arg(
        long = "output-dir",
        value_name = "DIR",
        help = "Directory holding split tables"
    )]
    output_dir: PathBuf,
    #[arg(long = "master-index", value_name = "PATH", help = "Master index CSV")]
    master_index: PathBuf,
}

/// `split_patients` entry point.
pub fn run_split_patients<I>(args_iter: I) -> Result<ExitCode, Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    init_tracing();
    let Some(cli) = parse_cli::<SplitPatientsCli, _>(
        std::iter::once("split_patients".to_string()).chain(args_iter),
    )?
    else {
        return Ok(ExitCode::SUCCESS);
    };

    let config = SplitConfig {
        seed: cli.random_seed,
        ratios: cli.split_ratios,
        ratio_tolerance: cli.ratio_tolerance,
        data_root: cli.data_root,
        ..SplitConfig::default()
    };
    let splitter = PatientSplitter::new(config)?;
    let run = splitter.run(&cli.master_index, &cli.output_dir)?;

    print_split_summary(&run.metadata);
    println!("artifacts written to {}", run.output_dir.display());
    Ok(verdict_exit_code(run.is_valid()))
}

/// `build_master_index` entry point.
pub fn run_build_master_index<I>(args_iter: I) -> Result<ExitCode, Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    init_tracing();
    let Some(cli) = parse_cli::<BuildMasterIndexCli, _>(
        std::iter::once("build_master_index".to_string()).chain(args_iter),
    )?
    else {
        return Ok(ExitCode::SUCCESS);
    };

    let now = Utc::now();
    let mut scanner = MasterIndexScanner::new(&cli.images_dir, &cli.captions_dir)
        .with_timestamp(now)
        .with_follow_links(cli.follow_links);
    if let Some(base_dir) = &cli.base_dir {
        scanner = scanner.with_base_dir(base_dir);
    }
    let inventory = scanner.scan()?;
    inventory.write_csv(&cli.output)?;
    println!(
        "master index with {} images written to {}",
        inventory.len(),
        cli.output.display()
    );

    if let Some(stats_path) = &cli.stats_output {
        let stats = DatasetStatistics::from_inventory(&inventory, now);
        stats.write_json(stats_path)?;
        println!(
            "statistics: {} images, {} captions, {:.2} MB ({} written)",
            stats.overall.total_images,
            stats.overall.total_captions,
            stats.overall.total_size_mb,
            stats_path.display()
        );
    } else {
        println!("pass --stats-output {DEFAULT_STATS_FILENAME} to write dataset statistics");
    }

    let integrity = scanner.check_integrity()?;
    println!("=== integrity ===");
    println!(
        "images without captions: {}",
        integrity.images_without_captions.len()
    );
    println!(
        "captions without images: {}",
        integrity.orphaned_captions.len()
    );
    if integrity.is_clean() {
        println!("every image has a caption");
    }
    Ok(ExitCode::SUCCESS)
}

/// `validate_split` entry point.
pub fn run_validate_split<I>(args_iter: I) -> Result<ExitCode, Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    init_tracing();
    let Some(cli) = parse_cli::<ValidateSplitCli, _>(
        std::iter::once("validate_split".to_string()).chain(args_iter),
    )?
    else {
        return Ok(ExitCode::SUCCESS);
    };

    let report = validate_artifacts(&cli.output_dir, &cli.master_index, &SplitConfig::default())?;
    print_validation_report(&report);
    Ok(verdict_exit_code(report.overall_valid))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn verdict_exit_code(valid: bool) -> ExitCode {
    if valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_INVALID_SPLIT)
    }
}

fn print_split_summary(metadata: &SplitMetadata) {
    println!("=== split summary (seed {}) ===", metadata.random_seed);
    for label in ALL_SPLITS {
        let summary = metadata.summary(label);
        println!(
            "{:<5}: {:>6} patients, {:>7} images",
            label.as_str(),
            summary.n_patients,
            summary.n_images
        );
    }
    println!(
        "captions: {} missing, {} unreadable",
        metadata.diagnostics.captions.images_without_captions,
        metadata.diagnostics.captions.caption_read_failures
    );
    print_validation_report(&metadata.validation);
}

fn print_validation_report(report: &ValidationReport) {
    println!("=== validation ===");
    for result in &report.checks {
        let verdict = if result.passed { "PASS" } else { "FAIL" };
        println!("{verdict} {:<16} {}", result.check.as_str(), result.details);
    }
    println!(
        "overall: {}",
        if report.overall_valid { "valid" } else { "INVALID" }
    );
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}

/// Parse `TRAIN,VAL,TEST`. The sum is checked by the splitter so a bad sum
/// surfaces as [`SplitError::InvalidRatio`](crate::SplitError::InvalidRatio).
fn parse_split_ratios_arg(raw: &str) -> Result<SplitRatios, String> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err("--split-ratios expects exactly 3 comma-separated values".to_string());
    }
    let parse = |name: &str, value: &str| {
        value
            .parse::<f64>()
            .map_err(|_| format!("invalid {name} ratio '{value}': must be a float"))
    };
    Ok(SplitRatios {
        train: parse("train", parts[0])?,
        validation: parse("val", parts[1])?,
        test: parse("test", parts[2])?,
    })
}

fn parse_tolerance_arg(raw: &str) -> Result<f64, String> {
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("invalid --ratio-tolerance '{raw}': must be a float"))?;
    if !value.is_finite() || value < 0.0 {
        return Err("--ratio-tolerance must be a non-negative number".to_string());
    }
    Ok(value)
}
