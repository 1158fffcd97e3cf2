//! Command-line runners behind the `src/bin` entry points.
//!
//! Each runner takes the arguments after the program name, so tests can call
//! them directly.

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, error::ErrorKind};

use crate::audit::{DistributionReport, GroupingSpec, check_sample_files, count_corpus};
use crate::config::{AuditConfig, MergeConfig, NormalizerConfig, SplitConfig, StratifiedConfig};
use crate::constants::audit::{CONCENTRATION_TOP_N, DEFAULT_TOP_SOURCES};
use crate::constants::normalize::DEFAULT_MIN_LEN;
use crate::constants::splits::{
    DEFAULT_MIN_CATEGORY_COUNT, DEFAULT_SEED, DEFAULT_TOLERANCE_PCT, DEFAULT_TRAIN_RATIO,
};
use crate::merge::{MergeEngine, MergeStats};
use crate::metrics::{Concentration, concentration};
use crate::sink::JsonlSink;
use crate::source::SourceSpec;
use crate::source::concatenated::ConcatenatedParser;
use crate::splits::{split_corpus, stratified_sample};
use crate::transport::fs::open_reader;
use crate::validate::Validator;

#[derive(Debug, Parser)]
#[command(
    name = "merge",
    disable_help_subcommand = true,
    about = "Merge upstream sources into one deduplicated corpus",
    long_about = "Normalize records from every source into the canonical schema, drop content duplicates (first occurrence wins), and append survivors to one line-delimited corpus.",
    after_help = "Sources are processed in the order given: --plan entries first, then --source entries."
)]
struct MergeCli {
    #[arg(
        long = "source",
        value_name = "PATH,CATEGORY,SOURCE[,MAX]",
        value_parser = parse_source_arg,
        help = "Source declaration, repeat as needed in merge order"
    )]
    sources: Vec<SourceSpec>,
    #[arg(
        long,
        value_name = "PLAN",
        help = "JSON list of {path, category, source, max_records?} objects"
    )]
    plan: Option<PathBuf>,
    #[arg(long, value_name = "PATH", help = "Output corpus path")]
    output: PathBuf,
    #[arg(long, value_name = "PATH", help = "Optional manifest output path")]
    manifest: Option<PathBuf>,
    #[arg(
        long = "min-len",
        default_value_t = DEFAULT_MIN_LEN,
        help = "Minimum semantic length in characters"
    )]
    min_len: usize,
    #[arg(
        long,
        conflicts_with = "min_len",
        help = "Use the stricter minimum length"
    )]
    strict: bool,
    #[arg(
        long = "top-sources",
        default_value_t = DEFAULT_TOP_SOURCES,
        help = "Number of sources listed in the manifest"
    )]
    top_sources: usize,
}

#[derive(Debug, Parser)]
#[command(
    name = "split",
    disable_help_subcommand = true,
    about = "Seeded train/validation split of a corpus"
)]
struct SplitCli {
    #[arg(value_name = "CORPUS")]
    input: PathBuf,
    #[arg(value_name = "TRAIN_OUT")]
    train_out: PathBuf,
    #[arg(value_name = "VAL_OUT")]
    val_out: PathBuf,
    #[arg(
        long,
        default_value_t = DEFAULT_TRAIN_RATIO,
        value_parser = parse_ratio,
        help = "Fraction of records assigned to train"
    )]
    ratio: f64,
    #[arg(long, default_value_t = DEFAULT_SEED, help = "Shuffle seed")]
    seed: u64,
}

#[derive(Debug, Parser)]
#[command(
    name = "sample",
    disable_help_subcommand = true,
    about = "Category-stratified sample of a corpus",
    long_about = "Draw a sample that keeps each category's share of the corpus within a tolerance, using two streaming passes and seeded per-category reservoirs."
)]
struct SampleCli {
    #[arg(value_name = "CORPUS")]
    input: PathBuf,
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,
    #[arg(long, help = "Target number of sampled records")]
    size: u64,
    #[arg(long, default_value_t = DEFAULT_SEED, help = "Sampling seed")]
    seed: u64,
    #[arg(
        long = "min-count",
        default_value_t = DEFAULT_MIN_CATEGORY_COUNT,
        help = "Categories with at least this many records must appear in the sample"
    )]
    min_count: u64,
    #[arg(
        long,
        default_value_t = DEFAULT_TOLERANCE_PCT,
        help = "Allowed per-category drift in percentage points"
    )]
    tolerance: f64,
}

#[derive(Debug, Parser)]
#[command(
    name = "audit",
    disable_help_subcommand = true,
    about = "Summarize a corpus and run optional reports"
)]
struct AuditCli {
    #[arg(value_name = "CORPUS")]
    input: PathBuf,
    #[arg(
        long,
        value_name = "PATH",
        help = "JSON object mapping group names to category lists"
    )]
    groups: Option<PathBuf>,
    #[arg(long = "manifest-out", value_name = "PATH", help = "Write the manifest here")]
    manifest_out: Option<PathBuf>,
    #[arg(
        long = "dedup-rate",
        value_parser = parse_ratio,
        help = "Deduplication rate carried forward from a merge"
    )]
    dedup_rate: Option<f64>,
    #[arg(
        long,
        value_name = "PATH",
        help = "Sample corpus to check against CORPUS's category mix"
    )]
    sample: Option<PathBuf>,
    #[arg(
        long,
        default_value_t = DEFAULT_TOLERANCE_PCT,
        help = "Allowed per-category drift in percentage points"
    )]
    tolerance: f64,
    #[arg(
        long = "min-count",
        default_value_t = DEFAULT_MIN_CATEGORY_COUNT,
        help = "Only categories with at least this many records are checked"
    )]
    min_count: u64,
    #[arg(
        long = "top-sources",
        default_value_t = DEFAULT_TOP_SOURCES,
        help = "Number of sources listed in the manifest"
    )]
    top_sources: usize,
}

#[derive(Debug, Parser)]
#[command(
    name = "validate",
    disable_help_subcommand = true,
    about = "Count unique, duplicate, and cached records in a corpus"
)]
struct ValidateCli {
    #[arg(long, value_name = "PATH", help = "Corpus to validate")]
    dataset: PathBuf,
    #[arg(
        long = "hash-cache",
        value_name = "PATH",
        help = "JSON list of fingerprints from a parallel corpus"
    )]
    hash_cache: Option<PathBuf>,
    #[arg(
        long = "min-len",
        default_value_t = DEFAULT_MIN_LEN,
        help = "Minimum semantic length in characters"
    )]
    min_len: usize,
}

#[derive(Debug, Parser)]
#[command(
    name = "parse-concatenated",
    disable_help_subcommand = true,
    about = "Rewrite back-to-back JSON objects as one object per line"
)]
struct ParseConcatenatedCli {
    input_file: PathBuf,
    output_file: PathBuf,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Merge declared sources into one deduplicated corpus and print per-source counts.
pub fn run_merge<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    init_tracing();
    let Some(cli) = parse_cli::<MergeCli, _>(std::iter::once("merge".to_string()).chain(args_iter))?
    else {
        return Ok(());
    };

    let mut sources: Vec<SourceSpec> = match &cli.plan {
        Some(plan) => serde_json::from_reader(open_reader(plan)?)?,
        None => Vec::new(),
    };
    sources.extend(cli.sources);
    if sources.is_empty() {
        return Err("no sources given; pass --source or --plan".into());
    }

    let normalizer = if cli.strict {
        NormalizerConfig::strict()
    } else {
        NormalizerConfig {
            min_len: cli.min_len,
        }
    };
    let engine = MergeEngine::new(MergeConfig { normalizer });
    let mut sink = JsonlSink::create(&cli.output)?;
    let stats = engine.merge(&sources, &mut sink)?;

    print_merge_summary(&stats);
    if let Some(path) = &cli.manifest {
        stats.manifest(cli.top_sources).write(path)?;
        println!("manifest written to {}", path.display());
    }
    Ok(())
}

/// Split a corpus into train and validation files with a seeded shuffle.
pub fn run_split<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    init_tracing();
    let Some(cli) = parse_cli::<SplitCli, _>(std::iter::once("split".to_string()).chain(args_iter))?
    else {
        return Ok(());
    };
    let config = SplitConfig {
        train_ratio: cli.ratio,
        seed: cli.seed,
    };
    let stats = split_corpus(&cli.input, &cli.train_out, &cli.val_out, config)?;
    println!(
        "split {} records: train={} validation={} (malformed skipped: {})",
        stats.total, stats.train, stats.validation, stats.malformed
    );
    Ok(())
}

/// Draw a category-stratified sample and print its drift against the full corpus.
pub fn run_sample<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    init_tracing();
    let Some(cli) =
        parse_cli::<SampleCli, _>(std::iter::once("sample".to_string()).chain(args_iter))?
    else {
        return Ok(());
    };
    let config = StratifiedConfig {
        sample_size: cli.size,
        seed: cli.seed,
        min_category_count: cli.min_count,
        tolerance_pct: cli.tolerance,
    };
    let sample = stratified_sample(&cli.input, &cli.output, config)?;
    println!(
        "sampled {} of {} records across {} categories",
        sample.sampled,
        sample.total,
        sample.quotas.len()
    );
    for row in &sample.check.rows {
        println!(
            "  {:<24} full={:>7.3}% sample={:>7.3}% delta={:+.3}",
            row.category, row.full_pct, row.sample_pct, row.delta_pct
        );
    }
    print_spread(&sample.check);
    if !sample.check.passed() {
        println!(
            "{} categories outside ±{} points",
            sample.check.violations.len(),
            cli.tolerance
        );
    }
    Ok(())
}

/// Print a corpus manifest with concentration summaries, optional group and dark
/// ratio reports, and an optional distribution check against a sample.
pub fn run_audit<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    init_tracing();
    let Some(cli) = parse_cli::<AuditCli, _>(std::iter::once("audit".to_string()).chain(args_iter))?
    else {
        return Ok(());
    };
    let config = AuditConfig {
        top_sources: cli.top_sources,
        tolerance_pct: cli.tolerance,
        min_category_count: cli.min_count,
    };

    let counts = count_corpus(&cli.input)?;
    let manifest = counts.manifest(config.top_sources, cli.dedup_rate);
    println!("{}", serde_json::to_string_pretty(&manifest)?);
    if let Some(path) = &cli.manifest_out {
        manifest.write(path)?;
    }
    for (label, histogram) in [("categories", &counts.categories), ("sources", &counts.sources)] {
        print_concentration(
            label,
            concentration(histogram, CONCENTRATION_TOP_N, config.min_category_count),
        );
    }

    if let Some(groups) = &cli.groups {
        let spec = GroupingSpec::from_path(groups)?;
        let report = spec.report(&counts.categories);
        println!("groups over {} records:", report.total);
        for (name, share) in &report.groups {
            println!("  {:<24} {:>9} {:>7.2}%", name, share.count, share.percent);
        }
        println!(
            "  {:<24} {:>9} {:>7.2}%",
            "(ungrouped)", report.ungrouped.count, report.ungrouped.percent
        );
        if let Some(dark) = report.dark {
            println!(
                "dark ratio: {:.2}% ({})",
                dark.percent,
                dark.band.as_str()
            );
        }
    }

    if let Some(sample) = &cli.sample {
        let report = check_sample_files(&cli.input, sample, &config)?;
        println!(
            "distribution check: {} of {} sampled records, tolerance ±{} points",
            report.sample_total, report.full_total, report.tolerance_pct
        );
        for violation in &report.violations {
            println!(
                "  {:<24} {:?} delta={:+.3}",
                violation.category, violation.kind, violation.delta_pct
            );
        }
        print_spread(&report);
        println!("{}", if report.passed() { "PASS" } else { "FAIL" });
    }
    Ok(())
}

/// Count unique records, intra-corpus duplicates, and cache overlap in a dataset.
pub fn run_validate<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    init_tracing();
    let Some(cli) =
        parse_cli::<ValidateCli, _>(std::iter::once("validate".to_string()).chain(args_iter))?
    else {
        return Ok(());
    };
    let validator = Validator::new(NormalizerConfig {
        min_len: cli.min_len,
    });
    let report = validator.validate(&cli.dataset, cli.hash_cache.as_deref())?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Rewrite a file of back-to-back JSON objects as JSONL.
pub fn run_parse_concatenated<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    init_tracing();
    let Some(cli) = parse_cli::<ParseConcatenatedCli, _>(
        std::iter::once("parse-concatenated".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };
    let stats = ConcatenatedParser::new().parse_file(&cli.input_file, &cli.output_file)?;
    println!(
        "wrote {} objects to {} ({} recoveries, {} bytes skipped{})",
        stats.objects,
        cli.output_file.display(),
        stats.recoveries,
        stats.skipped_bytes,
        if stats.truncated_tail {
            ", truncated tail dropped"
        } else {
            ""
        }
    );
    Ok(())
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

fn parse_ratio(raw: &str) -> Result<f64, String> {
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("invalid ratio '{}': must be a float", raw.trim()))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(format!("ratio must be within [0, 1], got {value}"));
    }
    Ok(value)
}

fn parse_source_arg(raw: &str) -> Result<SourceSpec, String> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    if !(3..=4).contains(&parts.len()) || parts[..3].iter().any(|part| part.is_empty()) {
        return Err(format!(
            "--source expects PATH,CATEGORY,SOURCE[,MAX], got '{raw}'"
        ));
    }
    let spec = SourceSpec::new(parts[0], parts[1], parts[2]);
    match parts.get(3) {
        Some(max) => {
            let max = max
                .parse::<u64>()
                .map_err(|_| format!("invalid max records '{max}': must be an integer"))?;
            Ok(spec.with_max_records(max))
        }
        None => Ok(spec),
    }
}

fn print_merge_summary(stats: &MergeStats) {
    println!(
        "=== merge summary ===\nloaded={} unique={} duplicates={} dedup_rate={:.4}",
        stats.total_loaded,
        stats.unique,
        stats.duplicates,
        stats.deduplication_rate()
    );
    for (source_id, source) in &stats.per_source {
        let note = if source.missing {
            " (missing)"
        } else if source.truncated {
            " (capped)"
        } else {
            ""
        };
        println!(
            "  {:<24} read={} retained={} duplicates={} skipped={} malformed={}{}",
            source_id,
            source.read,
            source.retained,
            source.duplicates,
            source.skipped(),
            source.malformed,
            note
        );
    }
    if stats.cancelled {
        println!("merge cancelled; output holds the records written so far");
    }
}

fn print_concentration(label: &str, summary: Option<Concentration>) {
    let Some(summary) = summary else {
        println!("{label}: empty");
        return;
    };
    println!(
        "{label}: {} tags, largest {} at {:.2}%, top {} hold {:.2}%, effective tags {:.1}",
        summary.tags,
        summary.dominant.tag,
        summary.dominant.percent,
        summary.top_n,
        summary.top_percent,
        summary.effective_tags
    );
    if !summary.rare.is_empty() {
        let rare: Vec<&str> = summary.rare.iter().map(|entry| entry.tag.as_str()).collect();
        println!("  below check floor: {}", rare.join(", "));
    }
}

fn print_spread(report: &DistributionReport) {
    let spread = report.spread();
    println!(
        "drift over {} checked categories: max {:.3} points ({}), mean {:.3}",
        spread.checked,
        spread.max_abs_delta_pct,
        spread.worst.as_deref().unwrap_or("-"),
        spread.mean_abs_delta_pct
    );
}
