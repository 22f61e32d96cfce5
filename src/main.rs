use anyhow::{Context, Result};
use ase_twomap::config::{self, PipelineConfig, Roster};
use ase_twomap::depth::{DepthPolicy, DEFAULT_MIN_DEPTH};
use ase_twomap::mae::MaePolicy;
use ase_twomap::pipeline::{self, FINAL_TABLE, RUN_SUMMARY};
use ase_twomap::reconcile::CallCase;
use ase_twomap::types::Mapping;
use clap::{Parser, ValueEnum};
use log::LevelFilter;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DepthPolicyArg {
    /// Every sample (or every --depth-samples entry) must reach --min-depth
    AllSamples,
    /// At least one tissue of every pair must reach --min-depth
    PerPair,
}

#[derive(Parser)]
#[command(name = "ase-twomap")]
#[command(version)]
#[command(about = "Reconcile ASE allele counts from reads mapped to two pseudogenomes", long_about = None)]
struct Args {
    /// Variant table from the first pseudogenome mapping
    #[arg(long)]
    first: PathBuf,

    /// Variant table from the second pseudogenome mapping
    #[arg(long)]
    second: PathBuf,

    /// Comma-separated sample names, in output order
    #[arg(long, conflicts_with = "samples_file", required_unless_present = "samples_file")]
    samples: Option<String>,

    /// CSV file with a Sample_name column
    #[arg(long)]
    samples_file: Option<PathBuf>,

    /// The two pseudogenome codes, comma-separated; the first belongs to --first
    #[arg(long, conflicts_with = "codes_file", required_unless_present = "codes_file")]
    mapping_codes: Option<String>,

    /// CSV file with a PSGs column holding the two codes
    #[arg(long)]
    codes_file: Option<PathBuf>,

    /// Sample whose REF/ALT orientation every other sample follows (default: first sample)
    #[arg(long)]
    anchor: Option<String>,

    /// CSV of tissue pairs from the same individual (header row, two columns)
    #[arg(long)]
    pairs: Option<PathBuf>,

    /// CSV of experimental groups (header row, group name then samples)
    #[arg(long)]
    groups: Option<PathBuf>,

    /// Output directory
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Checkpoint directory (default: <output-dir>/temp)
    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,

    /// Resume from the latest checkpoint
    #[arg(long)]
    resume: bool,

    /// Minimum reconciled depth (REF + ALT) per sample
    #[arg(long, default_value_t = DEFAULT_MIN_DEPTH)]
    min_depth: f64,

    /// Which samples must reach --min-depth
    #[arg(long, value_enum, default_value = "all-samples")]
    depth_policy: DepthPolicyArg,

    /// Comma-separated subset of samples for the all-samples depth policy
    #[arg(long)]
    depth_samples: Option<String>,

    /// Input table delimiter: a single character, or "tab"
    #[arg(long, default_value = ",")]
    delimiter: String,

    /// Number of threads for parallel processing
    #[arg(long, default_value_t = num_cpus())]
    threads: usize,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,

    /// Log level: error, warn, info, debug or trace
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

macro_rules! progress {
    ($quiet:expr) => {
        if !$quiet {
            eprintln!();
        }
    };
    ($quiet:expr, $($arg:tt)*) => {
        if !$quiet {
            eprintln!($($arg)*);
        }
    };
}

fn parse_delimiter(value: &str) -> Result<u8> {
    match value {
        "tab" | "\\t" | "\t" => Ok(b'\t'),
        s if s.len() == 1 => Ok(s.as_bytes()[0]),
        other => anyhow::bail!("Invalid --delimiter '{}'. Must be a single character or 'tab'", other),
    }
}

fn load_roster(args: &Args) -> Result<Roster> {
    let samples = match (&args.samples, &args.samples_file) {
        (Some(list), _) => config::split_list(list),
        (None, Some(path)) => config::load_sample_names(path)?,
        (None, None) => anyhow::bail!("Either --samples or --samples-file must be specified"),
    };
    let codes = match (&args.mapping_codes, &args.codes_file) {
        (Some(list), _) => config::parse_mapping_codes(config::split_list(list))?,
        (None, Some(path)) => config::load_mapping_codes(path)?,
        (None, None) => anyhow::bail!("Either --mapping-codes or --codes-file must be specified"),
    };
    Ok(Roster::new(samples, codes, args.anchor.as_deref())?)
}

fn build_config(args: &Args) -> Result<PipelineConfig> {
    for (flag, path) in [("--first", &args.first), ("--second", &args.second)] {
        if !path.exists() {
            anyhow::bail!("{} file not found: {}", flag, path.display());
        }
    }
    if args.min_depth.is_nan() || args.min_depth < 0.0 {
        anyhow::bail!("--min-depth must be a non-negative number, got {}", args.min_depth);
    }

    let roster = load_roster(args)?;
    let pairs = args
        .pairs
        .as_deref()
        .map(|path| config::load_tissue_pairs(path, &roster))
        .transpose()?;
    let groups = args
        .groups
        .as_deref()
        .map(|path| config::load_groups(path, &roster))
        .transpose()?;

    let depth_policy = match args.depth_policy {
        DepthPolicyArg::AllSamples => match &args.depth_samples {
            Some(list) => DepthPolicy::AllSamples {
                required: config::split_list(list)
                    .iter()
                    .map(|s| roster.require(s, "--depth-samples"))
                    .collect::<Result<Vec<_>, _>>()?,
            },
            None => DepthPolicy::all_samples(&roster),
        },
        DepthPolicyArg::PerPair => {
            if args.depth_samples.is_some() {
                anyhow::bail!("--depth-samples only applies to --depth-policy all-samples");
            }
            match &pairs {
                Some(pairs) => DepthPolicy::PerPair { pairs: pairs.clone() },
                None => anyhow::bail!("--depth-policy per-pair requires --pairs"),
            }
        }
    };
    let mae_policy = match pairs {
        Some(pairs) => MaePolicy::PerPair { pairs },
        None => MaePolicy::PerSample,
    };

    let checkpoint_dir = args
        .checkpoint_dir
        .clone()
        .unwrap_or_else(|| args.output_dir.join("temp"));

    Ok(PipelineConfig {
        first_table: args.first.clone(),
        second_table: args.second.clone(),
        roster,
        delimiter: parse_delimiter(&args.delimiter)?,
        min_depth: args.min_depth,
        depth_policy,
        mae_policy,
        groups,
        output_dir: args.output_dir.clone(),
        checkpoint_dir,
        resume: args.resume,
        quiet: args.quiet,
    })
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level: LevelFilter = args
        .log_level
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid --log-level '{}'", args.log_level))?;
    let level = if args.quiet {
        log_level.min(LevelFilter::Warn)
    } else {
        log_level
    };
    env_logger::Builder::new().filter_level(level).init();

    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build_global()
        .context("Failed to configure thread pool")?;

    let config = build_config(&args)?;
    let roster = &config.roster;

    progress!(args.quiet, "ASE Two-Mapping Reconciliation");
    progress!(args.quiet, "=========================================");
    progress!(args.quiet, "First mapping ({}): {}", roster.code(Mapping::First), config.first_table.display());
    progress!(args.quiet, "Second mapping ({}): {}", roster.code(Mapping::Second), config.second_table.display());
    progress!(args.quiet, "Samples: {}", roster.samples().join(", "));
    progress!(args.quiet, "Anchor: {}", roster.anchor_name());
    progress!(args.quiet, "Depth filter: >= {} ({})", config.min_depth, config.depth_policy.describe());
    progress!(args.quiet, "MAE cleaner: {}", config.mae_policy.describe());
    progress!(args.quiet, "Checkpoints: {}", config.checkpoint_dir.display());
    progress!(args.quiet, "Threads: {}", args.threads);
    progress!(args.quiet);

    let summary = pipeline::run_pipeline(&config)?;

    if let Some(checkpoint) = summary.resumed_from {
        progress!(args.quiet, "Resumed after {}", checkpoint.file_name());
    }
    for report in &summary.reports {
        progress!(
            args.quiet,
            "  {:<13} {:>10} in {:>10} kept {:>10} dropped",
            report.stage,
            report.consumed,
            report.retained,
            report.dropped()
        );
    }
    if let Some(counts) = &summary.case_counts {
        progress!(args.quiet);
        progress!(args.quiet, "Reconciliation cases:");
        for case in CallCase::ALL {
            progress!(args.quiet, "  {:<36} {}", case.label(), counts.get(case));
        }
        progress!(args.quiet, "  {:<36} {}", "unresolved", counts.unresolved);
        progress!(args.quiet, "  homozygous calls logged: {}", summary.homozygous);
    }
    if let Some(mean) = summary.mean_af_all {
        progress!(args.quiet, "Mean AF_all: {:.4}", mean);
    }

    progress!(args.quiet);
    progress!(
        args.quiet,
        "Done! {} sites written to: {}",
        summary.final_sites,
        config.output_dir.join(FINAL_TABLE).display()
    );
    progress!(args.quiet, "Run summary: {}", config.output_dir.join(RUN_SUMMARY).display());

    Ok(())
}
