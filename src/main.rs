use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use groupsum::bench::{run_benchmark, timed, BenchConfig};
use groupsum::generate::{generate_file, Distribution, GenerateConfig};
use groupsum::output::write_result;
use groupsum::source::{load_records, Columns};
use groupsum::{Strategy, Tuning};
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser)]
#[command(name = "groupsum")]
#[command(about = "Group rows by key and time the summation of two columns", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a CSV table and time its aggregation
    Run {
        /// CSV file to read (gzip-compressed when ending in .gz)
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        #[arg(short, long, value_enum, default_value_t = Strategy::Sequential)]
        strategy: Strategy,

        /// Worker threads (0 = one per core)
        #[arg(short = 't', long, default_value_t = 1)]
        threads: usize,

        /// Rows handed to a worker at a time
        #[arg(long, default_value_t = 10_000)]
        batch_size: usize,

        /// Radix partitions per thread
        #[arg(long, default_value_t = 1)]
        partition_ratio: usize,

        /// Local map size that makes adaptive-two-phase partition its merge
        #[arg(long, default_value_t = 10_000)]
        adaptation_threshold: usize,

        /// Untimed warm-up runs
        #[arg(long, default_value_t = 0)]
        dryruns: usize,

        #[arg(short = 'n', long, default_value_t = 1)]
        trials: usize,

        #[arg(long, default_value = "key")]
        key_column: String,

        #[arg(long, default_value = "value1")]
        value1_column: String,

        #[arg(long, default_value = "value2")]
        value2_column: String,

        /// Compare the result with the sequential fold
        #[arg(long, default_value_t = false)]
        validate: bool,

        /// Keys whose sums are printed after the run (e.g. 419,3488)
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
        spot_check: Vec<i64>,

        /// Write the result mapping to this CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write a synthetic dataset
    Generate {
        #[arg(short, long, value_enum, default_value_t = Distribution::Uniform)]
        distribution: Distribution,

        #[arg(long, default_value_t = 1_000_000)]
        num_rows: usize,

        #[arg(long, default_value_t = 1_000)]
        num_groups: usize,

        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,

        /// Output file (defaults to data/<distribution>-<rows>-<groups>.csv.gz)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        );
    tracing_subscriber::registry().with(stderr_layer).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            input,
            strategy,
            threads,
            batch_size,
            partition_ratio,
            adaptation_threshold,
            dryruns,
            trials,
            key_column,
            value1_column,
            value2_column,
            validate,
            spot_check,
            output,
        } => {
            let columns = Columns {
                key: key_column,
                value1: value1_column,
                value2: value2_column,
            };
            let config = BenchConfig {
                strategy,
                threads,
                tuning: Tuning {
                    batch_size,
                    partition_ratio,
                    adaptation_threshold,
                },
                dryruns,
                trials,
                validate,
                spot_check,
            };
            config.log();

            info!(path = %input.display(), ?columns, "reading table into memory");
            let (records, elapsed) = timed(|| load_records(&input, &columns));
            let records =
                records.with_context(|| format!("failed to load {}", input.display()))?;
            info!(rows = records.len(), elapsed = ?elapsed, "table loaded");

            let report = run_benchmark(&records, &config)?;
            println!("{report}");

            if let Some(path) = output {
                write_result(&path, &report.result)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                info!(path = %path.display(), groups = report.result.len(), "result written");
            }
        }
        Commands::Generate {
            distribution,
            num_rows,
            num_groups,
            seed,
            output,
        } => {
            let config = GenerateConfig {
                distribution,
                num_rows,
                num_groups,
                seed,
            };
            let path = output.unwrap_or_else(|| config.default_path());
            generate_file(&config, &path)
                .with_context(|| format!("failed to generate {}", path.display()))?;
        }
    }

    Ok(())
}
