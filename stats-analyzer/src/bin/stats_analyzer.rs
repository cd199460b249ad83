//! Command-line front end: profile one CSV file and print its statistics.

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use stats_analyzer::logging::setup::{init_logging, LoggingConfig};
use stats_analyzer::prelude::*;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// CSV file to analyze
    path: PathBuf,

    /// JSON file with pipeline configuration; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Field delimiter; sniffed from the file when omitted
    #[arg(short, long)]
    delimiter: Option<char>,

    /// Data rows sampled for schema inference
    #[arg(long)]
    sample_size: Option<usize>,

    /// Rows per load statement
    #[arg(long)]
    batch_size: Option<usize>,

    /// Rows per frequency table
    #[arg(long)]
    frequency_limit: Option<usize>,

    /// Also report the 10th and 90th percentiles
    #[arg(long)]
    extended_quantiles: bool,

    /// Run independent aggregate queries concurrently
    #[arg(long)]
    parallel: bool,

    /// Store round-trip timeout in seconds
    #[arg(long)]
    timeout: Option<f64>,

    /// Session identifier the relation is recorded under
    #[arg(long, default_value = "cli")]
    session: String,

    /// Print the manifest, load report and failures along with the statistics
    #[arg(long)]
    full: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Log debug output of this crate, including store statements
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => PipelineConfig::default(),
    };

    if let Some(delimiter) = args.delimiter {
        config.delimiter = Some(u8::try_from(delimiter).map_err(|_| {
            StatsError::Configuration(format!("delimiter {delimiter:?} is not a single byte"))
        })?);
    }
    if let Some(size) = args.sample_size {
        config.sample_size = size;
    }
    if let Some(size) = args.batch_size {
        config.batch_size = size;
    }
    if let Some(limit) = args.frequency_limit {
        config.frequency_limit = limit;
    }
    if let Some(secs) = args.timeout {
        config.query_timeout = Duration::try_from_secs_f64(secs)
            .map_err(|e| StatsError::Configuration(format!("invalid timeout: {e}")))?;
    }
    if args.verbose {
        config.log = LogConfig::verbose();
    }
    config.extended_quantiles |= args.extended_quantiles;
    config.parallel_queries |= args.parallel;

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let crate_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_logging(
        LoggingConfig::default()
            .with_crate_level(crate_level)
            .with_json_format(args.json_logs),
    )?;

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            process::exit(2);
        }
    };

    let pipeline = StatsPipeline::builder().config(config).build()?;
    let outcome = match pipeline.run(&args.session, &args.path).await {
        Ok(outcome) => outcome,
        Err(StatsError::EmptyInput(reason)) => {
            eprintln!("Nothing to analyze: {reason}");
            process::exit(1);
        }
        Err(err @ StatsError::Import { .. }) => {
            eprintln!("{err}");
            process::exit(3);
        }
        Err(err) => return Err(err.into()),
    };

    let output = if args.full {
        serde_json::to_string_pretty(&outcome)?
    } else {
        serde_json::to_string_pretty(&outcome.stats)?
    };
    println!("{output}");

    if !outcome.failures.is_empty() {
        eprintln!("{} aggregate queries failed", outcome.failures.len());
    }
    Ok(())
}
