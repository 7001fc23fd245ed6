//! aml-runner: headless batch risk-scoring runner.
//!
//! Usage:
//!   aml-runner --input exports/ --db aml.db
//!   aml-runner --input export.json --workers 8 --batch-size 200
//!
//! Exit codes: 0 all batches completed, 1 at least one batch failed,
//! 2 fatal configuration or startup error.

use aml_core::metrics::LogMetricsSink;
use aml_core::scheduler::{run, CancelToken, RunSummary};
use aml_core::store::AmlStore;
use aml_core::{ingest, AmlError, RunConfig};
use anyhow::Result;
use std::env;
use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();
    match run_cli() {
        Ok(summary) => {
            print_summary(&summary);
            if summary.all_completed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn run_cli() -> Result<RunSummary> {
    let args: Vec<String> = env::args().collect();

    let input = str_arg(&args, "--input")
        .ok_or_else(|| AmlError::Config("--input <file-or-directory> is required".into()))?;
    let db = str_arg(&args, "--db").unwrap_or(":memory:");

    let mut config = match str_arg(&args, "--config") {
        Some(path) => RunConfig::load(Path::new(path))?,
        None => RunConfig::default(),
    };
    if let Some(workers) = opt_arg::<usize>(&args, "--workers")? {
        config.max_workers = workers;
    }
    if let Some(batch_size) = opt_arg::<usize>(&args, "--batch-size")? {
        config.batch_size = batch_size;
    }
    if let Some(max_retries) = opt_arg::<u32>(&args, "--max-retries")? {
        config.max_retries = max_retries;
    }
    if let Some(threshold) = opt_arg::<f64>(&args, "--risk-threshold")? {
        config.risk_cuts.medium = threshold;
    }
    config.validate()?;

    println!("aml-runner");
    println!("  input:      {input}");
    println!("  db:         {db}");
    println!("  workers:    {}", config.max_workers);
    println!("  batch size: {}", config.batch_size);
    println!();

    let store = if db == ":memory:" {
        AmlStore::in_memory()?
    } else {
        AmlStore::open(db)?
    };

    let inputs = ingest::discover(Path::new(input))?;
    let summary = run(config, store, &inputs, CancelToken::new(), &LogMetricsSink)?;
    Ok(summary)
}

fn print_summary(summary: &RunSummary) {
    println!("=== RUN SUMMARY ===");
    println!("  run_id:        {}", summary.run_id);
    println!("  batches:       {}", summary.batches_total);
    println!("  completed:     {}", summary.batches_completed);
    println!("  failed:        {}", summary.batches_failed);
    println!("  ingested:      {}", summary.records_ingested);
    println!("  skipped:       {}", summary.records_skipped);
    println!("  deduplicated:  {}", summary.records_deduplicated);
    println!("  throughput:    {:.1} records/s", summary.records_per_second);
    println!("  elapsed:       {:.2}s", summary.elapsed_secs);
}

fn str_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

/// Absent flag is None; a flag whose value does not parse is a fatal
/// configuration error, never a silent fallback to the default.
fn opt_arg<T: std::str::FromStr>(args: &[String], flag: &str) -> Result<Option<T>, AmlError> {
    match str_arg(args, flag) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| AmlError::Config(format!("invalid value '{raw}' for {flag}"))),
    }
}
