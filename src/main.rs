//! resilient-fetch command-line entry point.
//!
//! Loads a TOML configuration, fetches every given URL through
//! `FetchEngine::fetch_many`, and prints one row per URL plus a batch summary.
//! Bodies are never parsed; only status, size and timing are reported.

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Serialize;

use resilient_fetch::config::{load_config, EngineConfig};
use resilient_fetch::lifecycle::{spawn_signal_handler, Shutdown};
use resilient_fetch::observability::{logging, metrics};
use resilient_fetch::{
    BatchReport, ErrorKind, FetchEngine, FetchOutcome, HttpTransport, OutcomeSource,
    RequestDescriptor,
};

/// Fetch URLs with retries, circuit breaking, rate limiting and caching.
#[derive(Parser, Debug)]
#[command(name = "resilient-fetch")]
#[command(version)]
#[command(about = "Resilient concurrent URL fetcher", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// File with one URL per line; blank lines and '#' comments are skipped
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Maximum requests in flight (defaults to concurrency.batch_limit)
    #[arg(short = 'n', long)]
    concurrency: Option<usize>,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print results as JSON instead of a table
    #[arg(long)]
    json: bool,

    /// URLs to fetch
    #[arg(value_name = "URL")]
    urls: Vec<String>,
}

#[derive(Serialize)]
struct Row<'a> {
    target: &'a str,
    status: Option<u16>,
    source: OutcomeSource,
    attempts: u32,
    bytes: Option<usize>,
    elapsed_ms: u128,
    error_kind: Option<ErrorKind>,
    error: Option<String>,
}

impl<'a> Row<'a> {
    fn new(target: &'a str, outcome: &FetchOutcome) -> Self {
        Self {
            target,
            status: outcome.status(),
            source: outcome.source(),
            attempts: outcome.attempts(),
            bytes: outcome.payload().map(|body| body.len()),
            elapsed_ms: outcome.elapsed().as_millis(),
            error_kind: outcome.error_kind(),
            error: outcome.error().map(ToString::to_string),
        }
    }
}

#[derive(Serialize)]
struct Summary {
    total: usize,
    successes: usize,
    failures: usize,
    success_rate: f64,
    elapsed_ms: u128,
}

impl From<&BatchReport> for Summary {
    fn from(report: &BatchReport) -> Self {
        Self {
            total: report.total(),
            successes: report.successes,
            failures: report.failures,
            success_rate: report.success_rate(),
            elapsed_ms: report.elapsed.as_millis(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };

    logging::init_logging(&config.observability, cli.verbose);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "resilient-fetch starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut targets = cli.urls.clone();
    if let Some(path) = &cli.input {
        targets.extend(read_targets(path)?);
    }
    if targets.is_empty() {
        return Err("no URLs given; pass them as arguments or with --input".into());
    }

    let requests = targets
        .iter()
        .map(|target| RequestDescriptor::get(target.as_str()).build())
        .collect::<Result<Vec<_>, _>>()?;

    let limit = cli.concurrency.unwrap_or(config.concurrency.batch_limit);
    let transport = HttpTransport::new(&config.transport, &config.timeouts)?;
    let shutdown = Shutdown::new();
    let engine = FetchEngine::builder(config)
        .transport(transport)
        .shutdown(shutdown.clone())
        .build()?;

    spawn_signal_handler(shutdown);

    let report = engine.fetch_many(requests, limit).await;

    if cli.json {
        print_json(&targets, &report)?;
    } else {
        print_table(&targets, &report);
    }

    if !report.is_complete_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn read_targets(path: &Path) -> Result<Vec<String>, std::io::Error> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn print_json(targets: &[String], report: &BatchReport) -> Result<(), serde_json::Error> {
    let rows: Vec<Row<'_>> = targets
        .iter()
        .zip(&report.outcomes)
        .map(|(target, outcome)| Row::new(target, outcome))
        .collect();

    let body = serde_json::json!({
        "results": rows,
        "summary": Summary::from(report),
    });
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn print_table(targets: &[String], report: &BatchReport) {
    println!(
        "{:<6} {:<9} {:>8} {:>10} {:>9}  {}",
        "STATUS", "SOURCE", "ATTEMPTS", "BYTES", "MS", "TARGET"
    );
    for (target, outcome) in targets.iter().zip(&report.outcomes) {
        let row = Row::new(target, outcome);
        let status = row.status.map_or_else(|| "-".to_string(), |s| s.to_string());
        let source = match row.source {
            OutcomeSource::Network => "network",
            OutcomeSource::Cache => "cache",
            OutcomeSource::Coalesced => "coalesced",
        };
        let bytes = row.bytes.map_or_else(|| "-".to_string(), |b| b.to_string());
        println!(
            "{:<6} {:<9} {:>8} {:>10} {:>9}  {}",
            status, source, row.attempts, bytes, row.elapsed_ms, row.target
        );
        if let Some(error) = &row.error {
            println!("       error: {}", error);
        }
    }

    let summary = Summary::from(report);
    println!();
    println!(
        "{} requests: {} succeeded, {} failed ({:.1}% success) in {} ms",
        summary.total, summary.successes, summary.failures, summary.success_rate, summary.elapsed_ms
    );
}
