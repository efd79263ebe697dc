//! Rainbow table loading CLI
//!
//! Usage: rtgen_insert <config.json>
//!
//! Creates the database and `table_<length>` tables if needed, then loads
//! every shard file from `<workFolder>/generator`. Duplicate terminals are
//! counted, not reported as errors.

use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use rtgen_rainbow::app::loader::load_tables;
use rtgen_rainbow::config::read_config;
use rtgen_rainbow::{Error, Result};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Load generated shard files into the configured store
#[derive(Parser, Debug)]
#[command(name = "rtgen_insert", version)]
struct Args {
    /// Path to the JSON configuration file
    config: String,
}

fn run(args: &Args) -> Result<()> {
    if args.config.is_empty() {
        return Err(Error::Config(
            "configuration file path argument is empty".into(),
        ));
    }
    tracing::info!(path = %args.config, "reading configuration");
    let config = read_config(&args.config)?;

    println!(
        "Loading shards from {} into '{}' ({})...",
        config.generator_folder().display(),
        config.name,
        config.method
    );
    let start = Instant::now();

    let report = load_tables(&config)?;

    let totals = report.totals();
    println!(
        "Loaded {} shards in {:.2} seconds",
        report.shards.len(),
        start.elapsed().as_secs_f64()
    );
    for (len, counts) in report.per_length() {
        println!(
            "  length {:>2}: {} inserted, {} collisions",
            len, counts.inserted, counts.duplicates
        );
    }
    println!(
        "Total: {} inserted, {} collisions, {} malformed, {} without table",
        totals.inserted, totals.duplicates, totals.malformed, totals.unroutable
    );
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
