//! Rainbow table generation CLI
//!
//! Usage: rtgen_generate <config.json>
//!
//! Writes one shard file per job under `<workFolder>/generator`.
//! Log verbosity follows `RUST_LOG` (default: info).

use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use rtgen_rainbow::app::generator::TableGenerator;
use rtgen_rainbow::config::read_config;
use rtgen_rainbow::{Error, Result};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Generate rainbow table chains into per-job shard files
#[derive(Parser, Debug)]
#[command(name = "rtgen_generate", version)]
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
        "Generating {} chains ({}, length {}-{}, chain length {}) with {} jobs...",
        config.table_size,
        config.hash_algorithm,
        config.password_min,
        config.password_max,
        config.chain_length,
        config.job_count()
    );
    let start = Instant::now();

    let report = TableGenerator::new(&config).run()?;

    println!(
        "Generated {} chains in {:.2} seconds",
        report.total_rows(),
        start.elapsed().as_secs_f64()
    );
    if report.dropped_rows() > 0 {
        println!(
            "Note: {} rows were not generated (table size is not a multiple of the job count).",
            report.dropped_rows()
        );
    }
    println!("Shards written to {}", config.generator_folder().display());
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
