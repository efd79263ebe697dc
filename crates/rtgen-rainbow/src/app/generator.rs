//! Table generation workflow
//!
//! The requested rows are split across `job_count` workers by floor
//! division. Each worker owns its random source, encoder and shard file, and
//! all of them run on a dedicated pool until the last one finishes.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::app::first_error;
use crate::cancel::CancelToken;
use crate::config::RainbowConfig;
use crate::domain::chain::ChainBuilder;
use crate::domain::shard_format::write_record;
use crate::error::{Error, Result};
use crate::infra::shard_io::{ShardWriter, ensure_generator_folder, shard_path};

/// Upper bound on rows preallocated in a worker buffer
const MAX_PREALLOCATED_ROWS: u64 = 1 << 16;

/// Upper bound on bytes preallocated in a worker buffer
const MAX_PREALLOCATED_BYTES: u64 = 16 << 20;

/// Outcome of one worker
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobReport {
    pub id: usize,
    /// Rows appended to the shard file
    pub rows: u64,
    /// Batches written (one per full buffer plus the remainder)
    pub flushes: u64,
    pub path: PathBuf,
}

/// Outcome of a generation run
#[derive(Clone, Debug, Default)]
pub struct GenerationReport {
    pub jobs: Vec<JobReport>,
    /// Configured table size
    pub requested_rows: u64,
}

impl GenerationReport {
    pub fn total_rows(&self) -> u64 {
        self.jobs.iter().map(|j| j.rows).sum()
    }

    /// Rows lost to the floor division of the table size
    pub fn dropped_rows(&self) -> u64 {
        self.requested_rows.saturating_sub(self.total_rows())
    }
}

/// Random source seed for a worker
///
/// Mixes the worker index into the base seed so workers never share a stream.
pub fn worker_rng_seed(base: u64, worker: usize) -> u64 {
    base ^ (worker as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// One partition of the table
pub struct GenerationWorker {
    id: usize,
    rows: u64,
    buff_size: u64,
    separator: u8,
    min_len: usize,
    max_len: usize,
    path: PathBuf,
    builder: ChainBuilder,
    rng: StdRng,
}

impl GenerationWorker {
    pub fn new(config: &RainbowConfig, id: usize, rows: u64, rng_seed: u64) -> Result<Self> {
        Ok(Self {
            id,
            rows,
            buff_size: config.buff_size,
            separator: config.separator_byte(),
            min_len: config.password_min,
            max_len: config.password_max,
            path: shard_path(config.generator_folder(), id),
            builder: ChainBuilder::from_config(config)?,
            rng: StdRng::seed_from_u64(rng_seed),
        })
    }

    /// Build `rows` chains, flushing every `buff_size` rows
    ///
    /// On cancellation the complete records already buffered are flushed
    /// before returning [`Error::Cancelled`].
    pub fn run(mut self, cancel: &CancelToken) -> Result<JobReport> {
        let mut writer = ShardWriter::open(&self.path)?;
        let record_len = (self.max_len as u64).saturating_mul(2).saturating_add(2);
        let capacity = self
            .buff_size
            .min(MAX_PREALLOCATED_ROWS)
            .saturating_mul(record_len)
            .min(MAX_PREALLOCATED_BYTES);
        let mut buffer = Vec::with_capacity(capacity as usize);
        let mut pending = 0u64;
        let mut written = 0u64;

        for _ in 0..self.rows {
            if cancel.is_cancelled() {
                if pending > 0 {
                    writer.write_batch(&buffer)?;
                }
                tracing::info!(
                    job = self.id,
                    rows = written + pending,
                    "generation cancelled"
                );
                return Err(Error::Cancelled);
            }

            let chain = self
                .builder
                .build_random(&mut self.rng, self.min_len, self.max_len);
            write_record(&mut buffer, &chain, self.separator);
            pending += 1;

            if pending == self.buff_size {
                writer.write_batch(&buffer)?;
                tracing::debug!(job = self.id, rows = pending, "flushed buffer");
                buffer.clear();
                written += pending;
                pending = 0;
            }
        }

        if pending > 0 {
            writer.write_batch(&buffer)?;
            written += pending;
        }

        let flushes = writer.finish()?;
        tracing::debug!(job = self.id, rows = written, flushes, "job finished");

        Ok(JobReport {
            id: self.id,
            rows: written,
            flushes,
            path: self.path,
        })
    }
}

/// Runs all generation workers behind a join barrier
pub struct TableGenerator<'a> {
    config: &'a RainbowConfig,
    rng_seed: Option<u64>,
    cancel: CancelToken,
}

impl<'a> TableGenerator<'a> {
    pub fn new(config: &'a RainbowConfig) -> Self {
        Self {
            config,
            rng_seed: None,
            cancel: CancelToken::new(),
        }
    }

    /// Use a fixed base seed instead of the clock (reproducible runs)
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Generate all shards
    ///
    /// Encoder construction failures abort before any worker starts. Worker
    /// failures are collected after every worker has finished and the first
    /// one is returned.
    pub fn run(&self) -> Result<GenerationReport> {
        let config = self.config;
        let folder = config.generator_folder();
        ensure_generator_folder(&folder)?;

        let job_count = config.job_count();
        let rows_per_job = config.rows_per_job();
        let dropped = config.table_size - rows_per_job * job_count as u64;
        tracing::info!(
            jobs = job_count,
            rows_per_job,
            algorithm = %config.hash_algorithm,
            chain_length = config.chain_length,
            seed_score = config.seed_score,
            folder = %folder.display(),
            "starting generation"
        );
        if dropped > 0 {
            tracing::warn!(
                dropped,
                "table size is not a multiple of the job count; remainder rows are not generated"
            );
        }

        let base_seed = self.rng_seed.unwrap_or_else(clock_seed);
        let workers = (0..job_count)
            .map(|id| GenerationWorker::new(config, id, rows_per_job, worker_rng_seed(base_seed, id)))
            .collect::<Result<Vec<_>>>()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(job_count)
            .thread_name(|i| format!("rtgen-generate-{}", i))
            .build()?;

        let cancel = &self.cancel;
        let results: Vec<Result<JobReport>> = pool.install(|| {
            workers
                .into_par_iter()
                .map(|worker| worker.run(cancel))
                .collect()
        });

        let jobs = first_error("generation", results)?;
        let report = GenerationReport {
            jobs,
            requested_rows: config.table_size,
        };
        tracing::info!(rows = report.total_rows(), "generation finished");
        Ok(report)
    }
}

/// Generate a table with clock-seeded workers
pub fn generate_table(config: &RainbowConfig) -> Result<GenerationReport> {
    TableGenerator::new(config).run()
}
