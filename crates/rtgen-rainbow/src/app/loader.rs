//! Storage loading workflow
//!
//! Every shard file is loaded by its own task over its own connection.
//! Records are parsed ahead of the store so a write transaction is only open
//! while a batch is being inserted.
//! Duplicate terminals are an expected outcome of chain generation and are
//! counted, never reported as failures.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::app::first_error;
use crate::app::schema::ensure_schema;
use crate::cancel::CancelToken;
use crate::config::{DuplicatePolicy, RainbowConfig};
use crate::constants::EXTRA_CONNECTIONS;
use crate::domain::shard_format::parse_record;
use crate::error::{Error, Result};
use crate::infra::shard_io::{for_each_line, list_shard_files};
use crate::infra::store::{InsertOutcome, Store, StoreConnection, StoreError, open_store};

/// Upper bound on rows preallocated in a batch
const MAX_PREALLOCATED_ROWS: u64 = 1 << 16;

/// A parsed record waiting for its batch
struct PendingRow<'t> {
    table: &'t str,
    len: usize,
    seed: String,
    terminal: String,
}

/// Per-record outcome counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadCounts {
    pub inserted: u64,
    /// Terminal already stored (collision)
    pub duplicates: u64,
    /// Lines that did not parse as a record
    pub malformed: u64,
    /// Well-formed records whose length has no table
    pub unroutable: u64,
}

impl LoadCounts {
    fn add(&mut self, other: &LoadCounts) {
        self.inserted += other.inserted;
        self.duplicates += other.duplicates;
        self.malformed += other.malformed;
        self.unroutable += other.unroutable;
    }
}

/// Outcome of one shard file
#[derive(Clone, Debug, Default)]
pub struct ShardReport {
    pub path: PathBuf,
    pub counts: LoadCounts,
    /// Counters keyed by password length
    pub per_length: FxHashMap<usize, LoadCounts>,
}

/// Outcome of a loading run
#[derive(Clone, Debug, Default)]
pub struct LoadReport {
    pub shards: Vec<ShardReport>,
}

impl LoadReport {
    pub fn totals(&self) -> LoadCounts {
        let mut totals = LoadCounts::default();
        for shard in &self.shards {
            totals.add(&shard.counts);
        }
        totals
    }

    /// Totals keyed by password length, in ascending order
    pub fn per_length(&self) -> BTreeMap<usize, LoadCounts> {
        let mut merged = BTreeMap::new();
        for shard in &self.shards {
            for (len, counts) in &shard.per_length {
                merged
                    .entry(*len)
                    .or_insert_with(LoadCounts::default)
                    .add(counts);
            }
        }
        merged
    }
}

/// Loads shard files into the per-length tables
pub struct StorageLoader<'a> {
    config: &'a RainbowConfig,
    store: &'a dyn Store,
    cancel: CancelToken,
}

impl<'a> StorageLoader<'a> {
    pub fn new(config: &'a RainbowConfig, store: &'a dyn Store) -> Self {
        Self {
            config,
            store,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Provision the schema, then load every shard in the generator folder
    pub fn run(&self) -> Result<LoadReport> {
        let config = self.config;

        let tables = {
            let mut admin = self.store.connect().map_err(Error::Connection)?;
            ensure_schema(admin.as_mut(), &config.name, config.lengths())?
        };
        let tables: FxHashMap<usize, String> = tables.into_iter().collect();

        let folder = config.generator_folder();
        let files = list_shard_files(&folder)?;
        if files.is_empty() {
            tracing::warn!(folder = %folder.display(), "no shard files to load");
            return Ok(LoadReport::default());
        }

        // One connection per running task
        let threads = files.len().min(config.job_count() + EXTRA_CONNECTIONS);
        tracing::info!(
            shards = files.len(),
            connections = threads,
            database = %config.name,
            "starting load"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("rtgen-insert-{}", i))
            .build()?;

        let results: Vec<Result<ShardReport>> = pool.install(|| {
            files
                .par_iter()
                .map(|path| self.load_shard(path, &tables))
                .collect()
        });

        let shards = first_error("load", results)?;
        let report = LoadReport { shards };
        let totals = report.totals();
        tracing::info!(
            inserted = totals.inserted,
            duplicates = totals.duplicates,
            malformed = totals.malformed,
            unroutable = totals.unroutable,
            "load finished"
        );
        Ok(report)
    }

    /// Load a single shard file over a dedicated connection
    ///
    /// Records are parsed into batches of `buff_size` rows; each batch is
    /// written in its own transaction. A failing insert stops this shard
    /// only; rows from already committed batches remain.
    pub fn load_shard(
        &self,
        path: &Path,
        tables: &FxHashMap<usize, String>,
    ) -> Result<ShardReport> {
        let mut conn = self.store.connect().map_err(Error::Connection)?;
        conn.select_database(&self.config.name)
            .map_err(Error::Connection)?;

        let mut report = ShardReport {
            path: path.to_path_buf(),
            ..ShardReport::default()
        };
        self.insert_lines(conn.as_mut(), path, tables, &mut report)?;

        if report.counts.malformed > 0 || report.counts.unroutable > 0 {
            tracing::warn!(
                path = %path.display(),
                malformed = report.counts.malformed,
                unroutable = report.counts.unroutable,
                "skipped records"
            );
        }
        tracing::debug!(
            path = %path.display(),
            inserted = report.counts.inserted,
            duplicates = report.counts.duplicates,
            "shard loaded"
        );
        Ok(report)
    }

    fn insert_lines<'t>(
        &self,
        conn: &mut dyn StoreConnection,
        path: &Path,
        tables: &'t FxHashMap<usize, String>,
        report: &mut ShardReport,
    ) -> Result<()> {
        let separator = self.config.separator_byte();
        let batch_size = self.config.buff_size;
        let mut batch: Vec<PendingRow<'t>> =
            Vec::with_capacity(batch_size.min(MAX_PREALLOCATED_ROWS) as usize);

        let read = for_each_line(path, |line| {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let record = match parse_record(line, separator) {
                Ok(record) => record,
                Err(reason) => {
                    tracing::trace!(path = %path.display(), %reason, "malformed record");
                    report.counts.malformed += 1;
                    return Ok(());
                }
            };

            let len = record.len();
            let Some(table) = tables.get(&len) else {
                report.counts.unroutable += 1;
                report.per_length.entry(len).or_default().unroutable += 1;
                return Ok(());
            };

            batch.push(PendingRow {
                table,
                len,
                seed: record.seed.to_owned(),
                terminal: record.terminal.to_owned(),
            });
            if batch.len() as u64 == batch_size {
                self.write_batch(conn, path, &mut batch, report)?;
            }
            Ok(())
        });

        // Rows already parsed are written even when reading stopped early.
        let written = self.write_batch(conn, path, &mut batch, report);
        match (read, written) {
            (Err(e), Err(write)) => {
                tracing::error!(path = %path.display(), error = %write, "final batch failed");
                Err(e)
            }
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(())) => Ok(()),
        }
    }

    /// Insert and commit one batch, then clear it
    ///
    /// Rows inserted before a failing insert are still committed.
    fn write_batch(
        &self,
        conn: &mut dyn StoreConnection,
        path: &Path,
        batch: &mut Vec<PendingRow<'_>>,
        report: &mut ShardReport,
    ) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let commit_err = |source: StoreError| Error::Commit {
            path: path.to_path_buf(),
            source,
        };

        conn.begin_batch().map_err(commit_err)?;
        let inserted = self.insert_rows(conn, batch, report);
        let committed = conn.commit_batch().map_err(commit_err);
        let rows = batch.len();
        batch.clear();

        match (inserted, committed) {
            (Err(e), Err(commit)) => {
                tracing::error!(path = %path.display(), error = %commit, "batch commit failed");
                Err(e)
            }
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(())) => {
                tracing::debug!(path = %path.display(), rows, "committed batch");
                Ok(())
            }
        }
    }

    fn insert_rows(
        &self,
        conn: &mut dyn StoreConnection,
        batch: &[PendingRow<'_>],
        report: &mut ShardReport,
    ) -> Result<()> {
        let policy = self.config.duplicate_policy;
        for row in batch {
            let insert_err = |source: StoreError| Error::Insert {
                table: row.table.to_string(),
                source,
            };
            let outcome = conn
                .insert_chain(row.table, &row.terminal, &row.seed)
                .map_err(insert_err)?;
            let counts = report.per_length.entry(row.len).or_default();
            match outcome {
                InsertOutcome::Inserted => {
                    report.counts.inserted += 1;
                    counts.inserted += 1;
                }
                InsertOutcome::Duplicate => {
                    report.counts.duplicates += 1;
                    counts.duplicates += 1;
                    if policy == DuplicatePolicy::SmallestSeed {
                        conn.keep_smallest_seed(row.table, &row.terminal, &row.seed)
                            .map_err(insert_err)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Open the configured store and load all shards
pub fn load_tables(config: &RainbowConfig) -> Result<LoadReport> {
    let store = open_store(config)?;
    StorageLoader::new(config, store.as_ref()).run()
}
