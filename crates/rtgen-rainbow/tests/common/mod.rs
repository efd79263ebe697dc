//! Shared helpers for integration tests

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rtgen_rainbow::{ALPHABET, CancelToken, RainbowConfig};
use rtgen_rainbow::infra::shard_io::{ensure_generator_folder, shard_path};
use rtgen_rainbow::infra::store::{InsertOutcome, SqliteStore, Store, StoreConnection, StoreError};
use rusqlite::Connection;
use tempfile::TempDir;

pub const DB_NAME: &str = "rainbow";

/// Work folder and SQLite directory for one test
pub struct TestEnv {
    /// Kept alive so the files are not deleted
    pub dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn work_folder(&self) -> PathBuf {
        self.dir.path().join("work")
    }

    pub fn db_folder(&self) -> PathBuf {
        self.dir.path().join("db")
    }

    /// Config with lengths `min..=max`, `jobs` workers and extra JSON fields
    pub fn config(&self, min: usize, max: usize, jobs: usize, extra: &str) -> RainbowConfig {
        let mut config = RainbowConfig::from_json(&format!(
            r#"{{
                "name": "{}",
                "hashAlgorithm": "sha-256",
                "passwordMin": {},
                "passwordMax": {},
                "chainLength": 3,
                "tableSize": 8,
                "seedScore": 4242,
                "workFolder": {:?},
                "sqliteConfig": {{ "directory": {:?}, "busyTimeoutMs": 10000 }}{}
            }}"#,
            DB_NAME,
            min,
            max,
            self.work_folder(),
            self.db_folder(),
            extra
        ))
        .expect("Invalid test config");
        config.core_count = jobs;
        config
    }

    pub fn store(&self, config: &RainbowConfig) -> SqliteStore {
        SqliteStore::open(config.sqlite_config.as_ref().expect("sqlite config"))
            .expect("Failed to open store")
    }

    /// Write raw shard contents for a worker index
    pub fn write_shard(&self, config: &RainbowConfig, worker: usize, contents: &str) -> PathBuf {
        ensure_generator_folder(config.generator_folder()).expect("Failed to create folder");
        let path = shard_path(config.generator_folder(), worker);
        fs::write(&path, contents).expect("Failed to write shard");
        path
    }

    pub fn open_db(&self) -> Connection {
        Connection::open(self.db_folder().join(format!("{}.sqlite3", DB_NAME)))
            .expect("Failed to open database")
    }

    pub fn count_rows(&self, table: &str) -> u64 {
        let count: i64 = self
            .open_db()
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })
            .expect("Failed to count rows");
        count as u64
    }

    pub fn seed_for(&self, table: &str, terminal: &str) -> Option<String> {
        self.open_db()
            .query_row(
                &format!("SELECT seed FROM {} WHERE terminal = ?1", table),
                [terminal],
                |row| row.get(0),
            )
            .ok()
    }

    pub fn rows(&self, table: &str) -> Vec<(String, String)> {
        let db = self.open_db();
        let mut stmt = db
            .prepare(&format!("SELECT seed, terminal FROM {} ORDER BY terminal", table))
            .expect("Failed to prepare");
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .expect("Failed to query")
            .collect::<Result<_, _>>()
            .expect("Failed to read rows")
    }
}

/// Distinct fixed-width alphanumeric string for `n`
pub fn word(mut n: usize, len: usize) -> String {
    let mut out = vec![b'a'; len];
    for slot in out.iter_mut().rev() {
        *slot = ALPHABET[n % ALPHABET.len()];
        n /= ALPHABET.len();
    }
    String::from_utf8(out).expect("alphabet is ASCII")
}

/// `rows` records of length 4 with distinct terminals, offset by `first`
pub fn shard_contents(first: usize, rows: usize) -> String {
    (first..first + rows)
        .map(|i| format!("{} {}\n", word(i, 4), word(i + 1_000_000, 4)))
        .collect()
}

pub fn line_count(path: &Path) -> usize {
    fs::read_to_string(path)
        .expect("Failed to read shard")
        .lines()
        .count()
}

// =============================================================================
// Store that fails inserts for one seed
// =============================================================================

pub struct PoisonedStore {
    pub inner: SqliteStore,
    pub poison_seed: String,
}

struct PoisonedConnection {
    inner: Box<dyn StoreConnection>,
    poison_seed: String,
}

impl Store for PoisonedStore {
    fn connect(&self) -> Result<Box<dyn StoreConnection>, StoreError> {
        Ok(Box::new(PoisonedConnection {
            inner: self.inner.connect()?,
            poison_seed: self.poison_seed.clone(),
        }))
    }
}

impl StoreConnection for PoisonedConnection {
    fn database_exists(&mut self, name: &str) -> Result<bool, StoreError> {
        self.inner.database_exists(name)
    }

    fn create_database(&mut self, name: &str) -> Result<(), StoreError> {
        self.inner.create_database(name)
    }

    fn select_database(&mut self, name: &str) -> Result<(), StoreError> {
        self.inner.select_database(name)
    }

    fn table_exists(&mut self, name: &str) -> Result<bool, StoreError> {
        self.inner.table_exists(name)
    }

    fn execute(&mut self, sql: &str) -> Result<(), StoreError> {
        self.inner.execute(sql)
    }

    fn begin_batch(&mut self) -> Result<(), StoreError> {
        self.inner.begin_batch()
    }

    fn commit_batch(&mut self) -> Result<(), StoreError> {
        self.inner.commit_batch()
    }

    fn insert_chain(
        &mut self,
        table: &str,
        terminal: &str,
        seed: &str,
    ) -> Result<InsertOutcome, StoreError> {
        if seed == self.poison_seed {
            return Err(StoreError::Other(format!("rejected seed {}", seed)));
        }
        self.inner.insert_chain(table, terminal, seed)
    }

    fn keep_smallest_seed(
        &mut self,
        table: &str,
        terminal: &str,
        seed: &str,
    ) -> Result<bool, StoreError> {
        self.inner.keep_smallest_seed(table, terminal, seed)
    }
}

// =============================================================================
// Store that cancels the run after a number of inserts
// =============================================================================

pub struct CancellingStore {
    pub inner: SqliteStore,
    pub cancel: CancelToken,
    pub after: u64,
    pub inserts: Arc<AtomicU64>,
}

impl CancellingStore {
    pub fn new(inner: SqliteStore, cancel: CancelToken, after: u64) -> Self {
        Self {
            inner,
            cancel,
            after,
            inserts: Arc::new(AtomicU64::new(0)),
        }
    }
}

struct CancellingConnection {
    inner: Box<dyn StoreConnection>,
    cancel: CancelToken,
    after: u64,
    inserts: Arc<AtomicU64>,
}

impl Store for CancellingStore {
    fn connect(&self) -> Result<Box<dyn StoreConnection>, StoreError> {
        Ok(Box::new(CancellingConnection {
            inner: self.inner.connect()?,
            cancel: self.cancel.clone(),
            after: self.after,
            inserts: Arc::clone(&self.inserts),
        }))
    }
}

impl StoreConnection for CancellingConnection {
    fn database_exists(&mut self, name: &str) -> Result<bool, StoreError> {
        self.inner.database_exists(name)
    }

    fn create_database(&mut self, name: &str) -> Result<(), StoreError> {
        self.inner.create_database(name)
    }

    fn select_database(&mut self, name: &str) -> Result<(), StoreError> {
        self.inner.select_database(name)
    }

    fn table_exists(&mut self, name: &str) -> Result<bool, StoreError> {
        self.inner.table_exists(name)
    }

    fn execute(&mut self, sql: &str) -> Result<(), StoreError> {
        self.inner.execute(sql)
    }

    fn begin_batch(&mut self) -> Result<(), StoreError> {
        self.inner.begin_batch()
    }

    fn commit_batch(&mut self) -> Result<(), StoreError> {
        self.inner.commit_batch()
    }

    fn insert_chain(
        &mut self,
        table: &str,
        terminal: &str,
        seed: &str,
    ) -> Result<InsertOutcome, StoreError> {
        let outcome = self.inner.insert_chain(table, terminal, seed)?;
        if self.inserts.fetch_add(1, Ordering::SeqCst) + 1 == self.after {
            self.cancel.cancel();
        }
        Ok(outcome)
    }

    fn keep_smallest_seed(
        &mut self,
        table: &str,
        terminal: &str,
        seed: &str,
    ) -> Result<bool, StoreError> {
        self.inner.keep_smallest_seed(table, terminal, seed)
    }
}
