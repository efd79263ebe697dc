//! SQLite store backend
//!
//! A store is a directory; every database is a `<name>.sqlite3` file inside
//! it. Database and table names are matched case-insensitively.
//!
//! SQLite admits one writer per file. Connections handed out by one
//! [`SqliteStore`] take turns on a FIFO write gate, so a task that commits and
//! immediately opens its next batch cannot starve the tasks queued behind it.
//! The busy timeout only covers writers outside this process.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use rusqlite::{Connection, ErrorCode, OpenFlags, OptionalExtension, ffi, params};

use super::{InsertOutcome, Store, StoreConnection, StoreError};
use crate::config::SqliteConfig;
use crate::constants::SQLITE_FILE_EXTENSION;

/// Ticket lock held for the duration of one write batch
#[derive(Debug, Default)]
struct WriteGate {
    tickets: Mutex<GateTickets>,
    turn: Condvar,
}

#[derive(Debug, Default)]
struct GateTickets {
    next: u64,
    serving: u64,
}

impl WriteGate {
    /// Block until every earlier caller has released the gate
    fn acquire(&self) {
        let mut tickets = self.tickets.lock();
        let ticket = tickets.next;
        tickets.next += 1;
        while tickets.serving != ticket {
            self.turn.wait(&mut tickets);
        }
    }

    fn release(&self) {
        self.tickets.lock().serving += 1;
        self.turn.notify_all();
    }
}

/// Directory-backed SQLite store
#[derive(Clone, Debug)]
pub struct SqliteStore {
    root: PathBuf,
    busy_timeout: Duration,
    /// Shared by every clone and connection of this store
    gate: Arc<WriteGate>,
}

impl SqliteStore {
    /// Open the store directory, creating it if needed
    pub fn open(config: &SqliteConfig) -> Result<Self, StoreError> {
        fs::create_dir_all(&config.directory)?;
        if !config.directory.is_dir() {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{} is not a directory", config.directory.display()),
            )));
        }

        Ok(Self {
            root: config.directory.clone(),
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
            gate: Arc::new(WriteGate::default()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of an existing database file, matched case-insensitively
    pub fn find_database(&self, name: &str) -> Result<Option<PathBuf>, StoreError> {
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            let matches = path
                .extension()
                .is_some_and(|ext| ext == SQLITE_FILE_EXTENSION)
                && path
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .is_some_and(|stem| stem.eq_ignore_ascii_case(name));
            if matches && path.is_file() {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }
}

impl Store for SqliteStore {
    fn connect(&self) -> Result<Box<dyn StoreConnection>, StoreError> {
        if !self.root.is_dir() {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("store directory {} is gone", self.root.display()),
            )));
        }
        Ok(Box::new(SqliteConnection {
            store: self.clone(),
            conn: None,
            holds_gate: false,
        }))
    }
}

/// Connection handle; the SQLite file is opened on database selection
pub struct SqliteConnection {
    store: SqliteStore,
    conn: Option<Connection>,
    holds_gate: bool,
}

impl SqliteConnection {
    fn conn(&mut self) -> Result<&mut Connection, StoreError> {
        self.conn.as_mut().ok_or(StoreError::NoDatabase)
    }

    fn release_gate(&mut self) {
        if self.holds_gate {
            self.holds_gate = false;
            self.store.gate.release();
        }
    }

    fn finish_batch(&mut self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        if conn.is_autocommit() {
            return Ok(());
        }
        if let Err(e) = conn.execute_batch("COMMIT") {
            // Leave the connection usable for the next batch
            if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                tracing::warn!(error = %rollback, "rollback after failed commit");
            }
            return Err(e.into());
        }
        Ok(())
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        // Close first so an open batch is rolled back before the next writer
        // gets its turn.
        self.conn.take();
        self.release_gate();
    }
}

fn is_duplicate_key(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == ErrorCode::ConstraintViolation
                && (e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    || e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE)
        }
        _ => false,
    }
}

impl StoreConnection for SqliteConnection {
    fn database_exists(&mut self, name: &str) -> Result<bool, StoreError> {
        Ok(self.store.find_database(name)?.is_some())
    }

    fn create_database(&mut self, name: &str) -> Result<(), StoreError> {
        if self.store.find_database(name)?.is_some() {
            return Ok(());
        }
        // A zero-length file is a valid empty SQLite database.
        let path = self
            .store
            .root
            .join(format!("{}.{}", name, SQLITE_FILE_EXTENSION));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn select_database(&mut self, name: &str) -> Result<(), StoreError> {
        let path = self
            .store
            .find_database(name)?
            .ok_or_else(|| StoreError::UnknownDatabase(name.to_string()))?;

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(self.store.busy_timeout)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        self.conn = Some(conn);
        Ok(())
    }

    fn table_exists(&mut self, name: &str) -> Result<bool, StoreError> {
        let found: Option<String> = self
            .conn()?
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND lower(name) = lower(?1)",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn execute(&mut self, sql: &str) -> Result<(), StoreError> {
        self.conn()?.execute_batch(sql)?;
        Ok(())
    }

    fn begin_batch(&mut self) -> Result<(), StoreError> {
        self.conn()?;
        if !self.holds_gate {
            self.store.gate.acquire();
            self.holds_gate = true;
        }
        let begun = self.conn()?.execute_batch("BEGIN IMMEDIATE");
        if let Err(e) = begun {
            self.release_gate();
            return Err(e.into());
        }
        Ok(())
    }

    fn commit_batch(&mut self) -> Result<(), StoreError> {
        let result = self.finish_batch();
        self.release_gate();
        result
    }

    fn insert_chain(
        &mut self,
        table: &str,
        terminal: &str,
        seed: &str,
    ) -> Result<InsertOutcome, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&format!(
            "INSERT INTO {} (terminal, seed) VALUES (?1, ?2)",
            table
        ))?;
        match stmt.execute(params![terminal, seed]) {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(e) if is_duplicate_key(&e) => Ok(InsertOutcome::Duplicate),
            Err(e) => Err(e.into()),
        }
    }

    fn keep_smallest_seed(
        &mut self,
        table: &str,
        terminal: &str,
        seed: &str,
    ) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&format!(
            "UPDATE {} SET seed = ?2 WHERE terminal = ?1 AND seed > ?2",
            table
        ))?;
        Ok(stmt.execute(params![terminal, seed])? > 0)
    }
}
