//! Backing store abstraction
//!
//! The loading stage only needs a handful of capabilities from a relational
//! store: existence checks, statement execution, database selection and a
//! prepared insert that reports duplicate keys as a distinct outcome.

pub mod mysql;
pub mod sqlite;

use crate::config::RainbowConfig;
use crate::error::{Error, Result};

pub use self::mysql::MysqlStore;
pub use self::sqlite::SqliteStore;

/// Store-level failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    MySql(#[from] ::mysql::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no database selected")]
    NoDatabase,

    #[error("unknown database: {0}")]
    UnknownDatabase(String),

    #[error("{0}")]
    Other(String),
}

/// Result of a single chain insert
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Terminal already present; the stored row is unchanged
    Duplicate,
}

/// One open connection, owned by a single task
pub trait StoreConnection: Send {
    /// Case-insensitive database lookup
    fn database_exists(&mut self, name: &str) -> std::result::Result<bool, StoreError>;

    fn create_database(&mut self, name: &str) -> std::result::Result<(), StoreError>;

    /// Make `name` the target of subsequent statements
    fn select_database(&mut self, name: &str) -> std::result::Result<(), StoreError>;

    /// Case-insensitive table lookup in the selected database
    fn table_exists(&mut self, name: &str) -> std::result::Result<bool, StoreError>;

    fn execute(&mut self, sql: &str) -> std::result::Result<(), StoreError>;

    /// Open a write batch
    ///
    /// May block while another connection of the same store holds a batch.
    fn begin_batch(&mut self) -> std::result::Result<(), StoreError>;

    /// Commit the open write batch and let the next writer in
    fn commit_batch(&mut self) -> std::result::Result<(), StoreError>;

    /// `INSERT (terminal, seed)`, reporting a primary-key violation as
    /// [`InsertOutcome::Duplicate`]
    fn insert_chain(
        &mut self,
        table: &str,
        terminal: &str,
        seed: &str,
    ) -> std::result::Result<InsertOutcome, StoreError>;

    /// Replace the stored seed for `terminal` if `seed` sorts before it
    ///
    /// Returns whether the row changed.
    fn keep_smallest_seed(
        &mut self,
        table: &str,
        terminal: &str,
        seed: &str,
    ) -> std::result::Result<bool, StoreError>;
}

/// Connection factory
pub trait Store: Send + Sync {
    fn connect(&self) -> std::result::Result<Box<dyn StoreConnection>, StoreError>;
}

/// Open the store selected by `config.method`
pub fn open_store(config: &RainbowConfig) -> Result<Box<dyn Store>> {
    match config.method.to_ascii_lowercase().as_str() {
        "sqlite" => {
            let sqlite = config
                .sqlite_config
                .as_ref()
                .ok_or_else(|| Error::MissingStoreConfig {
                    method: config.method.clone(),
                })?;
            let store = SqliteStore::open(sqlite).map_err(Error::Connection)?;
            Ok(Box::new(store))
        }
        "mysql" => {
            let mysql = config
                .mysql_config
                .as_ref()
                .ok_or_else(|| Error::MissingStoreConfig {
                    method: config.method.clone(),
                })?;
            let store = MysqlStore::open(mysql, config.job_count()).map_err(Error::Connection)?;
            Ok(Box::new(store))
        }
        _ => Err(Error::UnsupportedMethod(config.method.clone())),
    }
}
