//! Error types shared by the generation and loading stages

use std::path::PathBuf;

use crate::infra::store::StoreError;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal and per-unit failures of a table run
///
/// Malformed shard lines and duplicate terminals are not errors; they are
/// counted in the stage reports instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("unsupported storage method: {0}")]
    UnsupportedMethod(String),

    #[error("missing {method} configuration")]
    MissingStoreConfig { method: String },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store connection failed: {0}")]
    Connection(#[source] StoreError),

    #[error("schema setup failed for {object}: {source}")]
    Schema {
        object: String,
        #[source]
        source: StoreError,
    },

    #[error("insert into {table} failed: {source}")]
    Insert {
        table: String,
        #[source]
        source: StoreError,
    },

    #[error("batch commit failed for '{path}': {source}")]
    Commit {
        path: PathBuf,
        #[source]
        source: StoreError,
    },

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
