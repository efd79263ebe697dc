//! Rainbow table related constants

// =============================================================================
// Reduction parameters
// =============================================================================

/// Output alphabet for seeds and reduced candidates (alphanumeric, mixed case)
pub const ALPHABET: &[u8; 62] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ1234567890";

/// Number of symbols in [`ALPHABET`]
pub const ALPHABET_LEN: u64 = ALPHABET.len() as u64;

/// Longest password length a table can hold (`CHAR(255)` column limit)
pub const MAX_PASSWORD_LEN: usize = 255;

/// Prime used to decorrelate adjacent indices before folding into the alphabet
pub const REDUCE_PRIME: u64 = 15_485_863;

// =============================================================================
// Configuration defaults
// =============================================================================

/// Rows buffered by a worker before a shard flush
pub const DEFAULT_BUFF_SIZE: u64 = 10_000;

/// Shard record separator
pub const DEFAULT_SEPARATOR: &str = " ";

/// Store method used when none is configured
pub const DEFAULT_METHOD: &str = "sqlite";

/// SQLite busy timeout (ms), for writers outside this process
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// MySQL server port when `hostName` has none
pub const DEFAULT_MYSQL_PORT: u16 = 3306;

/// Extra store connections allowed on top of the job count
pub const EXTRA_CONNECTIONS: usize = 3;

// =============================================================================
// File layout
// =============================================================================

/// Subdirectory of the work folder holding shard files
pub const GENERATOR_DIR: &str = "generator";

/// Shard file name prefix (`generated_<worker>.txt`)
pub const SHARD_FILE_PREFIX: &str = "generated_";

/// Shard file extension
pub const SHARD_FILE_EXTENSION: &str = "txt";

/// SQLite database file extension
pub const SQLITE_FILE_EXTENSION: &str = "sqlite3";

/// Table name prefix (`table_<length>`)
pub const TABLE_PREFIX: &str = "table_";
