//! Run configuration
//!
//! A single JSON document drives both stages. Derived values (seed score,
//! core count) are resolved once at load time and never change afterwards.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use rand::Rng;
use serde::Deserialize;

use crate::constants::{
    ALPHABET, DEFAULT_BUFF_SIZE, DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_METHOD, DEFAULT_MYSQL_PORT,
    DEFAULT_SEPARATOR, GENERATOR_DIR, MAX_PASSWORD_LEN,
};
use crate::error::{Error, Result};

/// Which seed survives when two chains share a terminal
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DuplicatePolicy {
    /// Keep whichever row reached the store first
    #[default]
    FirstWriter,
    /// Keep the lexicographically smallest seed
    SmallestSeed,
}

/// SQLite store settings
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqliteConfig {
    /// Directory holding one `<name>.sqlite3` file per database
    pub directory: PathBuf,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

/// MySQL store settings
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MySqlConfig {
    /// `host` or `host:port`
    pub host_name: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl MySqlConfig {
    /// Host and TCP port, defaulting to 3306
    pub fn endpoint(&self) -> (&str, u16) {
        let host = self.host_name.trim();
        if let Some(bracketed) = host.strip_prefix('[') {
            // [v6-address] or [v6-address]:port
            return match bracketed.split_once(']') {
                Some((addr, rest)) => match rest.strip_prefix(':').map(str::parse) {
                    Some(Ok(port)) => (addr, port),
                    _ => (addr, DEFAULT_MYSQL_PORT),
                },
                None => (bracketed, DEFAULT_MYSQL_PORT),
            };
        }
        if let Some((name, port)) = host.rsplit_once(':')
            && !name.contains(':')
            && let Ok(port) = port.parse()
        {
            return (name, port);
        }
        (host, DEFAULT_MYSQL_PORT)
    }
}

impl fmt::Debug for MySqlConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MySqlConfig")
            .field("host_name", &self.host_name)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Table generation and loading configuration
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RainbowConfig {
    /// Database name
    pub name: String,
    pub hash_algorithm: String,
    pub password_min: usize,
    pub password_max: usize,
    pub chain_length: u64,
    /// Requested number of chains (see [`RainbowConfig::rows_per_job`])
    pub table_size: u64,
    #[serde(default = "default_separator")]
    pub separator: String,
    #[serde(default)]
    pub reduce_seed: String,
    /// Explicit seed score; 0 means derive it from `reduce_seed`
    #[serde(default)]
    pub seed_score: u64,
    pub work_folder: PathBuf,
    #[serde(default)]
    pub core_multiplier: Option<f64>,
    #[serde(default = "default_buff_size")]
    pub buff_size: u64,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
    #[serde(default)]
    pub sqlite_config: Option<SqliteConfig>,
    #[serde(default, rename = "mySqlConfig", alias = "mysqlConfig")]
    pub mysql_config: Option<MySqlConfig>,
    #[serde(skip, default = "num_cpus::get")]
    pub core_count: usize,
}

fn default_separator() -> String {
    DEFAULT_SEPARATOR.to_string()
}

fn default_buff_size() -> u64 {
    DEFAULT_BUFF_SIZE
}

fn default_method() -> String {
    DEFAULT_METHOD.to_string()
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Read, resolve and validate a configuration file
pub fn read_config(path: impl AsRef<Path>) -> Result<RainbowConfig> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "failed reading configuration file {}: {}",
            path.display(),
            e
        ))
    })?;
    RainbowConfig::from_json(&text)
}

/// Derive the seed score from a reduction seed string
///
/// Bytes are summed up to the first NUL; every byte after the first is also
/// XOR-ed into the running score. Returns 0 for an empty seed.
pub fn derive_seed_score(reduce_seed: &str) -> u64 {
    let mut score = 0u64;
    for (i, &c) in reduce_seed
        .as_bytes()
        .iter()
        .take_while(|&&c| c != 0)
        .enumerate()
    {
        score = score.wrapping_add(c as u64);
        if i > 0 {
            score ^= c as u64;
        }
    }
    score
}

impl RainbowConfig {
    /// Parse, resolve derived values and validate
    pub fn from_json(text: &str) -> Result<Self> {
        let mut config: RainbowConfig = serde_json::from_str(text)
            .map_err(|e| Error::Config(format!("failed parsing json configuration: {}", e)))?;
        config.resolve();
        config.validate()?;
        Ok(config)
    }

    /// Fill defaults that serde cannot express and fix the seed score
    fn resolve(&mut self) {
        if self.separator.is_empty() {
            self.separator = default_separator();
        }
        if self.buff_size == 0 {
            self.buff_size = DEFAULT_BUFF_SIZE;
        }
        if self.method.is_empty() {
            self.method = default_method();
        }
        if self.seed_score == 0 {
            self.seed_score = derive_seed_score(&self.reduce_seed);
        }
        if self.seed_score == 0 {
            self.seed_score = rand::thread_rng().r#gen();
        }
    }

    /// Check parameter consistency
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty()
            || !self
                .name
                .bytes()
                .all(|c| c.is_ascii_alphanumeric() || c == b'_')
        {
            return Err(Error::Config(format!(
                "invalid table name '{}': expected [A-Za-z0-9_]+",
                self.name
            )));
        }
        if self.password_min == 0
            || self.password_min > self.password_max
            || self.password_max > MAX_PASSWORD_LEN
        {
            return Err(Error::Config(format!(
                "invalid password length bounds: min {}, max {} (limit {})",
                self.password_min, self.password_max, MAX_PASSWORD_LEN
            )));
        }
        if self.table_size == 0 {
            return Err(Error::Config("tableSize must be greater than zero".into()));
        }
        if self.separator.is_empty() {
            return Err(Error::Config("separator must not be empty".into()));
        }
        let sep = self.separator_byte();
        if ALPHABET.contains(&sep) || sep == b'\n' || sep == b'\r' {
            return Err(Error::Config(format!(
                "separator {:?} collides with record content",
                sep as char
            )));
        }
        if let Some(m) = self.core_multiplier
            && !(m.is_finite() && m >= 0.0)
        {
            return Err(Error::Config(format!("invalid coreMultiplier: {}", m)));
        }
        if let Some(mysql) = &self.mysql_config
            && mysql.host_name.trim().is_empty()
        {
            return Err(Error::Config("mySqlConfig.hostName must not be empty".into()));
        }
        Ok(())
    }

    /// Record separator (first byte of the configured string)
    ///
    /// An empty separator reads as a space.
    pub fn separator_byte(&self) -> u8 {
        self.separator
            .as_bytes()
            .first()
            .copied()
            .unwrap_or(b' ')
    }

    /// Folder holding the shard files
    pub fn generator_folder(&self) -> PathBuf {
        self.work_folder.join(GENERATOR_DIR)
    }

    /// Number of parallel generation jobs
    ///
    /// `round(core_count * core_multiplier)`, or the raw core count when no
    /// positive multiplier is configured. Never below 1.
    pub fn job_count(&self) -> usize {
        let jobs = match self.core_multiplier {
            Some(m) if m > 0.0 => (self.core_count as f64 * m).round() as usize,
            _ => self.core_count,
        };
        jobs.max(1)
    }

    /// Rows generated by each job
    ///
    /// Floor division: `table_size % job_count` rows are not generated.
    pub fn rows_per_job(&self) -> u64 {
        self.table_size / self.job_count() as u64
    }

    /// Password lengths covered by this table
    pub fn lengths(&self) -> std::ops::RangeInclusive<usize> {
        self.password_min..=self.password_max
    }
}
