//! Shard file record format
//!
//! One record per line: `seed<SEP>terminal\n`, no header. `SEP` is a single
//! byte that never appears in the alphabet.

use crate::constants::{SHARD_FILE_EXTENSION, SHARD_FILE_PREFIX};
use crate::domain::chain::Chain;

/// Shard file name for a worker index
pub fn shard_file_name(worker: usize) -> String {
    format!("{}{}.{}", SHARD_FILE_PREFIX, worker, SHARD_FILE_EXTENSION)
}

/// Append one record (including the newline) to `buf`
pub fn write_record(buf: &mut Vec<u8>, chain: &Chain, separator: u8) {
    buf.extend_from_slice(&chain.seed);
    buf.push(separator);
    buf.extend_from_slice(&chain.terminal);
    buf.push(b'\n');
}

/// Parsed record borrowing from the line buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShardRecord<'a> {
    pub seed: &'a str,
    pub terminal: &'a str,
}

impl ShardRecord<'_> {
    /// Password length (selects the target table)
    pub fn len(&self) -> usize {
        self.seed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seed.is_empty()
    }
}

/// Why a shard line was skipped
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MalformedRecord {
    #[error("empty line")]
    Empty,

    #[error("expected 2 fields, found {0}")]
    FieldCount(usize),

    #[error("empty field")]
    EmptyField,

    #[error("field is not valid UTF-8")]
    NotText,

    #[error("field length mismatch: seed {seed}, terminal {terminal}")]
    LengthMismatch { seed: usize, terminal: usize },
}

/// Parse one line (without its trailing newline)
///
/// A trailing `\r` is ignored.
pub fn parse_record(line: &[u8], separator: u8) -> Result<ShardRecord<'_>, MalformedRecord> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.is_empty() {
        return Err(MalformedRecord::Empty);
    }

    let mut fields = line.split(|&c| c == separator);
    let (seed, terminal) = match (fields.next(), fields.next(), fields.next()) {
        (Some(seed), Some(terminal), None) => (seed, terminal),
        _ => return Err(MalformedRecord::FieldCount(line.split(|&c| c == separator).count())),
    };

    if seed.is_empty() || terminal.is_empty() {
        return Err(MalformedRecord::EmptyField);
    }
    if seed.len() != terminal.len() {
        return Err(MalformedRecord::LengthMismatch {
            seed: seed.len(),
            terminal: terminal.len(),
        });
    }

    let seed = std::str::from_utf8(seed).map_err(|_| MalformedRecord::NotText)?;
    let terminal = std::str::from_utf8(terminal).map_err(|_| MalformedRecord::NotText)?;
    Ok(ShardRecord { seed, terminal })
}
