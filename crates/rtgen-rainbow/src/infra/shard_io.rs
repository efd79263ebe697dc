//! Shard file I/O operations
//!
//! Workers append whole batches of records to their own shard file; the
//! loader streams the files back line by line.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::constants::{SHARD_FILE_EXTENSION, SHARD_FILE_PREFIX};
use crate::domain::shard_format::shard_file_name;
use crate::error::{Error, Result};

#[cfg(not(feature = "mmap"))]
use std::io::{BufRead, BufReader};

#[cfg(feature = "mmap")]
use memmap2::Mmap;

/// Create the shard folder if it does not exist yet
pub fn ensure_generator_folder(dir: impl AsRef<Path>) -> Result<()> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))
}

/// Path of a worker's shard file
pub fn shard_path(dir: impl AsRef<Path>, worker: usize) -> PathBuf {
    dir.as_ref().join(shard_file_name(worker))
}

/// Parse the worker index out of a shard file name
fn shard_index(path: &Path) -> Option<usize> {
    if path.extension()? != SHARD_FILE_EXTENSION {
        return None;
    }
    path.file_stem()?
        .to_str()?
        .strip_prefix(SHARD_FILE_PREFIX)?
        .parse()
        .ok()
}

/// List shard files in `dir`, ordered by worker index
///
/// Files that do not follow the shard naming scheme are ignored.
pub fn list_shard_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut shards = Vec::new();

    for entry in fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let path = entry.path();
        let is_file = entry
            .file_type()
            .map_err(|e| Error::io(&path, e))?
            .is_file();
        if !is_file {
            continue;
        }
        if let Some(index) = shard_index(&path) {
            shards.push((index, path));
        }
    }

    shards.sort_unstable_by_key(|(index, _)| *index);
    Ok(shards.into_iter().map(|(_, path)| path).collect())
}

/// Append-only writer for one shard file
///
/// Every [`ShardWriter::write_batch`] call is one flush. Batches only ever
/// contain complete records.
pub struct ShardWriter {
    path: PathBuf,
    file: File,
    flushes: u64,
}

impl ShardWriter {
    /// Open (or create) a shard file in append mode
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::io(&path, e))?;

        Ok(Self {
            path,
            file,
            flushes: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of batches written so far
    pub fn flushes(&self) -> u64 {
        self.flushes
    }

    /// Append a batch of complete records
    pub fn write_batch(&mut self, batch: &[u8]) -> Result<()> {
        debug_assert!(batch.is_empty() || batch.ends_with(b"\n"));
        self.file
            .write_all(batch)
            .map_err(|e| Error::io(&self.path, e))?;
        self.flushes += 1;
        Ok(())
    }

    /// Flush to disk and return the number of batches written
    pub fn finish(mut self) -> Result<u64> {
        self.file.flush().map_err(|e| Error::io(&self.path, e))?;
        self.file
            .sync_data()
            .map_err(|e| Error::io(&self.path, e))?;
        Ok(self.flushes)
    }
}

/// Stream the lines of a shard file (without trailing newline)
///
/// Stops at the first error returned by `on_line`.
#[cfg(not(feature = "mmap"))]
pub fn for_each_line<F>(path: impl AsRef<Path>, mut on_line: F) -> Result<()>
where
    F: FnMut(&[u8]) -> Result<()>,
{
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut reader = BufReader::new(file);
    let mut line = Vec::with_capacity(64);

    loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .map_err(|e| Error::io(path, e))?;
        if read == 0 {
            return Ok(());
        }
        let content = line.strip_suffix(b"\n").unwrap_or(&line);
        on_line(content)?;
    }
}

/// Stream the lines of a shard file (without trailing newline)
///
/// Memory-mapped variant. Stops at the first error returned by `on_line`.
#[cfg(feature = "mmap")]
pub fn for_each_line<F>(path: impl AsRef<Path>, mut on_line: F) -> Result<()>
where
    F: FnMut(&[u8]) -> Result<()>,
{
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let len = file.metadata().map_err(|e| Error::io(path, e))?.len();
    if len == 0 {
        return Ok(());
    }

    // The shard is not written while it is being loaded.
    let mmap = unsafe { Mmap::map(&file).map_err(|e| Error::io(path, e))? };
    let data = mmap.strip_suffix(b"\n").unwrap_or(&mmap[..]);

    for content in data.split(|&c| c == b'\n') {
        on_line(content)?;
    }
    Ok(())
}

/// Read every line of a shard file into memory
pub fn read_lines(path: impl AsRef<Path>) -> Result<Vec<Vec<u8>>> {
    let mut lines = Vec::new();
    for_each_line(path, |line| {
        lines.push(line.to_vec());
        Ok(())
    })?;
    Ok(lines)
}
