//! Archive writer: create-or-append, single writer.

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use super::format;
use crate::error::{CacheError, Result};

/// Sequentially appends keyed records to an archive file.
///
/// During a build exactly one writer exists; this single-writer discipline
/// is what keeps the archive consistent while many workers produce results
/// concurrently. `finish` must be called to flush and sync the file.
pub struct ArchiveWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    keys: BTreeSet<String>,
}

impl ArchiveWriter {
    /// Creates a fresh archive, truncating any existing file.
    ///
    /// Parent directories are created if they don't exist.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    CacheError::archive_with_source(
                        parent,
                        "failed to create parent directories",
                        e,
                    )
                })?;
            }
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| CacheError::archive_with_source(&path, "failed to create archive", e))?;

        let mut writer = BufWriter::new(file);
        writer
            .write_all(&format::encode_header())
            .map_err(|e| CacheError::archive_with_source(&path, "failed to write header", e))?;

        Ok(Self {
            writer,
            path,
            keys: BTreeSet::new(),
        })
    }

    /// Opens an existing archive for appending, creating it if absent.
    ///
    /// The file is scanned to index existing keys. A torn tail record left
    /// by an interrupted build is truncated away before new records are
    /// appended.
    pub fn append(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Self::create(path);
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| CacheError::archive_with_source(&path, "failed to open archive", e))?;

        let outcome = {
            let mut reader = BufReader::new(&mut file);
            format::scan(&mut reader, &path)?
        };
        if outcome.truncated {
            warn!(
                path = %path.display(),
                valid_len = outcome.valid_len,
                "truncating torn tail record left by an interrupted build"
            );
            file.set_len(outcome.valid_len).map_err(|e| {
                CacheError::archive_with_source(&path, "failed to truncate torn record", e)
            })?;
        }
        file.seek(SeekFrom::Start(outcome.valid_len))
            .map_err(|e| CacheError::archive_with_source(&path, "failed to seek to end", e))?;

        Ok(Self {
            writer: BufWriter::new(file),
            path,
            keys: outcome.entries.into_keys().collect(),
        })
    }

    /// Appends one record. Writing an existing key shadows the old record.
    pub fn write(&mut self, key: &str, payload: &[u8]) -> Result<()> {
        let record = format::encode_record(key, payload);
        self.writer
            .write_all(&record)
            .map_err(|e| CacheError::archive_with_source(&self.path, "failed to write record", e))?;
        self.keys.insert(key.to_string());
        Ok(())
    }

    /// Whether a record for `key` has been written (or pre-existed).
    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// All keys currently in the archive, sorted.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Number of distinct keys in the archive.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes buffered records and syncs the file to disk.
    pub fn finish(mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| CacheError::archive_with_source(&self.path, "failed to flush archive", e))?;

        self.writer.get_ref().sync_all().map_err(|e| {
            CacheError::archive_with_source(&self.path, "failed to sync archive to disk", e)
        })?;

        Ok(())
    }
}
