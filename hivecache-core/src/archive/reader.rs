//! Read-only archive access.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use memmap2::Mmap;
use tracing::warn;

use super::format::{self, EntryLocation};
use crate::config::StorageConfig;
use crate::error::{CacheError, Result};

/// Random-access, read-only view of a completed archive.
///
/// Opening scans the file once to index every record; reads then seek (or
/// slice a memory map) directly to the payload and verify its checksum.
/// Archives must not be opened while a build is still writing them.
pub struct Archive {
    path: PathBuf,
    entries: BTreeMap<String, EntryLocation>,
    backend: ReadBackend,
}

enum ReadBackend {
    /// Memory-mapped file, used above the configured size threshold.
    Mmap(Mmap),
    /// Buffered file handle behind a lock for seek+read.
    File(Mutex<BufReader<File>>),
}

impl Archive {
    /// Opens an archive with default storage settings.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with(path, &StorageConfig::default())
    }

    /// Opens an archive with explicit storage settings.
    pub fn open_with(path: impl Into<PathBuf>, storage: &StorageConfig) -> Result<Self> {
        let path = path.into();
        let file = File::open(&path)
            .map_err(|e| CacheError::archive_with_source(&path, "failed to open archive", e))?;
        let meta = file
            .metadata()
            .map_err(|e| CacheError::archive_with_source(&path, "failed to read metadata", e))?;
        let size = meta.len();

        let mut reader = BufReader::with_capacity(storage.buffer_size, file);
        let outcome = format::scan(&mut reader, &path)?;
        if outcome.truncated {
            warn!(
                path = %path.display(),
                valid_len = outcome.valid_len,
                "archive has a torn tail record; ignoring it"
            );
        }

        let backend = if storage.use_mmap && size >= storage.mmap_threshold {
            let file = reader.into_inner();
            // SAFETY: the file is opened read-only and the map lives as
            // long as this archive handle.
            let mmap = unsafe { Mmap::map(&file) }.map_err(|e| {
                CacheError::archive_with_source(&path, "failed to memory-map archive", e)
            })?;
            ReadBackend::Mmap(mmap)
        } else {
            ReadBackend::File(Mutex::new(reader))
        };

        Ok(Self {
            path,
            entries: outcome.entries,
            backend,
        })
    }

    /// Reads and verifies the payload stored under `key`.
    pub fn read(&self, key: &str) -> Result<Vec<u8>> {
        let entry = *self
            .entries
            .get(key)
            .ok_or_else(|| CacheError::key_not_found(key))?;

        let payload = match &self.backend {
            ReadBackend::Mmap(mmap) => {
                let start = entry.offset as usize;
                let end = start + entry.len as usize;
                if end > mmap.len() {
                    return Err(CacheError::corrupt_entry(
                        key,
                        format!("record range {start}..{end} exceeds file size {}", mmap.len()),
                    ));
                }
                mmap[start..end].to_vec()
            }
            ReadBackend::File(file) => {
                let mut guard = file.lock().unwrap();
                guard.seek(SeekFrom::Start(entry.offset)).map_err(|e| {
                    CacheError::archive_with_source(&self.path, "failed to seek to record", e)
                })?;
                let mut buf = vec![0u8; entry.len as usize];
                guard.read_exact(&mut buf).map_err(|e| {
                    CacheError::archive_with_source(&self.path, "failed to read record", e)
                })?;
                buf
            }
        };

        let actual = format::checksum(&payload);
        if actual != entry.checksum {
            return Err(CacheError::corrupt_entry(
                key,
                format!(
                    "checksum mismatch: expected {:016x}, got {actual:016x}",
                    entry.checksum
                ),
            ));
        }

        Ok(payload)
    }

    /// Whether the archive contains a record for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// All keys in the archive, sorted.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of distinct keys in the archive.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
