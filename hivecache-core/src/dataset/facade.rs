//! Read-only facade over a completed archive.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::archive::{self, Archive};
use crate::config::StorageConfig;
use crate::error::{CacheError, Result};
use crate::example::{
    self, deserialize_example, deserialize_labels, example_key, Example, Labels,
};

use super::traits::{Dataset, SourceDataset};

/// Archive handle scoped to the owning process.
///
/// Handles must not be shared across fork-like boundaries, so the archive
/// is acquired for the current owner and idempotently re-acquired whenever
/// the owning process changes. Re-acquisition is transparent to callers.
struct ScopedArchive {
    path: PathBuf,
    storage: StorageConfig,
    state: Mutex<Option<(u32, Arc<Archive>)>>,
}

impl ScopedArchive {
    fn new(path: PathBuf, storage: StorageConfig) -> Self {
        Self {
            path,
            storage,
            state: Mutex::new(None),
        }
    }

    /// Returns the archive handle owned by the current process, opening a
    /// fresh one if this process has not acquired it yet.
    fn acquire(&self) -> Result<Arc<Archive>> {
        let owner = std::process::id();
        let mut state = self.state.lock().unwrap();
        if let Some((held_by, archive)) = state.as_ref() {
            if *held_by == owner {
                return Ok(archive.clone());
            }
        }
        let archive = Arc::new(Archive::open_with(&self.path, &self.storage)?);
        *state = Some((owner, archive.clone()));
        Ok(archive)
    }
}

/// Fast, randomly-addressable view over a cached dataset.
///
/// The facade never recomputes examples: `get` reads the serialized bytes
/// for the deterministic key of an index and decodes them. The wrapped
/// source is consulted for identity and length only. Callers must have run
/// the build first; reading an archive that is still being written is
/// undefined.
pub struct CachedDataset {
    source: Arc<dyn SourceDataset>,
    store_path: PathBuf,
    archive: ScopedArchive,
    labels: Mutex<Option<Arc<Labels>>>,
}

impl CachedDataset {
    /// Wraps the archive of a built source dataset.
    pub fn new(source: Arc<dyn SourceDataset>) -> Self {
        Self::with_storage(source, StorageConfig::default())
    }

    /// Wraps the archive with explicit read tuning.
    pub fn with_storage(source: Arc<dyn SourceDataset>, storage: StorageConfig) -> Self {
        let store_path = archive::store_path(source.root(), source.name());
        Self {
            archive: ScopedArchive::new(store_path.clone(), storage),
            source,
            store_path,
            labels: Mutex::new(None),
        }
    }

    /// Opens a cached dataset from its archive alone, without
    /// instantiating the original source. Useful when only the archive is
    /// available or the source constructor is expensive.
    ///
    /// The dataset length is the number of example entries in the archive.
    pub fn from_cache(root: impl Into<PathBuf>, name: impl Into<String>) -> Result<Self> {
        let source = StoredDataset::open(root.into(), name.into())?;
        Ok(Self::new(Arc::new(source)))
    }

    /// Path of the backing archive file.
    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    pub fn root(&self) -> &Path {
        self.source.root()
    }

    pub fn name(&self) -> &str {
        self.source.name()
    }
}

impl Dataset for CachedDataset {
    fn len(&self) -> usize {
        self.source.len()
    }

    fn get(&self, index: usize) -> Result<Example> {
        if index >= self.source.len() {
            return Err(CacheError::index_out_of_range(index, self.source.len()));
        }
        let archive = self.archive.acquire()?;
        let bytes = archive.read(&example_key(index as u64))?;
        deserialize_example(&bytes)
    }

    fn labels(&self) -> Result<Arc<Labels>> {
        let mut cached = self.labels.lock().unwrap();
        if let Some(labels) = cached.as_ref() {
            return Ok(labels.clone());
        }
        let archive = self.archive.acquire()?;
        let bytes = archive.read(example::LABELS_KEY)?;
        let labels = Arc::new(deserialize_labels(&bytes)?);
        *cached = Some(labels.clone());
        Ok(labels)
    }
}

/// Source stand-in backed only by an existing archive.
///
/// Carries identity and length; it cannot produce examples, so it is never
/// handed to a builder or worker.
struct StoredDataset {
    root: PathBuf,
    name: String,
    len: usize,
}

impl StoredDataset {
    fn open(root: PathBuf, name: String) -> Result<Self> {
        let path = archive::store_path(&root, &name);
        let archive = Archive::open(&path)?;
        let len = archive
            .keys()
            .filter(|k| example::parse_example_key(k).is_some())
            .count();
        Ok(Self { root, name, len })
    }
}

impl SourceDataset for StoredDataset {
    fn root(&self) -> &Path {
        &self.root
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> usize {
        self.len
    }

    fn get(&self, index: usize) -> Result<Example> {
        Err(CacheError::dataset(
            &self.name,
            format!("archive-only dataset cannot compute example {index}"),
        ))
    }
}
