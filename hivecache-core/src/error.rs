use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for all cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Archive file could not be created, scanned, or written.
    #[error("archive error at '{path}': {message}")]
    Archive {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// A key was requested that is not present in the archive.
    /// Propagated, never recovered.
    #[error("archive entry not found: {key}")]
    KeyNotFound { key: String },

    /// A stored record failed its integrity check on read.
    #[error("archive entry '{key}' is corrupt: {message}")]
    CorruptEntry { key: String, message: String },

    /// The source dataset failed while producing an example. Fatal to the
    /// worker that hit it; the build stalls rather than completing partially.
    #[error("failed to compute example {index}: {message}")]
    Compute { index: u64, message: String },

    /// A composition-layer transform failed. Fatal, never retried.
    #[error("transform failed for example {index}: {message}")]
    Transform { index: u64, message: String },

    /// An example is missing a field that the source declared as a label.
    #[error("label key '{key}' missing from example {index}")]
    MissingLabel { key: String, index: u64 },

    /// An index outside a dataset's range was requested.
    #[error("index {index} out of range for dataset of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// Work-queue transport failure.
    #[error("queue error: {message}")]
    Queue {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Dataset-level failure (unknown registry name, unusable source).
    #[error("dataset '{name}' error: {message}")]
    Dataset { name: String, message: String },

    #[error("configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("serialization error: {message}")]
    Serialization { message: String },
}

pub type Result<T> = std::result::Result<T, CacheError>;

// Convenience constructors
impl CacheError {
    pub fn archive(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Archive {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn archive_with_source(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::Archive {
            path: path.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn key_not_found(key: impl Into<String>) -> Self {
        Self::KeyNotFound { key: key.into() }
    }

    pub fn corrupt_entry(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CorruptEntry {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn compute(index: u64, message: impl Into<String>) -> Self {
        Self::Compute {
            index,
            message: message.into(),
        }
    }

    pub fn transform(index: u64, message: impl Into<String>) -> Self {
        Self::Transform {
            index,
            message: message.into(),
        }
    }

    pub fn missing_label(key: impl Into<String>, index: u64) -> Self {
        Self::MissingLabel {
            key: key.into(),
            index,
        }
    }

    pub fn index_out_of_range(index: usize, len: usize) -> Self {
        Self::IndexOutOfRange { index, len }
    }

    pub fn queue(message: impl Into<String>) -> Self {
        Self::Queue {
            message: message.into(),
            source: None,
        }
    }

    pub fn queue_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Queue {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn dataset(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Dataset {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}
