//! Append-only key/bytes archive backing cached datasets.
//!
//! One archive file holds every serialized example of a dataset plus the
//! label sidecar. During a build a single [`ArchiveWriter`] appends
//! records; once the build finishes the file is immutable and any number
//! of [`Archive`] read handles may open it concurrently.

mod format;
mod reader;
mod writer;

pub use reader::Archive;
pub use writer::ArchiveWriter;

use std::path::{Path, PathBuf};

/// File extension for archive files.
pub const ARCHIVE_EXTENSION: &str = "cache";

/// Archive location for a dataset: `<root>/cached/<name>.cache`.
pub fn store_path(root: &Path, name: &str) -> PathBuf {
    root.join("cached").join(format!("{name}.{ARCHIVE_EXTENSION}"))
}
