//! Dataset traits.
//!
//! [`SourceDataset`] is the contract a dataset must satisfy to be cachable:
//! an identity (root path + unique name), a length, indexed example
//! production, and optionally a list of fields promoted into the label
//! sidecar. [`Dataset`] is the read side consumed downstream: length,
//! indexed access, and O(1) labels. The composition layer operates purely
//! on `Arc<dyn Dataset>` children.

use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::example::{Example, Labels};

/// Read-only indexable view over examples.
pub trait Dataset: Send + Sync {
    /// Number of examples.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the example at `index`.
    fn get(&self, index: usize) -> Result<Example>;

    /// Label sidecar: label key -> index-aligned value list. Each list has
    /// the same length as the dataset.
    fn labels(&self) -> Result<Arc<Labels>>;
}

/// A dataset that can be cached.
///
/// `get` may be arbitrarily expensive; the cache builder calls it exactly
/// once per index across all workers. `root` and `name` identify the
/// archive location and must be stable between runs for resume to work.
pub trait SourceDataset: Send + Sync {
    /// Root directory the archive is stored under.
    fn root(&self) -> &Path;

    /// Unique dataset identity.
    fn name(&self) -> &str;

    /// Number of examples.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Produces the example at `index`.
    fn get(&self, index: usize) -> Result<Example>;

    /// Field names collected into the label sidecar. Empty means no labels
    /// beyond the (always written) empty sidecar.
    fn in_memory_keys(&self) -> &[String] {
        &[]
    }
}
