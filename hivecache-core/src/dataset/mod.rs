//! Dataset traits, the cached-dataset facade, and the composition layer.
//!
//! The composition nodes are pure in-memory views: length and labels are
//! derived from their children, and every index passed down is translated
//! into the owning child's local index space first. Each node relays the
//! label sidecar so O(1) label access survives arbitrary composition.

mod concat;
mod facade;
mod processed;
mod registry;
mod sub;
mod synthetic;
mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use concat::{ConcatenatedDataset, DATASET_INDEX_KEY};
pub use facade::CachedDataset;
pub use processed::{ProcessedDataset, Transform};
pub use registry::{DatasetRegistry, SourceFactory};
pub use sub::SubDataset;
pub use synthetic::SyntheticDataset;
pub use traits::{Dataset, SourceDataset};
