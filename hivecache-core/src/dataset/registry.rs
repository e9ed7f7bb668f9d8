//! Source-dataset factory registry.
//!
//! Workers and the coordinator must agree on which dataset they are
//! caching; both resolve it by name from an explicitly populated registry
//! instead of importing factories through reflection-style module paths.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::{CacheError, Result};

use super::synthetic::SyntheticDataset;
use super::traits::SourceDataset;

/// Constructor for a source dataset.
pub type SourceFactory = dyn Fn() -> Result<Arc<dyn SourceDataset>> + Send + Sync;

/// Name-keyed collection of source-dataset factories.
#[derive(Default)]
pub struct DatasetRegistry {
    factories: HashMap<String, Arc<SourceFactory>>,
}

impl DatasetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in sources, rooted at
    /// `data_root`.
    pub fn with_builtins(data_root: &Path) -> Self {
        let mut registry = Self::new();
        let root = data_root.to_path_buf();
        registry.register("synthetic", move || {
            Ok(Arc::new(SyntheticDataset::new(root.clone(), "synthetic", 1024)))
        });
        registry
    }

    /// Registers a factory under `name`, replacing any previous entry.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn() -> Result<Arc<dyn SourceDataset>> + Send + Sync + 'static,
    ) {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Instantiates the source dataset registered under `name`.
    pub fn create(&self, name: &str) -> Result<Arc<dyn SourceDataset>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            CacheError::dataset(
                name,
                format!("not registered (available: {})", self.names().join(", ")),
            )
        })?;
        factory()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::synthetic::SyntheticDataset;

    #[test]
    fn test_register_and_create() {
        let mut registry = DatasetRegistry::new();
        registry.register("synthetic", || {
            Ok(Arc::new(SyntheticDataset::new("/tmp", "synthetic", 4)))
        });

        let dataset = registry.create("synthetic").unwrap();
        assert_eq!(dataset.name(), "synthetic");
        assert_eq!(dataset.len(), 4);
    }

    #[test]
    fn test_unknown_name() {
        let mut registry = DatasetRegistry::new();
        registry.register("synthetic", || {
            Ok(Arc::new(SyntheticDataset::new("/tmp", "synthetic", 4)))
        });

        let err = registry.create("missing").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("missing"));
        assert!(message.contains("synthetic"));
    }

    #[test]
    fn test_names_sorted() {
        let mut registry = DatasetRegistry::new();
        registry.register("zeta", || {
            Ok(Arc::new(SyntheticDataset::new("/tmp", "zeta", 1)))
        });
        registry.register("alpha", || {
            Ok(Arc::new(SyntheticDataset::new("/tmp", "alpha", 1)))
        });

        assert_eq!(registry.names(), vec!["alpha", "zeta"]);
    }
}
