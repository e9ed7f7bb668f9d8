//! Index-remapped view of a parent dataset.

use std::sync::{Arc, Mutex};

use crate::error::{CacheError, Result};
use crate::example::{Example, Labels};

use super::traits::Dataset;

/// A dataset defined by an ordered index mapping into a parent.
///
/// The mapping is this dataset's own index space: duplicates and arbitrary
/// order are allowed, so the same view type covers subsets, shuffles, and
/// the cyclic repetition used for balancing concatenations.
pub struct SubDataset {
    parent: Arc<dyn Dataset>,
    mapping: Vec<usize>,
    labels: Mutex<Option<Arc<Labels>>>,
}

impl SubDataset {
    pub fn new(parent: Arc<dyn Dataset>, mapping: Vec<usize>) -> Self {
        Self {
            parent,
            mapping,
            labels: Mutex::new(None),
        }
    }

    /// Cyclic view repeating `parent` up to `len` examples
    /// (`i -> i mod parent.len()`).
    pub fn cyclic(parent: Arc<dyn Dataset>, len: usize) -> Self {
        let parent_len = parent.len();
        let mapping = (0..len).map(|i| i % parent_len).collect();
        Self::new(parent, mapping)
    }

    fn parent_index(&self, index: usize) -> Result<usize> {
        self.mapping
            .get(index)
            .copied()
            .ok_or_else(|| CacheError::index_out_of_range(index, self.mapping.len()))
    }
}

impl Dataset for SubDataset {
    fn len(&self) -> usize {
        self.mapping.len()
    }

    fn get(&self, index: usize) -> Result<Example> {
        self.parent.get(self.parent_index(index)?)
    }

    fn labels(&self) -> Result<Arc<Labels>> {
        let mut cached = self.labels.lock().unwrap();
        if let Some(labels) = cached.as_ref() {
            return Ok(labels.clone());
        }

        let parent_labels = self.parent.labels()?;
        let mut labels = Labels::new();
        for (key, values) in parent_labels.iter() {
            let mut remapped = Vec::with_capacity(self.mapping.len());
            for &parent_index in &self.mapping {
                let value = values.get(parent_index).ok_or_else(|| {
                    CacheError::index_out_of_range(parent_index, values.len())
                })?;
                remapped.push(value.clone());
            }
            labels.insert(key.clone(), remapped);
        }

        let labels = Arc::new(labels);
        *cached = Some(labels.clone());
        Ok(labels)
    }
}
