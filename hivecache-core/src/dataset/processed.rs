//! Per-example transformation view.

use std::sync::Arc;

use crate::error::{CacheError, Result};
use crate::example::{Example, Labels};

use super::traits::Dataset;

/// A pure transform over an example's fields.
///
/// The returned mapping is partial: it holds new fields and overwrites for
/// existing ones, and is merged over the parent example.
pub type Transform = dyn Fn(&Example) -> Result<Example> + Send + Sync;

/// A dataset with a transform applied to every example on access.
///
/// Labels pass through unchanged from the parent: the transform output is
/// never re-scanned for label fields, so transforms must not alter fields
/// that are also declared labels.
pub struct ProcessedDataset {
    parent: Arc<dyn Dataset>,
    transform: Box<Transform>,
}

impl ProcessedDataset {
    pub fn new(
        parent: Arc<dyn Dataset>,
        transform: impl Fn(&Example) -> Result<Example> + Send + Sync + 'static,
    ) -> Self {
        Self {
            parent,
            transform: Box::new(transform),
        }
    }
}

impl Dataset for ProcessedDataset {
    fn len(&self) -> usize {
        self.parent.len()
    }

    fn get(&self, index: usize) -> Result<Example> {
        let mut example = self.parent.get(index)?;
        let update = (self.transform)(&example)
            .map_err(|e| CacheError::transform(index as u64, e.to_string()))?;
        example.extend(update);
        Ok(example)
    }

    fn labels(&self) -> Result<Arc<Labels>> {
        self.parent.labels()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::testing::MemoryDataset;
    use crate::example::Value;

    #[test]
    fn test_merge_keeps_parent_fields() {
        let parent = Arc::new(MemoryDataset::with_len(4));
        let processed = ProcessedDataset::new(parent.clone(), |example| {
            let doubled = example["index"].as_i64().unwrap() * 2;
            let mut update = Example::new();
            update.insert("doubled".to_string(), Value::Int(doubled));
            Ok(update)
        });

        assert_eq!(processed.len(), 4);
        let example = processed.get(3).unwrap();
        // Every parent field survives...
        for (key, value) in parent.get(3).unwrap() {
            assert_eq!(example[&key], value);
        }
        // ...plus the transform output.
        assert_eq!(example["doubled"], Value::Int(6));
    }

    #[test]
    fn test_transform_overwrites_same_named_fields() {
        let parent = Arc::new(MemoryDataset::with_len(2));
        let processed = ProcessedDataset::new(parent, |_| {
            let mut update = Example::new();
            update.insert("index".to_string(), Value::Text("overwritten".to_string()));
            Ok(update)
        });

        let example = processed.get(1).unwrap();
        assert_eq!(example["index"], Value::Text("overwritten".to_string()));
    }

    #[test]
    fn test_transform_failure_reports_index() {
        let parent = Arc::new(MemoryDataset::with_len(2));
        let processed = ProcessedDataset::new(parent, |_| {
            Err(CacheError::serialization("boom"))
        });

        let err = processed.get(1).unwrap_err();
        match err {
            CacheError::Transform { index, message } => {
                assert_eq!(index, 1);
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_fetch_failure_propagates() {
        let parent = Arc::new(MemoryDataset::with_len(2));
        let processed = ProcessedDataset::new(parent, |example| Ok(example.clone()));
        assert!(processed.get(9).is_err());
    }

    #[test]
    fn test_labels_pass_through() {
        let parent = Arc::new(MemoryDataset::with_len(3));
        let processed = ProcessedDataset::new(parent.clone(), |_| Ok(Example::new()));

        let labels = processed.labels().unwrap();
        assert_eq!(*labels, *parent.labels().unwrap());
    }
}
