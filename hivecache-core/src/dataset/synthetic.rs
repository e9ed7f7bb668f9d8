//! Deterministic synthetic source dataset.

use std::path::{Path, PathBuf};

use crate::error::{CacheError, Result};
use crate::example::{Example, Value};

use super::traits::SourceDataset;

/// Source dataset generating examples purely from their index.
///
/// Useful for smoke-testing a coordinator/worker deployment and as a
/// stand-in source in tests: computation is trivial but goes through the
/// full cache pipeline like any expensive dataset would.
pub struct SyntheticDataset {
    root: PathBuf,
    name: String,
    len: usize,
    classes: usize,
    in_memory_keys: Vec<String>,
}

impl SyntheticDataset {
    pub fn new(root: impl Into<PathBuf>, name: impl Into<String>, len: usize) -> Self {
        Self {
            root: root.into(),
            name: name.into(),
            len,
            classes: 10,
            in_memory_keys: vec!["label".to_string()],
        }
    }

    /// Number of distinct values taken by the `label` field.
    pub fn with_classes(mut self, classes: usize) -> Self {
        self.classes = classes.max(1);
        self
    }
}

impl SourceDataset for SyntheticDataset {
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
        if index >= self.len {
            return Err(CacheError::index_out_of_range(index, self.len));
        }
        let mut example = Example::new();
        example.insert("index".to_string(), Value::Int(index as i64));
        example.insert("value".to_string(), Value::Float(index as f64 * 0.5));
        example.insert(
            "label".to_string(),
            Value::Int((index % self.classes) as i64),
        );
        example.insert(
            "payload".to_string(),
            Value::Bytes(vec![(index % 256) as u8; 16]),
        );
        Ok(example)
    }

    fn in_memory_keys(&self) -> &[String] {
        &self.in_memory_keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let a = SyntheticDataset::new("/tmp", "synthetic", 8);
        let b = SyntheticDataset::new("/tmp", "synthetic", 8);
        for i in 0..8 {
            assert_eq!(a.get(i).unwrap(), b.get(i).unwrap());
        }
    }

    #[test]
    fn test_label_classes() {
        let dataset = SyntheticDataset::new("/tmp", "synthetic", 10).with_classes(3);
        assert_eq!(dataset.get(7).unwrap()["label"], Value::Int(1));
        assert_eq!(dataset.in_memory_keys(), ["label".to_string()]);
    }

    #[test]
    fn test_out_of_range() {
        let dataset = SyntheticDataset::new("/tmp", "synthetic", 2);
        assert!(dataset.get(2).is_err());
    }
}
