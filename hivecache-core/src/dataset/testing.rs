//! In-memory dataset used by composition-layer tests.

use std::sync::Arc;

use crate::error::{CacheError, Result};
use crate::example::{Example, Labels, Value};

use super::traits::Dataset;

/// Deterministic in-memory dataset with synthesized labels.
///
/// Examples carry an `index` field holding `offset + i`; the `label` field
/// (and label list) is `(offset + i) % 3`. Extra label keys synthesize
/// text values so key-set tests can distinguish them.
pub struct MemoryDataset {
    offset: usize,
    len: usize,
    label_keys: Vec<String>,
}

impl MemoryDataset {
    pub fn with_len(len: usize) -> Self {
        Self::with_offset(len, 0)
    }

    pub fn with_offset(len: usize, offset: usize) -> Self {
        Self {
            offset,
            len,
            label_keys: vec!["label".to_string()],
        }
    }

    pub fn with_label_keys(len: usize, keys: &[&str]) -> Self {
        Self {
            offset: 0,
            len,
            label_keys: keys.iter().map(|k| k.to_string()).collect(),
        }
    }

    fn label_value(key: &str, global: usize) -> Value {
        if key == "label" {
            Value::Int((global % 3) as i64)
        } else {
            Value::Text(format!("{key}:{global}"))
        }
    }
}

impl Dataset for MemoryDataset {
    fn len(&self) -> usize {
        self.len
    }

    fn get(&self, index: usize) -> Result<Example> {
        if index >= self.len {
            return Err(CacheError::index_out_of_range(index, self.len));
        }
        let global = self.offset + index;
        let mut example = Example::new();
        example.insert("index".to_string(), Value::Int(global as i64));
        for key in &self.label_keys {
            example.insert(key.clone(), Self::label_value(key, global));
        }
        Ok(example)
    }

    fn labels(&self) -> Result<Arc<Labels>> {
        let mut labels = Labels::new();
        for key in &self.label_keys {
            labels.insert(
                key.clone(),
                (0..self.len)
                    .map(|i| Self::label_value(key, self.offset + i))
                    .collect(),
            );
        }
        Ok(Arc::new(labels))
    }
}
