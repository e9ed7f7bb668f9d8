//! Multi-dataset concatenation with optional length balancing.

use std::sync::{Arc, Mutex};

use crate::error::{CacheError, Result};
use crate::example::{Example, Labels, Value};

use super::sub::SubDataset;
use super::traits::Dataset;

/// Field injected into every example, recording which component produced it.
pub const DATASET_INDEX_KEY: &str = "dataset_index";

/// Joins an ordered list of datasets end to end.
///
/// With balancing enabled, every component shorter than the longest is
/// wrapped in a cyclic [`SubDataset`] so all components reach the maximum
/// length before boundaries are computed.
pub struct ConcatenatedDataset {
    components: Vec<Arc<dyn Dataset>>,
    /// Cumulative component lengths; `boundaries[d]` is one past the last
    /// global index owned by component `d`.
    boundaries: Vec<usize>,
    labels: Mutex<Option<Arc<Labels>>>,
}

impl ConcatenatedDataset {
    pub fn new(components: Vec<Arc<dyn Dataset>>, balanced: bool) -> Result<Self> {
        if components.is_empty() {
            return Err(CacheError::dataset(
                "concatenated",
                "at least one component dataset is required",
            ));
        }

        let components = if balanced {
            let max_len = components.iter().map(|d| d.len()).max().unwrap_or(0);
            components
                .into_iter()
                .map(|d| {
                    if d.len() != max_len && d.len() > 0 {
                        Arc::new(SubDataset::cyclic(d, max_len)) as Arc<dyn Dataset>
                    } else {
                        d
                    }
                })
                .collect()
        } else {
            components
        };

        let mut boundaries = Vec::with_capacity(components.len());
        let mut total = 0;
        for component in &components {
            total += component.len();
            boundaries.push(total);
        }

        Ok(Self {
            components,
            boundaries,
            labels: Mutex::new(None),
        })
    }

    /// Number of component datasets.
    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    /// Resolves a global index into `(component, local index)`.
    fn locate(&self, index: usize) -> Result<(usize, usize)> {
        let total = self.len();
        if index >= total {
            return Err(CacheError::index_out_of_range(index, total));
        }
        // Smallest boundary strictly greater than the index owns it.
        let component = self.boundaries.partition_point(|&b| b <= index);
        let local = if component == 0 {
            index
        } else {
            index - self.boundaries[component - 1]
        };
        Ok((component, local))
    }
}

impl Dataset for ConcatenatedDataset {
    fn len(&self) -> usize {
        self.boundaries.last().copied().unwrap_or(0)
    }

    fn get(&self, index: usize) -> Result<Example> {
        let (component, local) = self.locate(index)?;
        let mut example = self.components[component].get(local)?;
        example.insert(
            DATASET_INDEX_KEY.to_string(),
            Value::Int(component as i64),
        );
        Ok(example)
    }

    fn labels(&self) -> Result<Arc<Labels>> {
        let mut cached = self.labels.lock().unwrap();
        if let Some(labels) = cached.as_ref() {
            return Ok(labels.clone());
        }

        let component_labels = self
            .components
            .iter()
            .map(|d| d.labels())
            .collect::<Result<Vec<_>>>()?;

        // Only keys present in every component survive concatenation.
        let mut labels = Labels::new();
        for key in component_labels[0].keys() {
            if !component_labels.iter().all(|l| l.contains_key(key)) {
                continue;
            }
            let mut joined = Vec::with_capacity(self.len());
            for component in &component_labels {
                joined.extend(component[key].iter().cloned());
            }
            labels.insert(key.clone(), joined);
        }

        let labels = Arc::new(labels);
        *cached = Some(labels.clone());
        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::testing::MemoryDataset;

    fn components(lengths: &[usize]) -> Vec<Arc<dyn Dataset>> {
        lengths
            .iter()
            .enumerate()
            .map(|(i, &len)| {
                Arc::new(MemoryDataset::with_offset(len, i * 100)) as Arc<dyn Dataset>
            })
            .collect()
    }

    #[test]
    fn test_empty_component_list_rejected() {
        assert!(ConcatenatedDataset::new(Vec::new(), false).is_err());
    }

    #[test]
    fn test_unbalanced_boundaries() {
        let concat = ConcatenatedDataset::new(components(&[3, 5]), false).unwrap();
        assert_eq!(concat.len(), 8);

        // First component owns [0, 3): local indices 0..2.
        for i in 0..3 {
            let example = concat.get(i).unwrap();
            assert_eq!(example[DATASET_INDEX_KEY], Value::Int(0));
            assert_eq!(example["index"], Value::Int(i as i64));
        }
        // get(3) maps to component 1, local index 0.
        let example = concat.get(3).unwrap();
        assert_eq!(example[DATASET_INDEX_KEY], Value::Int(1));
        assert_eq!(example["index"], Value::Int(100));

        for i in 3..8 {
            assert_eq!(concat.get(i).unwrap()[DATASET_INDEX_KEY], Value::Int(1));
        }
        assert!(concat.get(8).is_err());
    }

    #[test]
    fn test_balanced_cycles_shorter_components() {
        let concat = ConcatenatedDataset::new(components(&[3, 5]), true).unwrap();
        // Both components become length 5.
        assert_eq!(concat.len(), 10);

        // Local index 4 of the short component resolves to 4 mod 3 == 1.
        let example = concat.get(4).unwrap();
        assert_eq!(example[DATASET_INDEX_KEY], Value::Int(0));
        assert_eq!(example["index"], Value::Int(1));

        // Long component is untouched.
        let example = concat.get(9).unwrap();
        assert_eq!(example[DATASET_INDEX_KEY], Value::Int(1));
        assert_eq!(example["index"], Value::Int(104));
    }

    #[test]
    fn test_labels_concatenate_in_component_order() {
        let concat = ConcatenatedDataset::new(components(&[2, 3]), false).unwrap();
        let labels = concat.labels().unwrap();
        assert_eq!(labels["label"].len(), 5);

        let first = MemoryDataset::with_offset(2, 0).labels().unwrap();
        let second = MemoryDataset::with_offset(3, 100).labels().unwrap();
        assert_eq!(labels["label"][..2], first["label"][..]);
        assert_eq!(labels["label"][2..], second["label"][..]);
    }

    #[test]
    fn test_balanced_labels_follow_cyclic_remap() {
        let concat = ConcatenatedDataset::new(components(&[3, 5]), true).unwrap();
        let labels = concat.labels().unwrap();
        assert_eq!(labels["label"].len(), 10);

        let short = MemoryDataset::with_offset(3, 0).labels().unwrap();
        // Cycled positions repeat the short component's labels.
        assert_eq!(labels["label"][3], short["label"][0]);
        assert_eq!(labels["label"][4], short["label"][1]);
    }

    #[test]
    fn test_labels_intersect_keys() {
        let with_extra = Arc::new(MemoryDataset::with_label_keys(
            2,
            &["label", "split"],
        )) as Arc<dyn Dataset>;
        let plain = Arc::new(MemoryDataset::with_len(2)) as Arc<dyn Dataset>;

        let concat = ConcatenatedDataset::new(vec![with_extra, plain], false).unwrap();
        let labels = concat.labels().unwrap();
        assert!(labels.contains_key("label"));
        // "split" is missing from the second component, so it is dropped.
        assert!(!labels.contains_key("split"));
    }

    #[test]
    fn test_single_component() {
        let concat = ConcatenatedDataset::new(components(&[4]), false).unwrap();
        assert_eq!(concat.len(), 4);
        assert_eq!(concat.num_components(), 1);
        let example = concat.get(2).unwrap();
        assert_eq!(example[DATASET_INDEX_KEY], Value::Int(0));
    }
}
