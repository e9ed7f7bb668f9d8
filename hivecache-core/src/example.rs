//! Example data model and archive key scheme.
//!
//! An example is a mapping of field names to values, produced by a source
//! dataset at one integer index. Values are self-describing so that any
//! nesting of scalars, blobs, lists, and maps survives the serialization
//! round trip through the archive.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// A single field value inside an example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }
}

/// One example: field name -> value.
pub type Example = BTreeMap<String, Value>;

/// Label sidecar contents: label key -> index-aligned value list.
pub type Labels = BTreeMap<String, Vec<Value>>;

/// Reserved archive key holding the serialized label sidecar.
pub const LABELS_KEY: &str = "labels.p";

const EXAMPLE_KEY_PREFIX: &str = "example_";
const EXAMPLE_KEY_SUFFIX: &str = ".p";

/// Archive key for the example at `index`.
pub fn example_key(index: u64) -> String {
    format!("{EXAMPLE_KEY_PREFIX}{index}{EXAMPLE_KEY_SUFFIX}")
}

/// Parses an archive key back into an example index.
///
/// Returns `None` for keys outside the example scheme (e.g. the label
/// sidecar).
pub fn parse_example_key(key: &str) -> Option<u64> {
    key.strip_prefix(EXAMPLE_KEY_PREFIX)?
        .strip_suffix(EXAMPLE_KEY_SUFFIX)?
        .parse()
        .ok()
}

/// Serializes an example into its archive byte form.
pub fn serialize_example(example: &Example) -> Result<Vec<u8>> {
    bincode::serialize(example)
        .map_err(|e| CacheError::serialization(format!("failed to serialize example: {e}")))
}

/// Deserializes an example from its archive byte form.
pub fn deserialize_example(bytes: &[u8]) -> Result<Example> {
    bincode::deserialize(bytes)
        .map_err(|e| CacheError::serialization(format!("failed to deserialize example: {e}")))
}

/// Serializes the label sidecar.
pub fn serialize_labels(labels: &Labels) -> Result<Vec<u8>> {
    bincode::serialize(labels)
        .map_err(|e| CacheError::serialization(format!("failed to serialize labels: {e}")))
}

/// Deserializes the label sidecar.
pub fn deserialize_labels(bytes: &[u8]) -> Result<Labels> {
    bincode::deserialize(bytes)
        .map_err(|e| CacheError::serialization(format!("failed to deserialize labels: {e}")))
}
