//! Nested clinical record with dot-path access.
//!
//! Every pipeline stage takes a `&Record` and returns a new one. Nothing in
//! the crate mutates a record it did not create.

pub mod diff;
pub mod path;

pub use diff::*;
pub use path::*;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Field path is empty")]
    EmptyPath,

    #[error("Field path '{path}' contains an empty segment")]
    EmptySegment { path: String },

    #[error("Field path '{path}' has invalid segment '{segment}'")]
    InvalidSegment { path: String, segment: String },
}

/// One procedure's extracted facts: string keys mapping to scalars, lists or
/// nested records. Keys serialize in sorted order, so equal records produce
/// byte-identical JSON.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value. Returns `None` unless the value is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value stored at `path`, if every segment resolves.
    pub fn get(&self, path: &FieldPath) -> Option<&Value> {
        let (first, rest) = path.segments().split_first()?;
        let mut current = self.0.get(first)?;
        for segment in rest {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Write `value` at `path`, creating intermediate objects as needed.
    /// A non-object value sitting where an intermediate is required is
    /// replaced by an empty object.
    pub fn set(&mut self, path: &FieldPath, value: Value) {
        let mut current = &mut self.0;
        for segment in path.parents() {
            let slot = current
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            current = match slot {
                Value::Object(map) => map,
                _ => unreachable!("slot was just made an object"),
            };
        }
        current.insert(path.leaf().to_string(), value);
    }

    /// Copy of this record with `value` written at `path`.
    pub fn with(&self, path: &FieldPath, value: Value) -> Self {
        let mut next = self.clone();
        next.set(path, value);
        next
    }

    /// True when the field is absent or holds a blank value.
    pub fn is_blank(&self, path: &FieldPath) -> bool {
        self.get(path).map_or(true, is_blank_value)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Null, whitespace-only strings, and empty lists or objects count as blank.
pub fn is_blank_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Clinical equality between a stored value and a proposed one.
///
/// Numbers compare numerically, numeric strings compare against numbers,
/// strings compare trimmed and case-insensitively. An absent field equals
/// a proposed `null`.
pub fn values_agree(current: Option<&Value>, proposed: &Value) -> bool {
    let current = match current {
        Some(v) => v,
        None => return proposed.is_null(),
    };

    match (current, proposed) {
        (Value::Number(a), Value::Number(b)) => numbers_equal(a.as_f64(), b.as_f64()),
        (Value::String(a), Value::String(b)) => a.trim().eq_ignore_ascii_case(b.trim()),
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            numbers_equal(n.as_f64(), s.trim().parse::<f64>().ok())
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_agree(Some(x), y))
        }
        _ => current == proposed,
    }
}

fn numbers_equal(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).abs() < 1e-9,
        _ => false,
    }
}
