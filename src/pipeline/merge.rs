use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::{FieldPath, Record};

/// Human-confirmed values keyed by dot-path, supplied on resume.
///
/// Keys stay raw strings so a single bad path from the UI does not reject
/// the whole set; invalid paths are skipped at merge time.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserOverrides(BTreeMap<String, Value>);

impl UserOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<String>, value: Value) -> Self {
        self.insert(path, value);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, value: Value) {
        self.0.insert(path.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl From<BTreeMap<String, Value>> for UserOverrides {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for UserOverrides {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Why an override was not written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    EmptyValue,
    InvalidPath,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedOverride {
    pub path: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeReport {
    pub record: Record,
    pub applied: Vec<FieldPath>,
    pub skipped: Vec<SkippedOverride>,
}

/// Copy of `record` with every non-empty override written at its path.
pub fn merge_overrides(record: &Record, overrides: &UserOverrides) -> Record {
    merge_overrides_with_report(record, overrides).record
}

/// Overrides outrank extracted and corrected values. Null and
/// empty/whitespace strings are no-ops, never deletions.
pub fn merge_overrides_with_report(record: &Record, overrides: &UserOverrides) -> MergeReport {
    let mut merged = record.clone();
    let mut applied = Vec::new();
    let mut skipped = Vec::new();

    for (raw_path, value) in overrides.iter() {
        if is_empty_override(value) {
            skipped.push(SkippedOverride {
                path: raw_path.clone(),
                reason: SkipReason::EmptyValue,
            });
            continue;
        }

        let path = match FieldPath::parse(raw_path) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping override with invalid path");
                skipped.push(SkippedOverride {
                    path: raw_path.clone(),
                    reason: SkipReason::InvalidPath,
                });
                continue;
            }
        };

        merged.set(&path, value.clone());
        applied.push(path);
    }

    tracing::debug!(
        applied = applied.len(),
        skipped = skipped.len(),
        "User overrides merged"
    );

    MergeReport {
        record: merged,
        applied,
        skipped,
    }
}

fn is_empty_override(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}
