use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Record;

/// One leaf-level difference between two records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub path: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

/// List every leaf that differs between `before` and `after`, sorted by path.
///
/// Nested objects are walked; lists and scalars are compared whole.
pub fn diff_records(before: &Record, after: &Record) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    diff_maps("", before.as_map(), after.as_map(), &mut changes);
    changes.sort_by(|a, b| a.path.cmp(&b.path));
    changes
}

fn diff_maps(
    prefix: &str,
    before: &Map<String, Value>,
    after: &Map<String, Value>,
    changes: &mut Vec<FieldChange>,
) {
    for (key, old) in before {
        let path = join(prefix, key);
        match after.get(key) {
            Some(new) => diff_values(&path, old, new, changes),
            None => changes.push(FieldChange {
                path,
                before: Some(old.clone()),
                after: None,
            }),
        }
    }

    for (key, new) in after {
        if !before.contains_key(key) {
            changes.push(FieldChange {
                path: join(prefix, key),
                before: None,
                after: Some(new.clone()),
            });
        }
    }
}

fn diff_values(path: &str, old: &Value, new: &Value, changes: &mut Vec<FieldChange>) {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => diff_maps(path, a, b, changes),
        _ if old != new => changes.push(FieldChange {
            path: path.to_string(),
            before: Some(old.clone()),
            after: Some(new.clone()),
        }),
        _ => {}
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}
