//! Deterministic pattern-based field extraction from dictated text.
//!
//! No network calls. A field whose patterns do not match, or whose first
//! matching capture fails to normalize, is simply left out of the record.

pub mod normalize;
pub mod patterns;
pub mod tables;

pub use normalize::*;
pub use patterns::*;
pub use tables::*;

use crate::record::Record;

/// Extract every field in `table` from `text` into a fresh record.
///
/// Fields are visited in table order and, per field, rules in rule order;
/// the first rule that matches wins even if its normalizer then rejects the
/// capture. Identical inputs always produce identical records.
pub fn extract(text: &str, table: &PatternTable) -> Record {
    let mut record = Record::new();
    let mut filled = 0usize;

    for field in table.fields() {
        let Some((rule, raw)) = field
            .rules
            .iter()
            .find_map(|rule| rule.capture(text).map(|raw| (rule, raw)))
        else {
            continue;
        };

        match rule.normalizer().apply(raw) {
            Some(value) => {
                record.set(&field.path, value);
                filled += 1;
            }
            None => {
                tracing::debug!(
                    field = %field.path,
                    normalizer = ?rule.normalizer(),
                    "Pattern matched but capture did not normalize; field left unset"
                );
            }
        }
    }

    tracing::debug!(
        fields_total = table.len(),
        fields_filled = filled,
        "Pattern extraction complete"
    );

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldPath;
    use serde_json::json;

    fn sample_table() -> PatternTable {
        PatternTable::new()
            .field(
                "access.primary",
                &[
                    (r"(?i)\b((?:right|left)\s+(?:radial|femoral))\b", Normalizer::Access),
                    (r"(?i)\b(radial|femoral)\s+access\b", Normalizer::Access),
                ],
            )
            .unwrap()
            .field(
                "sheathSizeFr",
                &[
                    (r"(?i)sheath\s+size\s*:?\s*(\w+)", Normalizer::Integer),
                    (r"(?i)\b(\d{1,2})\s*(?:fr|french)\b", Normalizer::Integer),
                ],
            )
            .unwrap()
            .field("findings.vessels", &[(r"(?i)disease in (?:the )?([a-z ,]+)", Normalizer::CommaList)])
            .unwrap()
    }

    fn path(s: &str) -> FieldPath {
        FieldPath::parse(s).unwrap()
    }

    #[test]
    fn extracts_nested_and_flat_fields() {
        let text = "Access via right radial with a 6 Fr sheath. Disease in the LAD, RCA";
        let record = extract(text, &sample_table());
        assert_eq!(record.get(&path("access.primary")), Some(&json!("Right radial")));
        assert_eq!(record.get(&path("sheathSizeFr")), Some(&json!(6)));
        assert_eq!(record.get(&path("findings.vessels")), Some(&json!(["LAD", "RCA"])));
    }

    #[test]
    fn first_matching_pattern_wins() {
        let text = "Femoral access was considered, then left radial used.";
        let record = extract(text, &sample_table());
        assert_eq!(record.get(&path("access.primary")), Some(&json!("Left radial")));
    }

    #[test]
    fn later_pattern_used_when_earlier_does_not_match() {
        let record = extract("Femoral access obtained.", &sample_table());
        assert_eq!(record.get(&path("access.primary")), Some(&json!("Femoral")));
    }

    #[test]
    fn failed_normalization_leaves_field_unset() {
        // The first sheath rule matches "six", which is not a number.
        let record = extract("Sheath size: six, 6 Fr", &sample_table());
        assert_eq!(record.get(&path("sheathSizeFr")), None);
    }

    #[test]
    fn no_match_yields_empty_record() {
        let record = extract("Patient comfortable, no complications.", &sample_table());
        assert!(record.is_empty());
    }

    #[test]
    fn extraction_is_idempotent() {
        let text = "Right femoral access, 7 French sheath, disease in the LAD and LCx";
        let table = sample_table();
        let a = extract(text, &table);
        let b = extract(text, &table);
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn empty_table_extracts_nothing() {
        assert!(extract("right radial 6 Fr", &PatternTable::new()).is_empty());
    }
}
