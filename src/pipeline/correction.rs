use serde::{Deserialize, Serialize};

use super::validation::FieldCorrection;
use super::PipelineError;
use crate::record::Record;

/// Minimum confidence for a correction to be applied without review.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.8;

/// Reject thresholds outside [0, 1] (including NaN).
pub fn validate_threshold(threshold: f32) -> Result<f32, PipelineError> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(PipelineError::InvalidThreshold(threshold))
    }
}

/// Corrected record plus which corrections were applied and which were
/// left for human review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionReport {
    pub record: Record,
    pub applied: Vec<FieldCorrection>,
    pub deferred: Vec<FieldCorrection>,
}

/// Copy of `record` with every correction at or above `threshold` written
/// at its path. Corrections apply in order, so the last one for a path wins.
pub fn apply_corrections(
    record: &Record,
    corrections: &[FieldCorrection],
    threshold: f32,
) -> Result<Record, PipelineError> {
    apply_corrections_with_report(record, corrections, threshold).map(|report| report.record)
}

pub fn apply_corrections_with_report(
    record: &Record,
    corrections: &[FieldCorrection],
    threshold: f32,
) -> Result<CorrectionReport, PipelineError> {
    let threshold = validate_threshold(threshold)?;

    let mut corrected = record.clone();
    let mut applied = Vec::new();
    let mut deferred = Vec::new();

    for correction in corrections {
        if correction.confidence >= threshold {
            corrected.set(&correction.field, correction.correct_value.clone());
            applied.push(correction.clone());
        } else {
            deferred.push(correction.clone());
        }
    }

    tracing::debug!(
        applied = applied.len(),
        deferred = deferred.len(),
        threshold,
        "Corrections processed"
    );

    Ok(CorrectionReport {
        record: corrected,
        applied,
        deferred,
    })
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::record::FieldPath;
    use proptest::prelude::*;
    use serde_json::Value;

    fn arb_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            (0i64..200).prop_map(Value::from),
            "[A-Za-z ]{0,10}".prop_map(Value::String),
        ]
    }

    fn arb_record() -> impl Strategy<Value = Record> {
        prop::collection::btree_map("[a-d]{1,2}", arb_leaf(), 0..5).prop_map(|m| {
            Record::from_value(Value::Object(m.into_iter().collect())).expect("object")
        })
    }

    /// Corrections whose paths never share a first segment, so each one's
    /// effect can be checked on its own.
    fn arb_corrections() -> impl Strategy<Value = Vec<FieldCorrection>> {
        prop::collection::btree_map(
            "[a-d]{1,2}",
            (prop::option::of("[a-z]{1,3}"), arb_leaf(), 0.0f32..=1.0f32),
            0..6,
        )
        .prop_map(|m| {
            m.into_iter()
                .map(|(root, (child, value, confidence))| {
                    let raw = match child {
                        Some(child) => format!("{root}.{child}"),
                        None => root,
                    };
                    FieldCorrection {
                        field: FieldPath::parse(&raw).expect("valid path"),
                        regex_value: None,
                        correct_value: value,
                        confidence,
                        rationale: None,
                    }
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn only_confident_corrections_change_the_record(
            record in arb_record(),
            corrections in arb_corrections(),
            threshold in 0.0f32..=1.0f32
        ) {
            let report = apply_corrections_with_report(&record, &corrections, threshold).unwrap();

            prop_assert_eq!(report.applied.len() + report.deferred.len(), corrections.len());
            prop_assert!(report.applied.iter().all(|c| c.confidence >= threshold));
            prop_assert!(report.deferred.iter().all(|c| c.confidence < threshold));

            for correction in &corrections {
                let now = report.record.get(&correction.field);
                if correction.confidence >= threshold {
                    prop_assert_eq!(now, Some(&correction.correct_value));
                } else {
                    prop_assert_eq!(now, record.get(&correction.field));
                }
            }

            let touched: Vec<&str> = report
                .applied
                .iter()
                .map(|c| c.field.segments()[0].as_str())
                .collect();
            for (key, value) in record.as_map() {
                if !touched.contains(&key.as_str()) {
                    prop_assert_eq!(report.record.as_map().get(key), Some(value));
                }
            }
        }

        #[test]
        fn out_of_range_threshold_always_rejected(
            corrections in arb_corrections(),
            threshold in prop_oneof![-10.0f32..-0.001f32, 1.001f32..10.0f32],
        ) {
            let result = apply_corrections(&Record::new(), &corrections, threshold);
            prop_assert!(matches!(result, Err(PipelineError::InvalidThreshold(_))));
        }
    }
}
