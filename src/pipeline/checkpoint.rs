use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::correction::validate_threshold;
use super::validation::ValidationResult;
use super::PipelineError;
use crate::record::{values_agree, FieldPath, Record};

/// Where one invocation of the pipeline stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Extracted,
    Validated,
    AwaitingInput,
    Ready,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Extracted => "EXTRACTED",
            PipelineState::Validated => "VALIDATED",
            PipelineState::AwaitingInput => "AWAITING_INPUT",
            PipelineState::Ready => "READY",
        };
        f.write_str(s)
    }
}

/// Why a field needs a human.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReviewReason {
    /// Required field is absent or blank.
    MissingCritical { reason: String },
    /// The auditor proposed a value below the auto-apply threshold and the
    /// record does not already hold it.
    LowConfidence {
        suggested: Value,
        confidence: f32,
        current: Option<Value>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub field: FieldPath,
    pub reason: ReviewReason,
}

/// Outcome of one gate evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub state: PipelineState,
    pub pending: Vec<ReviewItem>,
}

impl GateDecision {
    pub fn is_ready(&self) -> bool {
        self.state == PipelineState::Ready
    }
}

/// Decides whether a validated (or resumed) record can be finalized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Checkpoint {
    threshold: f32,
}

impl Checkpoint {
    pub fn new(threshold: f32) -> Result<Self, PipelineError> {
        Ok(Self {
            threshold: validate_threshold(threshold)?,
        })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Evaluate the gate predicate against `record`.
    pub fn evaluate(&self, record: &Record, validation: &ValidationResult) -> GateDecision {
        let pending = pending_review(record, validation, self.threshold);
        let state = if pending.is_empty() {
            PipelineState::Ready
        } else {
            PipelineState::AwaitingInput
        };
        GateDecision { state, pending }
    }

    /// Take the single gate transition out of `from`.
    ///
    /// Valid from `VALIDATED` (first pass) and `AWAITING_INPUT` (recheck after
    /// a resume). Both recompute the same predicate.
    pub fn advance(
        &self,
        from: PipelineState,
        record: &Record,
        validation: &ValidationResult,
    ) -> Result<GateDecision, PipelineError> {
        match from {
            PipelineState::Validated | PipelineState::AwaitingInput => {
                let decision = self.evaluate(record, validation);
                tracing::debug!(
                    from = %from,
                    to = %decision.state,
                    pending = decision.pending.len(),
                    "Checkpoint gate evaluated"
                );
                Ok(decision)
            }
            PipelineState::Extracted | PipelineState::Ready => {
                Err(PipelineError::InvalidTransition { from })
            }
        }
    }
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self {
            threshold: super::correction::DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

/// One-off gate evaluation at `threshold`.
pub fn evaluate_gate(
    record: &Record,
    validation: &ValidationResult,
    threshold: f32,
) -> Result<GateDecision, PipelineError> {
    Ok(Checkpoint::new(threshold)?.evaluate(record, validation))
}

/// Every unresolved item that blocks finalization, critical gaps first.
///
/// A critical field is unresolved while absent or blank. A low-confidence
/// correction is unresolved while the record's value disagrees with it; when
/// several target one path the last is the suggestion, as in correction.
pub fn pending_review(
    record: &Record,
    validation: &ValidationResult,
    threshold: f32,
) -> Vec<ReviewItem> {
    let mut pending = Vec::new();
    let mut seen_missing = BTreeSet::new();

    for missing in &validation.missing_critical {
        if !record.is_blank(&missing.field) || !seen_missing.insert(missing.field.as_str()) {
            continue;
        }
        pending.push(ReviewItem {
            field: missing.field.clone(),
            reason: ReviewReason::MissingCritical {
                reason: missing.reason.clone(),
            },
        });
    }

    let mut latest = BTreeMap::new();
    let mut order = Vec::new();
    for correction in &validation.corrections {
        if correction.confidence >= threshold {
            continue;
        }
        if latest.insert(correction.field.as_str(), correction).is_none() {
            order.push(correction.field.as_str());
        }
    }

    for correction in order.into_iter().filter_map(|field| latest.get(field).copied()) {
        let current = record.get(&correction.field);
        if values_agree(current, &correction.correct_value) {
            continue;
        }
        pending.push(ReviewItem {
            field: correction.field.clone(),
            reason: ReviewReason::LowConfidence {
                suggested: correction.correct_value.clone(),
                confidence: correction.confidence,
                current: current.cloned(),
            },
        });
    }

    pending
}
