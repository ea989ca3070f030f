use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::AuditError;
use crate::record::{FieldPath, Record};

/// Confidence reported when the audit response could not be parsed.
pub const MALFORMED_RESPONSE_CONFIDENCE: f32 = 0.5;

/// Confidence reported when the audit service could not be reached.
pub const UNREACHABLE_CONFIDENCE: f32 = 0.0;

/// A value the auditor believes is wrong, with its proposed replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldCorrection {
    pub field: FieldPath,
    #[serde(default)]
    pub regex_value: Option<Value>,
    pub correct_value: Value,
    #[serde(deserialize_with = "deserialize_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub rationale: Option<String>,
}

/// A field absent from the record that the auditor considers necessary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingField {
    pub field: FieldPath,
    #[serde(default)]
    pub critical: bool,
    #[serde(default)]
    pub reason: String,
}

/// Structured audit of one extracted record.
///
/// `confidence` is the auditor's holistic score, independent of the
/// per-correction confidences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    #[serde(default)]
    pub corrections: Vec<FieldCorrection>,
    #[serde(default)]
    pub missing_critical: Vec<MissingField>,
    #[serde(default)]
    pub missing_optional: Vec<MissingField>,
    pub confidence: f32,
}

impl ValidationResult {
    /// An audit with no findings at the given confidence.
    pub fn neutral(confidence: f32) -> Self {
        Self {
            corrections: Vec::new(),
            missing_critical: Vec::new(),
            missing_optional: Vec::new(),
            confidence: clamp_confidence(confidence),
        }
    }

    /// Fallback when the service answered but the answer was unusable.
    pub fn malformed() -> Self {
        Self::neutral(MALFORMED_RESPONSE_CONFIDENCE)
    }

    /// Fallback when the service failed, timed out or was cancelled.
    pub fn unreachable() -> Self {
        Self::neutral(UNREACHABLE_CONFIDENCE)
    }

    pub fn has_findings(&self) -> bool {
        !self.corrections.is_empty()
            || !self.missing_critical.is_empty()
            || !self.missing_optional.is_empty()
    }
}

/// How the audit call concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// Response parsed into a `ValidationResult`.
    Completed,
    /// Service answered but the response was unparsable.
    Malformed,
    /// Network error, service error, timeout or cancellation.
    Unavailable,
}

/// A `ValidationResult` together with how it was obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub result: ValidationResult,
    pub status: AuditStatus,
}

/// Payload handed to the inference capability.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AuditRequest<'a> {
    pub extracted: &'a Record,
    pub transcript: &'a str,
}

/// Inference capability consumed by the validator. Returns the raw textual
/// response; parsing and fallback are the validator's job, so production and
/// test implementations share identical post-conditions.
#[async_trait]
pub trait AuditClient: Send + Sync {
    async fn audit(&self, request: AuditRequest<'_>) -> Result<String, AuditError>;
}

/// Clamp into [0, 1]. Infinities saturate; NaN becomes 0.
pub fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Read a confidence from a JSON number or numeric string ("0.8").
///
/// Clamped in `f64` before narrowing, so `1e40` is 1.0 rather than an
/// overflowed infinity.
pub fn confidence_from_json(value: &Value) -> Option<f32> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if raw.is_nan() {
        return None;
    }
    Some(raw.clamp(0.0, 1.0) as f32)
}

fn deserialize_confidence<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    confidence_from_json(&value).ok_or_else(|| {
        serde::de::Error::custom(format!("confidence must be a number, got {value}"))
    })
}
