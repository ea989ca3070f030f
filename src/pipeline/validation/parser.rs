use serde::Deserialize;
use serde_json::Value;

use super::types::{
    clamp_confidence, confidence_from_json, FieldCorrection, MissingField, ValidationResult,
    MALFORMED_RESPONSE_CONFIDENCE,
};
use super::AuditError;

/// Parse the auditor's textual response into a `ValidationResult`.
///
/// Tolerates code fences and surrounding prose. Items that fail to
/// deserialize (bad path, missing value) are dropped individually rather
/// than failing the whole response. All confidences are clamped to [0, 1].
pub fn parse_audit_response(response: &str) -> Result<ValidationResult, AuditError> {
    let object = extract_json_object(response)?;

    #[derive(Deserialize)]
    struct RawAudit {
        #[serde(default)]
        corrections: Option<Vec<Value>>,
        #[serde(default, alias = "missing_critical")]
        #[serde(rename = "missingCritical")]
        missing_critical: Option<Vec<Value>>,
        #[serde(default, alias = "missing_optional")]
        #[serde(rename = "missingOptional")]
        missing_optional: Option<Vec<Value>>,
        #[serde(default)]
        confidence: Option<Value>,
    }

    let raw: RawAudit = serde_json::from_value(object)
        .map_err(|e| AuditError::JsonParsing(e.to_string()))?;

    let mut corrections: Vec<FieldCorrection> = parse_array_lenient(raw.corrections.as_deref());
    for correction in &mut corrections {
        correction.confidence = clamp_confidence(correction.confidence);
    }

    let mut missing_critical: Vec<MissingField> =
        parse_array_lenient(raw.missing_critical.as_deref());
    for missing in &mut missing_critical {
        missing.critical = true;
    }

    let mut missing_optional: Vec<MissingField> =
        parse_array_lenient(raw.missing_optional.as_deref());
    for missing in &mut missing_optional {
        missing.critical = false;
    }

    let confidence = raw
        .confidence
        .as_ref()
        .and_then(confidence_from_json)
        .unwrap_or(MALFORMED_RESPONSE_CONFIDENCE);

    Ok(ValidationResult {
        corrections,
        missing_critical,
        missing_optional,
        confidence: clamp_confidence(confidence),
    })
}

/// Keys that mark an object as an audit. Objects with a `field` key are
/// correction or missing-field items, never the audit itself.
const AUDIT_KEYS: [&str; 6] = [
    "corrections",
    "missingCritical",
    "missing_critical",
    "missingOptional",
    "missing_optional",
    "confidence",
];

/// Locate the JSON object inside a response that may be fenced or wrapped
/// in prose.
///
/// Each `{` is tried as the start of an object; text after a complete
/// object is ignored, so braces in the surrounding prose do not spoil it.
/// The first object carrying an audit key wins, else the first object.
/// A truncated audit never falls through to one of its nested items.
pub fn extract_json_object(response: &str) -> Result<Value, AuditError> {
    let trimmed = response.trim();
    let block = fenced_block(trimmed).unwrap_or(trimmed);

    let mut first_object = None;
    let mut first_error = None;
    for (start, _) in block.match_indices('{') {
        let mut stream = serde_json::Deserializer::from_str(&block[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(Value::Object(map))) if !map.contains_key("field") => {
                if AUDIT_KEYS.iter().any(|key| map.contains_key(*key)) {
                    return Ok(Value::Object(map));
                }
                first_object.get_or_insert(Value::Object(map));
            }
            Some(Ok(_)) | None => {}
            Some(Err(e)) => {
                first_error.get_or_insert(e);
            }
        }
    }

    match (first_object, first_error) {
        (Some(object), _) => Ok(object),
        (None, Some(e)) => Err(AuditError::JsonParsing(e.to_string())),
        (None, None) => Err(AuditError::MalformedResponse(
            "No JSON object found in audit response".into(),
        )),
    }
}

/// Contents of the first ```json (or bare ```) fence, if one is closed.
fn fenced_block(text: &str) -> Option<&str> {
    let lower = text.to_ascii_lowercase();
    let (open, skip) = match lower.find("```json") {
        Some(pos) => (pos, 7),
        None => (lower.find("```")?, 3),
    };
    let body = &text[open + skip..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}

/// Parse an array leniently, skipping items that fail to deserialize.
fn parse_array_lenient<T: for<'de> Deserialize<'de>>(items: Option<&[Value]>) -> Vec<T> {
    match items {
        None => vec![],
        Some(arr) => arr
            .iter()
            .filter_map(|v| match serde_json::from_value(v.clone()) {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping unparsable audit item");
                    None
                }
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_response() -> String {
        r#"Here is my audit of the extraction:

```json
{
  "corrections": [
    {
      "field": "access.primary",
      "regexValue": null,
      "correctValue": "Right radial",
      "confidence": 0.92,
      "rationale": "Transcript states right radial access"
    },
    {
      "field": "sheathSizeFr",
      "regexValue": 5,
      "correctValue": 6,
      "confidence": 0.6
    }
  ],
  "missingCritical": [
    {"field": "intervention.vessel", "critical": true, "reason": "Target vessel not stated"}
  ],
  "missingOptional": [
    {"field": "fluoroscopyTimeMin", "reason": "Not dictated"}
  ],
  "confidence": 0.85
}
```

Let me know if you need anything else."#
            .to_string()
    }

    #[test]
    fn parses_fenced_response_with_prose() {
        let result = parse_audit_response(&full_response()).unwrap();
        assert_eq!(result.corrections.len(), 2);
        assert_eq!(result.corrections[0].field.as_str(), "access.primary");
        assert_eq!(result.corrections[0].correct_value, json!("Right radial"));
        assert_eq!(result.corrections[1].regex_value, Some(json!(5)));
        assert_eq!(result.missing_critical.len(), 1);
        assert!(result.missing_critical[0].critical);
        assert_eq!(result.missing_optional.len(), 1);
        assert!(!result.missing_optional[0].critical);
        assert!((result.confidence - 0.85).abs() < 1e-6);
    }

    #[test]
    fn parses_bare_json() {
        let result = parse_audit_response(
            r#"{"corrections": [], "missingCritical": [], "missingOptional": [], "confidence": 0.9}"#,
        )
        .unwrap();
        assert!(!result.has_findings());
        assert!((result.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn parses_unlabelled_fence() {
        let response = "```\n{\"corrections\": [], \"confidence\": 0.7}\n```";
        let result = parse_audit_response(response).unwrap();
        assert!((result.confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn parses_prose_wrapped_object_without_fence() {
        let response = "Audit result: {\"confidence\": 0.4, \"corrections\": []} end.";
        let result = parse_audit_response(response).unwrap();
        assert!((result.confidence - 0.4).abs() < 1e-6);
    }

    #[test]
    fn accepts_snake_case_keys() {
        let response = r#"{"missing_critical": [{"field": "sheathSizeFr", "reason": "absent"}], "confidence": 0.6}"#;
        let result = parse_audit_response(response).unwrap();
        assert_eq!(result.missing_critical.len(), 1);
        assert!(result.missing_critical[0].critical);
    }

    #[test]
    fn braces_in_trailing_prose_are_ignored() {
        let response = "Here is the audit: {\"corrections\": [], \"confidence\": 0.9} \
                        Fields use {dot.path} notation.";
        let result = parse_audit_response(response).unwrap();
        assert!((result.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn braces_in_leading_prose_are_skipped() {
        let response = "Audit of {extracted}:\n{\"missingCritical\": \
                        [{\"field\": \"sheathSizeFr\", \"reason\": \"absent\"}], \
                        \"confidence\": 0.9}";
        let result = parse_audit_response(response).unwrap();
        assert!((result.confidence - 0.9).abs() < 1e-6);
        assert_eq!(result.missing_critical.len(), 1);
        assert_eq!(result.missing_critical[0].field.as_str(), "sheathSizeFr");
    }

    #[test]
    fn prose_object_before_audit_does_not_win() {
        let response = r#"Template {"note": "ignore"} then {"corrections": [], "confidence": 0.3}"#;
        let result = parse_audit_response(response).unwrap();
        assert!((result.confidence - 0.3).abs() < 1e-6);
    }

    #[test]
    fn truncated_audit_does_not_promote_nested_item() {
        let response = r#"{"corrections": [{"field": "a", "correctValue": 1, "confidence": 0.95}], "confid"#;
        let result = parse_audit_response(response);
        assert!(matches!(result, Err(AuditError::JsonParsing(_))));
    }

    #[test]
    fn huge_confidences_saturate_to_one() {
        let response = r#"{"corrections": [{"field": "a", "correctValue": 1, "confidence": 1e40}], "confidence": 1e40}"#;
        let result = parse_audit_response(response).unwrap();
        assert_eq!(result.corrections.len(), 1);
        assert_eq!(result.corrections[0].confidence, 1.0);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn unparsable_text_is_malformed() {
        let result = parse_audit_response("I could not audit this record, sorry.");
        assert!(matches!(result, Err(AuditError::MalformedResponse(_))));
    }

    #[test]
    fn invalid_json_is_parse_error() {
        let result = parse_audit_response("```json\n{corrections: oops}\n```");
        assert!(matches!(result, Err(AuditError::JsonParsing(_))));
    }

    #[test]
    fn out_of_range_confidences_are_clamped() {
        let response = r#"{
            "corrections": [
                {"field": "a", "correctValue": 1, "confidence": 1.4},
                {"field": "b", "correctValue": 2, "confidence": -0.3}
            ],
            "confidence": 85
        }"#;
        let result = parse_audit_response(response).unwrap();
        assert_eq!(result.corrections[0].confidence, 1.0);
        assert_eq!(result.corrections[1].confidence, 0.0);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn string_confidence_accepted() {
        let result = parse_audit_response(r#"{"confidence": "0.75"}"#).unwrap();
        assert!((result.confidence - 0.75).abs() < 1e-6);
    }

    #[test]
    fn missing_confidence_defaults_to_neutral() {
        let result = parse_audit_response(r#"{"corrections": []}"#).unwrap();
        assert!((result.confidence - MALFORMED_RESPONSE_CONFIDENCE).abs() < f32::EPSILON);
    }

    #[test]
    fn bad_items_are_skipped_individually() {
        let response = r#"{
            "corrections": [
                {"field": "access..primary", "correctValue": "x", "confidence": 0.9},
                {"field": "sheathSizeFr", "confidence": 0.9},
                {"field": "sheathSizeFr", "correctValue": 6, "confidence": 0.9}
            ],
            "missingCritical": [{"reason": "no field"}, {"field": "valve.type"}],
            "confidence": 0.8
        }"#;
        let result = parse_audit_response(response).unwrap();
        assert_eq!(result.corrections.len(), 1);
        assert_eq!(result.corrections[0].correct_value, json!(6));
        assert_eq!(result.missing_critical.len(), 1);
        assert_eq!(result.missing_critical[0].field.as_str(), "valve.type");
    }

    #[test]
    fn null_correct_value_is_kept() {
        let response = r#"{"corrections": [{"field": "dominance", "correctValue": null, "confidence": 0.9}], "confidence": 0.8}"#;
        let result = parse_audit_response(response).unwrap();
        assert_eq!(result.corrections.len(), 1);
        assert_eq!(result.corrections[0].correct_value, Value::Null);
    }
}
