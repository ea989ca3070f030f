use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

static DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("static regex"));
static LIST_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*(?:,|;|\band\b|&)\s*").expect("static regex"));

static SIDE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(right|left|rt|lt|r|l)\b").expect("static regex")
});
static BILATERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:bilat\w*|both)\b").expect("static regex"));
static ACCESS_VESSEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(distal\s+radial|radial|radail|femoral|femural|fem|brachial|ulnar|jugular|ij)\b")
        .expect("static regex")
});

/// Post-processing applied to a captured value before it is written.
///
/// Every normalizer returns `None` when the capture cannot be interpreted,
/// which leaves the field unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalizer {
    /// Trimmed text with internal whitespace collapsed.
    Trim,
    Lowercase,
    Uppercase,
    /// First number in the capture; a fractional one yields nothing.
    Integer,
    /// First decimal number in the capture.
    Float,
    /// Split on commas, semicolons and "and" into a list of strings.
    CommaList,
    /// Canonical vascular access, e.g. "Right radial".
    Access,
    /// yes/no style answers.
    Boolean,
    /// "Left", "Right" or "Bilateral".
    Laterality,
}

impl Normalizer {
    pub fn apply(self, raw: &str) -> Option<Value> {
        let text = collapse_whitespace(raw);
        if text.is_empty() {
            return None;
        }

        match self {
            Normalizer::Trim => Some(Value::String(text)),
            Normalizer::Lowercase => Some(Value::String(text.to_lowercase())),
            Normalizer::Uppercase => Some(Value::String(text.to_uppercase())),
            Normalizer::Integer => parse_integer(&text),
            Normalizer::Float => parse_float(&text),
            Normalizer::CommaList => split_list(&text),
            Normalizer::Access => canonical_access(&text).map(Value::String),
            Normalizer::Boolean => parse_boolean(&text).map(Value::Bool),
            Normalizer::Laterality => parse_laterality(&text).map(|s| Value::String(s.into())),
        }
    }
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_integer(text: &str) -> Option<Value> {
    let m = DECIMAL.find(text)?;
    m.as_str().parse::<i64>().ok().map(Value::from)
}

fn parse_float(text: &str) -> Option<Value> {
    let m = DECIMAL.find(text)?;
    let parsed = m.as_str().parse::<f64>().ok()?;
    Number::from_f64(parsed).map(Value::Number)
}

fn split_list(text: &str) -> Option<Value> {
    let items: Vec<Value> = LIST_SEPARATOR
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Value::String(s.to_string()))
        .collect();

    if items.is_empty() {
        None
    } else {
        Some(Value::Array(items))
    }
}

/// Canonicalize free-text access descriptions ("rt radial", "R femural",
/// "femoral approach on the left") to `"<Side> <vessel>"`. The side is
/// omitted when not stated; no vessel means no value.
fn canonical_access(text: &str) -> Option<String> {
    let vessel_match = ACCESS_VESSEL.captures(text)?;
    let vessel = match vessel_match[1].to_lowercase().as_str() {
        "radial" | "radail" => "radial",
        "femoral" | "femural" | "fem" => "femoral",
        "brachial" => "brachial",
        "ulnar" => "ulnar",
        "jugular" | "ij" => "internal jugular",
        other if other.starts_with("distal") => "distal radial",
        _ => return None,
    };

    let side = side_token(text);

    Some(match side {
        Some(side) => format!("{side} {vessel}"),
        None => capitalize(vessel),
    })
}

/// First whole-word side marker ("rt", "L", "left") in `text`.
fn side_token(text: &str) -> Option<&'static str> {
    SIDE.captures(text)
        .and_then(|c| match c[1].to_lowercase().as_str() {
            "right" | "rt" | "r" => Some("Right"),
            "left" | "lt" | "l" => Some("Left"),
            _ => None,
        })
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn parse_boolean(text: &str) -> Option<bool> {
    match text.to_lowercase().as_str() {
        "yes" | "y" | "true" | "present" | "positive" | "performed" | "done" => Some(true),
        "no" | "n" | "false" | "absent" | "negative" | "none" | "not performed" | "nil" => {
            Some(false)
        }
        _ => None,
    }
}

fn parse_laterality(text: &str) -> Option<&'static str> {
    if BILATERAL.is_match(text) {
        Some("Bilateral")
    } else {
        side_token(text)
    }
}
