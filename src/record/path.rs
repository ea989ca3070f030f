//! Dot-path addressing for nested records.
//!
//! A `FieldPath` is parsed once at the boundary (pattern tables, audit
//! responses, human overrides) so the rest of the pipeline never handles
//! malformed addresses.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::RecordError;

static SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\-]+$").expect("static regex"));

/// A validated dot-separated field address such as `access.primary`.
///
/// Segments are object keys only; a numeric segment addresses an object key,
/// not a list index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath {
    raw: String,
    segments: Vec<String>,
}

impl FieldPath {
    /// Parse a dot-path. Surrounding whitespace is ignored.
    pub fn parse(input: &str) -> Result<Self, RecordError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(RecordError::EmptyPath);
        }

        let mut segments = Vec::new();
        for segment in trimmed.split('.') {
            if segment.is_empty() {
                return Err(RecordError::EmptySegment {
                    path: trimmed.to_string(),
                });
            }
            if !SEGMENT.is_match(segment) {
                return Err(RecordError::InvalidSegment {
                    path: trimmed.to_string(),
                    segment: segment.to_string(),
                });
            }
            segments.push(segment.to_string());
        }

        Ok(Self {
            raw: trimmed.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Final key of the path (the one actually written).
    pub fn leaf(&self) -> &str {
        // Parsing guarantees at least one segment.
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// Segments leading to the leaf.
    pub fn parents(&self) -> &[String] {
        &self.segments[..self.segments.len() - 1]
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for FieldPath {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FieldPath {
    type Error = RecordError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for FieldPath {
    type Error = RecordError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.raw
    }
}
