use regex::Regex;
use serde::{Deserialize, Serialize};

use super::normalize::Normalizer;
use crate::pipeline::PipelineError;
use crate::record::FieldPath;

/// Serializable form of a pattern table, as loaded from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternTableSpec {
    pub fields: Vec<FieldPatternSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPatternSpec {
    pub field: String,
    pub rules: Vec<RuleSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub pattern: String,
    #[serde(default = "default_normalizer")]
    pub normalizer: Normalizer,
}

fn default_normalizer() -> Normalizer {
    Normalizer::Trim
}

/// A compiled pattern and the normalizer for its capture.
///
/// The captured value is the named group `value` if present, otherwise the
/// first capture group, otherwise the whole match.
#[derive(Debug, Clone)]
pub struct PatternRule {
    regex: Regex,
    normalizer: Normalizer,
}

impl PatternRule {
    pub fn new(pattern: &str, normalizer: Normalizer) -> Result<Self, PipelineError> {
        let regex = Regex::new(pattern)
            .map_err(|e| PipelineError::InvalidPatternTable(format!("{pattern}: {e}")))?;
        Ok(Self { regex, normalizer })
    }

    pub fn normalizer(&self) -> Normalizer {
        self.normalizer
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Raw captured text, if the pattern matches anywhere in `text`.
    pub fn capture<'t>(&self, text: &'t str) -> Option<&'t str> {
        let caps = self.regex.captures(text)?;
        let m = caps
            .name("value")
            .or_else(|| caps.get(1))
            .or_else(|| caps.get(0))?;
        Some(m.as_str())
    }
}

/// Ordered rules for one field. The first matching rule decides the value.
#[derive(Debug, Clone)]
pub struct FieldPatterns {
    pub path: FieldPath,
    pub rules: Vec<PatternRule>,
}

/// `field → ordered [(pattern, normalizer)]`, in field declaration order.
#[derive(Debug, Clone, Default)]
pub struct PatternTable {
    fields: Vec<FieldPatterns>,
}

impl PatternTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a table spec, rejecting bad paths and regexes up front.
    pub fn compile(spec: &PatternTableSpec) -> Result<Self, PipelineError> {
        let mut table = Self::new();
        for field in &spec.fields {
            let rules: Vec<(&str, Normalizer)> = field
                .rules
                .iter()
                .map(|r| (r.pattern.as_str(), r.normalizer))
                .collect();
            table = table.field(&field.field, &rules)?;
        }
        Ok(table)
    }

    /// Append a field with its ordered rules.
    pub fn field(
        mut self,
        path: &str,
        rules: &[(&str, Normalizer)],
    ) -> Result<Self, PipelineError> {
        let path = FieldPath::parse(path)?;
        let rules = rules
            .iter()
            .map(|(pattern, normalizer)| PatternRule::new(pattern, *normalizer))
            .collect::<Result<Vec<_>, _>>()?;
        self.fields.push(FieldPatterns { path, rules });
        Ok(self)
    }

    pub fn fields(&self) -> &[FieldPatterns] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Back to the serializable form (for listing built-in tables).
    pub fn to_spec(&self) -> PatternTableSpec {
        PatternTableSpec {
            fields: self
                .fields
                .iter()
                .map(|f| FieldPatternSpec {
                    field: f.path.to_string(),
                    rules: f
                        .rules
                        .iter()
                        .map(|r| RuleSpec {
                            pattern: r.pattern().to_string(),
                            normalizer: r.normalizer(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}
