use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::{validate_threshold, PipelineError, DEFAULT_CONFIDENCE_THRESHOLD};

/// Application-level constants
pub const APP_NAME: &str = "procscribe";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "medgemma:latest";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "procscribe=info,warn"
}

/// Runtime settings for building a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub ollama_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub threshold: f32,
    pub max_retries: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            max_retries: 0,
        }
    }
}

impl PipelineConfig {
    /// Read `PROCSCRIBE_*` variables over the defaults. Unparsable values keep
    /// the default and log a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            ollama_url: lookup("PROCSCRIBE_OLLAMA_URL").unwrap_or(defaults.ollama_url),
            model: lookup("PROCSCRIBE_MODEL").unwrap_or(defaults.model),
            timeout_secs: parse_or(&lookup, "PROCSCRIBE_TIMEOUT_SECS", defaults.timeout_secs),
            threshold: parse_or(&lookup, "PROCSCRIBE_THRESHOLD", defaults.threshold),
            max_retries: parse_or(&lookup, "PROCSCRIBE_MAX_RETRIES", defaults.max_retries),
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        validate_threshold(self.threshold)?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, "Unparsable configuration value; using default");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_local_and_cautious() {
        let config = PipelineConfig::default();
        assert_eq!(config.ollama_url, "http://localhost:11434");
        assert_eq!(config.model, "medgemma:latest");
        assert_eq!(config.timeout(), Duration::from_secs(120));
        assert!((config.threshold - 0.8).abs() < f32::EPSILON);
        assert_eq!(config.max_retries, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("PROCSCRIBE_OLLAMA_URL", "http://127.0.0.1:11500"),
            ("PROCSCRIBE_MODEL", "medgemma:4b"),
            ("PROCSCRIBE_TIMEOUT_SECS", "30"),
            ("PROCSCRIBE_THRESHOLD", " 0.9 "),
            ("PROCSCRIBE_MAX_RETRIES", "2"),
        ]));
        assert_eq!(config.ollama_url, "http://127.0.0.1:11500");
        assert_eq!(config.model, "medgemma:4b");
        assert_eq!(config.timeout_secs, 30);
        assert!((config.threshold - 0.9).abs() < f32::EPSILON);
        assert_eq!(config.max_retries, 2);
    }

    #[test]
    fn unparsable_values_fall_back() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("PROCSCRIBE_TIMEOUT_SECS", "soon"),
            ("PROCSCRIBE_MAX_RETRIES", "-1"),
        ]));
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn out_of_range_threshold_fails_validation() {
        let config = PipelineConfig::from_lookup(lookup_from(&[("PROCSCRIBE_THRESHOLD", "1.5")]));
        assert!(matches!(config.validate(), Err(PipelineError::InvalidThreshold(_))));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
        assert_eq!(APP_NAME, "procscribe");
    }
}
