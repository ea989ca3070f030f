use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::prompt::{build_audit_prompt, AUDIT_SYSTEM_PROMPT};
use super::types::{AuditClient, AuditRequest};
use super::AuditError;

/// Ollama HTTP client that audits records with a local model.
pub struct OllamaAuditClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl OllamaAuditClient {
    /// Create a client for a loopback Ollama instance.
    ///
    /// Rejects non-local endpoints and malformed model names before any
    /// request is made.
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, AuditError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        validate_base_url(&base_url)?;
        validate_model_name(model)?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuditError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url,
            model: model.to_string(),
            client,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    format: &'a str,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[async_trait]
impl AuditClient for OllamaAuditClient {
    async fn audit(&self, request: AuditRequest<'_>) -> Result<String, AuditError> {
        let url = format!("{}/api/generate", self.base_url);
        let prompt = build_audit_prompt(request.extracted, request.transcript);
        let body = GenerateRequest {
            model: &self.model,
            prompt: &prompt,
            system: AUDIT_SYSTEM_PROMPT,
            stream: false,
            format: "json",
            options: GenerateOptions { temperature: 0.0 },
        };

        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "Sending audit request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    AuditError::Connection(self.base_url.clone())
                } else if e.is_timeout() {
                    AuditError::Timeout(self.timeout)
                } else {
                    AuditError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuditError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AuditError::ResponseParsing(e.to_string()))?;

        Ok(parsed.response)
    }
}

// ──────────────────────────────────────────────
// Endpoint validation
// ──────────────────────────────────────────────

/// Accept only loopback hosts: transcripts never leave the machine.
pub fn validate_base_url(url: &str) -> Result<(), AuditError> {
    let after_scheme = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .ok_or_else(|| AuditError::InvalidUrl(url.to_string()))?;

    let authority = after_scheme.split('/').next().unwrap_or("");
    let host = if let Some(rest) = authority.strip_prefix('[') {
        rest.split(']').next().unwrap_or("")
    } else {
        authority.split(':').next().unwrap_or("")
    };

    match host {
        "" => Err(AuditError::InvalidUrl(url.to_string())),
        "localhost" | "127.0.0.1" | "::1" => Ok(()),
        _ => Err(AuditError::NonLocalEndpoint(url.to_string())),
    }
}

static MODEL_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9._-]*(/[a-zA-Z0-9][a-zA-Z0-9._-]*)?(:[a-zA-Z0-9._-]+)?$")
        .expect("static regex")
});

/// `[namespace/]model[:tag]`, each segment starting alphanumeric.
pub fn validate_model_name(name: &str) -> Result<(), AuditError> {
    if MODEL_NAME.is_match(name) {
        Ok(())
    } else {
        Err(AuditError::InvalidModelName(name.to_string()))
    }
}

// ──────────────────────────────────────────────
// Mock
// ──────────────────────────────────────────────

/// Mock audit client: returns a configured response or error, optionally
/// after a delay, and counts calls.
pub struct MockAuditClient {
    response: Result<String, AuditError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockAuditClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: Ok(response.to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: AuditError) -> Self {
        Self {
            response: Err(error),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// A client whose service is never reachable (offline runs).
    pub fn unavailable() -> Self {
        Self::failing(AuditError::Connection("offline".to_string()))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuditClient for MockAuditClient {
    async fn audit(&self, _request: AuditRequest<'_>) -> Result<String, AuditError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.response.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    #[test]
    fn constructor_trims_trailing_slash() {
        let client =
            OllamaAuditClient::new("http://localhost:11434/", "medgemma:latest", Duration::from_secs(5))
                .unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
        assert_eq!(client.model(), "medgemma:latest");
    }

    #[test]
    fn constructor_rejects_remote_host() {
        let result = OllamaAuditClient::new("http://example.com:11434", "medgemma", Duration::from_secs(5));
        assert!(matches!(result, Err(AuditError::NonLocalEndpoint(_))));
    }

    #[test]
    fn loopback_variants_accepted() {
        assert!(validate_base_url("http://localhost:11434").is_ok());
        assert!(validate_base_url("http://127.0.0.1:11434/").is_ok());
        assert!(validate_base_url("https://[::1]:11434").is_ok());
        assert!(validate_base_url("http://localhost").is_ok());
    }

    #[test]
    fn bad_urls_rejected() {
        assert!(matches!(validate_base_url("localhost:11434"), Err(AuditError::InvalidUrl(_))));
        assert!(matches!(validate_base_url("ftp://localhost"), Err(AuditError::InvalidUrl(_))));
        assert!(matches!(validate_base_url("http://"), Err(AuditError::InvalidUrl(_))));
        assert!(matches!(
            validate_base_url("http://localhost.evil.com"),
            Err(AuditError::NonLocalEndpoint(_))
        ));
        assert!(matches!(
            validate_base_url("http://10.0.0.5:11434"),
            Err(AuditError::NonLocalEndpoint(_))
        ));
    }

    #[test]
    fn model_names() {
        assert!(validate_model_name("medgemma:latest").is_ok());
        assert!(validate_model_name("dcarrascosa/medgemma-1.5-4b-it").is_ok());
        assert!(validate_model_name("").is_err());
        assert!(validate_model_name("../etc/passwd").is_err());
        assert!(validate_model_name("a/b/c").is_err());
        assert!(validate_model_name("model; rm -rf /").is_err());
    }

    #[tokio::test]
    async fn mock_returns_configured_response_and_counts() {
        let client = MockAuditClient::new("{\"confidence\": 0.9}");
        let record = Record::new();
        let request = AuditRequest {
            extracted: &record,
            transcript: "text",
        };
        assert_eq!(client.audit(request).await.unwrap(), "{\"confidence\": 0.9}");
        assert_eq!(client.audit(request).await.unwrap(), "{\"confidence\": 0.9}");
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn unavailable_mock_fails_with_connection_error() {
        let client = MockAuditClient::unavailable();
        let record = Record::new();
        let result = client
            .audit(AuditRequest {
                extracted: &record,
                transcript: "text",
            })
            .await;
        assert!(matches!(result, Err(AuditError::Connection(_))));
    }

    #[tokio::test]
    async fn unreachable_ollama_reports_connection_error() {
        // Port 9 (discard) is not expected to host an HTTP service.
        let client =
            OllamaAuditClient::new("http://127.0.0.1:9", "medgemma", Duration::from_secs(2)).unwrap();
        let record = Record::new();
        let result = client
            .audit(AuditRequest {
                extracted: &record,
                transcript: "Right radial access.",
            })
            .await;
        assert!(result.is_err());
        assert!(result.unwrap_err().is_transient());
    }
}
