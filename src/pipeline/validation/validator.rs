use std::sync::Arc;
use std::time::Duration;

use super::parser::parse_audit_response;
use super::types::{AuditClient, AuditReport, AuditRequest, AuditStatus, ValidationResult};
use super::AuditError;
use crate::pipeline::cancel::CancelToken;
use crate::record::Record;

/// Upper bound on one audit call when none is configured.
pub const DEFAULT_AUDIT_TIMEOUT: Duration = Duration::from_secs(120);

/// Audits extracted records through an `AuditClient`.
///
/// Never fails. Unavailable, timed-out and cancelled audits yield an empty
/// result at confidence 0.0; unusable responses yield one at 0.5.
pub struct Validator {
    client: Arc<dyn AuditClient>,
    timeout: Duration,
    max_retries: u32,
}

impl Validator {
    pub fn new(client: Arc<dyn AuditClient>) -> Self {
        Self {
            client,
            timeout: DEFAULT_AUDIT_TIMEOUT,
            max_retries: 0,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Extra attempts after a transient service failure. Malformed responses
    /// are never retried.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Audit `record` against `transcript`.
    pub async fn validate(&self, record: &Record, transcript: &str) -> ValidationResult {
        self.audit(record, transcript, None).await.result
    }

    /// Audit with an optional cancellation token, reporting how the audit
    /// concluded alongside the result.
    pub async fn audit(
        &self,
        record: &Record,
        transcript: &str,
        cancel: Option<&CancelToken>,
    ) -> AuditReport {
        let mut attempt = 0u32;

        loop {
            let outcome = self.call_once(record, transcript, cancel).await;
            let error = match outcome.and_then(|raw| parse_audit_response(&raw)) {
                Ok(result) => {
                    tracing::info!(
                        corrections = result.corrections.len(),
                        missing_critical = result.missing_critical.len(),
                        missing_optional = result.missing_optional.len(),
                        confidence = result.confidence,
                        "Audit completed"
                    );
                    return AuditReport {
                        result,
                        status: AuditStatus::Completed,
                    };
                }
                Err(e) => e,
            };

            if error.is_parse_failure() {
                tracing::warn!(error = %error, "Audit response unusable; continuing without findings");
                return AuditReport {
                    result: ValidationResult::malformed(),
                    status: AuditStatus::Malformed,
                };
            }

            if error.is_transient() && attempt < self.max_retries {
                attempt += 1;
                tracing::warn!(
                    error = %error,
                    attempt,
                    max_retries = self.max_retries,
                    "Audit service failed; retrying"
                );
                continue;
            }

            tracing::warn!(error = %error, "Audit unavailable; continuing without findings");
            return AuditReport {
                result: ValidationResult::unreachable(),
                status: AuditStatus::Unavailable,
            };
        }
    }

    async fn call_once(
        &self,
        record: &Record,
        transcript: &str,
        cancel: Option<&CancelToken>,
    ) -> Result<String, AuditError> {
        let request = AuditRequest {
            extracted: record,
            transcript,
        };
        let call = tokio::time::timeout(self.timeout, self.client.audit(request));

        let timed = match cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(AuditError::Cancelled),
                    timed = call => timed,
                }
            }
            None => call.await,
        };

        timed.map_err(|_| AuditError::Timeout(self.timeout))?
    }
}
