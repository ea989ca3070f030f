//! LLM audit of an extracted record against its source transcript.
//!
//! The validator never fails: service problems degrade to an empty audit at
//! confidence 0.0, unusable responses to an empty audit at 0.5.

pub mod types;
pub mod prompt;
pub mod parser;
pub mod sanitize;
pub mod ollama;
pub mod validator;

pub use types::*;
pub use prompt::*;
pub use parser::*;
pub use sanitize::*;
pub use ollama::*;
pub use validator::*;

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuditError {
    #[error("Audit service is not running at {0}")]
    Connection(String),

    #[error("Audit service returned error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Audit timed out after {0:?}")]
    Timeout(Duration),

    #[error("Audit cancelled")]
    Cancelled,

    #[error("Audit endpoint must be a loopback address: {0}")]
    NonLocalEndpoint(String),

    #[error("Invalid audit endpoint URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid model name: {0}")]
    InvalidModelName(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("JSON parsing error: {0}")]
    JsonParsing(String),

    #[error("Malformed audit response: {0}")]
    MalformedResponse(String),
}

impl AuditError {
    /// The service answered but its output could not be interpreted.
    pub fn is_parse_failure(&self) -> bool {
        matches!(
            self,
            AuditError::ResponseParsing(_)
                | AuditError::JsonParsing(_)
                | AuditError::MalformedResponse(_)
        )
    }

    /// Worth retrying: the service may answer on a second attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuditError::Connection(_)
                | AuditError::Api { .. }
                | AuditError::HttpClient(_)
                | AuditError::Timeout(_)
        )
    }
}
