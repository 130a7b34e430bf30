use std::time::Duration;

use thiserror::Error;

/// Failures at the model endpoint boundary.
///
/// Split into transient failures, which a [`RetryingClient`](super::RetryingClient)
/// may retry, and fatal ones that are returned to the caller immediately.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Network(String),

    #[error("Rate limited by provider (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Provider server error (status {status}): {body}")]
    Server { status: u16, body: String },

    #[error("Authentication rejected (status {status}): {body}")]
    Auth { status: u16, body: String },

    #[error("Request rejected (status {status}): {body}")]
    BadRequest { status: u16, body: String },

    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),

    #[error("Giving up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<LlmError>,
    },
}

impl LlmError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited { .. } | Self::Server { .. }
        )
    }

    /// Map a non-success HTTP status and its body to an error.
    pub fn from_status(status: u16, body: String, retry_after: Option<Duration>) -> Self {
        match status {
            429 => Self::RateLimited { retry_after },
            401 | 403 => Self::Auth { status, body },
            500..=599 => Self::Server { status, body },
            _ => Self::BadRequest { status, body },
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}
