//! Error types for upstream providers.

use std::time::Duration;

use thiserror::Error;

use hydro_common::HydroError;

/// Errors that can occur when calling an upstream provider.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {status}")]
    Http { status: u16 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl UpstreamError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Timeouts, transport failures, 5xx and 429 are transient. Other 4xx
    /// responses and unparseable bodies are permanent: retrying the same
    /// request returns the same answer.
    pub fn is_transient(&self) -> bool {
        match self {
            UpstreamError::Timeout(_) | UpstreamError::Transport(_) => true,
            UpstreamError::Http { status } => *status == 429 || *status >= 500,
            UpstreamError::Parse(_) => false,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout(Duration::ZERO)
        } else if let Some(status) = err.status() {
            UpstreamError::Http {
                status: status.as_u16(),
            }
        } else if err.is_decode() {
            UpstreamError::Parse(err.to_string())
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for UpstreamError {
    fn from(err: serde_json::Error) -> Self {
        UpstreamError::Parse(err.to_string())
    }
}

impl From<UpstreamError> for HydroError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Timeout(_) => HydroError::UpstreamTimeout(err.to_string()),
            other => HydroError::Upstream(other.to_string()),
        }
    }
}

/// Result type for provider operations.
pub type UpstreamResult<T> = std::result::Result<T, UpstreamError>;
