//! Error types for the hydro data layer.

use thiserror::Error;

/// Result type alias using HydroError.
pub type HydroResult<T> = Result<T, HydroError>;

/// Primary error type surfaced to callers of the data layer.
///
/// Partial failures inside grid or bulk operations are not errors; they are
/// reported through the operation's status and counts.
#[derive(Debug, Error)]
pub enum HydroError {
    // === Validation Errors ===
    #[error("Invalid BBOX: {0}")]
    InvalidBbox(String),

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    // === Upstream Errors ===
    #[error("Upstream request timed out: {0}")]
    UpstreamTimeout(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    // === Cache Errors ===
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // === Infrastructure Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HydroError {
    /// Short machine-readable code for error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            HydroError::InvalidBbox(_) => "InvalidBBox",
            HydroError::InvalidParameter { .. } => "InvalidParameterValue",
            HydroError::UpstreamTimeout(_) => "UpstreamTimeout",
            HydroError::Upstream(_) => "UpstreamError",
            HydroError::CacheUnavailable(_) => "CacheUnavailable",
            HydroError::Serialization(_) | HydroError::Internal(_) => "NoApplicableCode",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            HydroError::InvalidBbox(_) | HydroError::InvalidParameter { .. } => 400,
            HydroError::Upstream(_) => 502,
            HydroError::CacheUnavailable(_) => 503,
            HydroError::UpstreamTimeout(_) => 504,
            _ => 500,
        }
    }

    pub fn invalid_parameter(param: impl Into<String>, message: impl Into<String>) -> Self {
        HydroError::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for HydroError {
    fn from(err: serde_json::Error) -> Self {
        HydroError::Serialization(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(HydroError::InvalidBbox("x".into()).http_status_code(), 400);
        assert_eq!(HydroError::UpstreamTimeout("x".into()).http_status_code(), 504);
        assert_eq!(HydroError::Upstream("x".into()).http_status_code(), 502);
        assert_eq!(HydroError::Internal("x".into()).code(), "NoApplicableCode");
    }
}
