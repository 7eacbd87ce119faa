//! Error types for configuration and resource client calls.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for client calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors returned by a resource or probe client, classified the way an
/// API server reports them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("too many requests: {0}")]
    TooManyRequests(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl ApiError {
    /// Credentials were rejected (typically transient while they rotate).
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Forbidden(_) | ApiError::Unauthorized(_))
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self, ApiError::TooManyRequests(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }

    /// Whether retrying the same call may succeed.
    ///
    /// Missing resources and rejected credentials are terminal.
    pub fn is_retryable(&self) -> bool {
        !(self.is_not_found() || self.is_auth())
    }

    /// Short error-class label for log fields.
    pub fn class(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::TooManyRequests(_) => "too_many_requests",
            ApiError::Timeout(_) => "timeout",
            ApiError::Other(_) => "other",
        }
    }
}

/// Errors found while validating a watchdog configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be at least 1")]
    ZeroThreshold { field: &'static str },

    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("{field} must not exceed {max:?}")]
    DurationTooLong { field: String, max: Duration },

    #[error("invalid resource name {0:?}: must be lowercase alphanumerics, '-' or '.'")]
    InvalidName(String),

    #[error("duplicate dependent resource: {0}")]
    DuplicateResource(String),

    #[error("dependent resource {0} has a precondition on itself")]
    SelfPrecondition(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(ApiError::TooManyRequests("x".into()).is_retryable());
        assert!(ApiError::Timeout("x".into()).is_retryable());
        assert!(ApiError::Other("conflict".into()).is_retryable());
        assert!(!ApiError::NotFound("x".into()).is_retryable());
        assert!(!ApiError::Forbidden("x".into()).is_retryable());
        assert!(!ApiError::Unauthorized("x".into()).is_retryable());
    }

    #[test]
    fn auth_and_throttle_flags() {
        assert!(ApiError::Unauthorized("token expired".into()).is_auth());
        assert!(!ApiError::TooManyRequests("slow down".into()).is_auth());
        assert!(ApiError::TooManyRequests("slow down".into()).is_throttled());
        assert_eq!(ApiError::Timeout("t".into()).class(), "timeout");
    }
}
