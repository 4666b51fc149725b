//! Failure taxonomy for calls to the remote system.

use thiserror::Error;

/// A classified failure from a domain service or remote read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Offline, timed out, or the server failed. Eligible for queueing.
    #[error("Network error: {0}")]
    Network(String),

    /// The request was rejected as invalid.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The request conflicts with server state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The current identity may not perform this call.
    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The response body could not be decoded.
    #[error("Decoding error: {0}")]
    Decoding(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl ServiceError {
    /// True when retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Network(_) | ServiceError::Unexpected(_))
    }

    /// True when the failure means the client could not reach the server at all.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, ServiceError::Network(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Network(_) => "network",
            ServiceError::Validation(_) => "validation",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::Permission(_) => "permission",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Persistence(_) => "persistence",
            ServiceError::Decoding(_) => "decoding",
            ServiceError::Unexpected(_) => "unexpected",
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_failures_are_retryable() {
        assert!(ServiceError::Network("offline".into()).is_retryable());
        assert!(ServiceError::Unexpected("boom".into()).is_retryable());
        assert!(!ServiceError::Validation("bad".into()).is_retryable());
        assert!(!ServiceError::Conflict("dup".into()).is_retryable());
        assert!(!ServiceError::Permission("kiosk".into()).is_retryable());
    }

    #[test]
    fn test_display_includes_detail() {
        let err = ServiceError::Permission("kiosk cannot read meal logs".into());
        assert_eq!(err.to_string(), "Permission denied: kiosk cannot read meal logs");
        assert_eq!(err.kind(), "permission");
    }
}
