//! Mapping transport outcomes onto [`ServiceError`].

use reqwest::StatusCode;

use crate::error::ServiceError;

/// Classifies a non-success HTTP status. `body` is the server's message,
/// if any, and becomes the error text.
pub fn classify_status(status: StatusCode, body: &str) -> ServiceError {
    let message = if body.trim().is_empty() {
        format!("server returned {}", status)
    } else {
        format!("{} ({})", body.trim(), status.as_u16())
    };

    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ServiceError::Validation(message)
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ServiceError::Permission(message),
        StatusCode::NOT_FOUND => ServiceError::NotFound(message),
        StatusCode::CONFLICT => ServiceError::Conflict(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            ServiceError::Network(message)
        }
        s if s.is_server_error() => ServiceError::Network(message),
        _ => ServiceError::Unexpected(message),
    }
}

/// Classifies a failure to complete a request or read its body.
pub fn classify_transport(err: &reqwest::Error) -> ServiceError {
    if err.is_decode() {
        ServiceError::Decoding(err.to_string())
    } else {
        ServiceError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(code: u16) -> &'static str {
        classify_status(StatusCode::from_u16(code).unwrap(), "").kind()
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(kind(400), "validation");
        assert_eq!(kind(422), "validation");
        assert_eq!(kind(401), "permission");
        assert_eq!(kind(403), "permission");
        assert_eq!(kind(404), "not_found");
        assert_eq!(kind(409), "conflict");
        assert_eq!(kind(408), "network");
        assert_eq!(kind(429), "network");
        assert_eq!(kind(500), "network");
        assert_eq!(kind(503), "network");
        assert_eq!(kind(418), "unexpected");
        assert_eq!(kind(302), "unexpected");
    }

    #[test]
    fn test_status_message_prefers_body() {
        let err = classify_status(StatusCode::CONFLICT, "already checked in\n");
        assert_eq!(err, ServiceError::Conflict("already checked in (409)".into()));

        let err = classify_status(StatusCode::NOT_FOUND, "");
        assert_eq!(
            err,
            ServiceError::NotFound("server returned 404 Not Found".into())
        );
    }
}
