//! Mapping of Swift failures onto the osc error taxonomy
//!
//! Swift reports everything through the HTTP status; bodies are short
//! human-readable pages, not structured codes.

use reqwest::StatusCode;

use osc_core::{Error, ErrorKind};

/// Classify a Swift response status
pub(crate) fn classify(status: StatusCode) -> ErrorKind {
    match status.as_u16() {
        404 => ErrorKind::NotFound,
        // Container delete is the only call that conflicts
        409 => ErrorKind::NotEmpty,
        401 | 403 => ErrorKind::PermissionDenied,
        400 | 411 | 412 | 413 | 422 => ErrorKind::Validation,
        501 => ErrorKind::Unsupported,
        408 | 429 | 498 => ErrorKind::Transient,
        s if s >= 500 => ErrorKind::Transient,
        _ => ErrorKind::Other,
    }
}

/// Error for a response with an unexpected status
pub(crate) fn status_error(status: StatusCode, target: &str) -> Error {
    tracing::debug!(target_path = target, %status, "Swift request failed");
    Error::from_kind(classify(status), format!("{target}: {status}"))
}

/// Error for a request that got no usable response
pub(crate) fn transport_error(err: reqwest::Error, target: &str) -> Error {
    tracing::debug!(target_path = target, error = %err, "Swift request failed");

    let kind = if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        ErrorKind::Transient
    } else if err.is_builder() {
        ErrorKind::Validation
    } else if let Some(status) = err.status() {
        classify(status)
    } else {
        ErrorKind::Other
    };
    Error::from_kind(kind, format!("{target}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify(StatusCode::NOT_FOUND), ErrorKind::NotFound);
        assert_eq!(classify(StatusCode::CONFLICT), ErrorKind::NotEmpty);
        assert_eq!(classify(StatusCode::UNAUTHORIZED), ErrorKind::PermissionDenied);
        assert_eq!(classify(StatusCode::FORBIDDEN), ErrorKind::PermissionDenied);
        assert_eq!(classify(StatusCode::PAYLOAD_TOO_LARGE), ErrorKind::Validation);
        assert_eq!(classify(StatusCode::NOT_IMPLEMENTED), ErrorKind::Unsupported);
        assert_eq!(classify(StatusCode::SERVICE_UNAVAILABLE), ErrorKind::Transient);
        assert_eq!(classify(StatusCode::TOO_MANY_REQUESTS), ErrorKind::Transient);
        assert_eq!(classify(StatusCode::IM_A_TEAPOT), ErrorKind::Other);
    }

    #[test]
    fn test_status_error_message() {
        let err = status_error(StatusCode::CONFLICT, "photos");
        assert_eq!(err.kind(), ErrorKind::NotEmpty);
        assert_eq!(err.to_string(), "Container not empty: photos: 409 Conflict");
    }
}
