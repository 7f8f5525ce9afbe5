//! Mapping of S3 failures onto the osc error taxonomy
//!
//! The SDK reports failures as an error code from the response body, an HTTP
//! status, or a transport-level variant. Codes win over status because
//! several distinct conditions share a status (409 for both "bucket not
//! empty" and "name taken").

use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};

use osc_core::{Error, ErrorKind};

/// Classify an S3 error code and HTTP status
pub(crate) fn classify(code: Option<&str>, status: Option<u16>) -> ErrorKind {
    if let Some(code) = code {
        let kind = match code {
            "NoSuchBucket" | "NoSuchKey" | "NotFound" | "NoSuchUpload" | "NoSuchVersion" => {
                Some(ErrorKind::NotFound)
            }
            "BucketAlreadyExists" | "BucketAlreadyOwnedByYou" => Some(ErrorKind::AlreadyExists),
            "BucketNotEmpty" => Some(ErrorKind::NotEmpty),
            "AccessDenied" | "AllAccessDisabled" | "InvalidAccessKeyId"
            | "SignatureDoesNotMatch" | "ExpiredToken" | "InvalidToken" | "Forbidden" => {
                Some(ErrorKind::PermissionDenied)
            }
            "SlowDown" | "RequestTimeout" | "InternalError" | "ServiceUnavailable"
            | "OperationAborted" | "Throttling" | "ThrottlingException" => {
                Some(ErrorKind::Transient)
            }
            "InvalidBucketName" | "KeyTooLongError" | "MetadataTooLarge" | "InvalidArgument"
            | "InvalidRequest" | "EntityTooSmall" | "EntityTooLarge" | "InvalidPart"
            | "InvalidPartOrder" | "InvalidLocationConstraint" => Some(ErrorKind::Validation),
            "NotImplemented" => Some(ErrorKind::Unsupported),
            _ => None,
        };
        if let Some(kind) = kind {
            return kind;
        }
    }

    match status {
        Some(404) => ErrorKind::NotFound,
        Some(409) => ErrorKind::NotEmpty,
        Some(401 | 403) => ErrorKind::PermissionDenied,
        Some(400) => ErrorKind::Validation,
        Some(501) => ErrorKind::Unsupported,
        Some(429) => ErrorKind::Transient,
        Some(s) if s >= 500 => ErrorKind::Transient,
        _ => ErrorKind::Other,
    }
}

/// Error for one key of a `DeleteObjects` response
pub(crate) fn batch_item_error(code: Option<&str>, message: Option<&str>, key: &str) -> Error {
    let kind = classify(code, None);
    let detail = message.or(code).unwrap_or("delete failed");
    Error::from_kind(kind, format!("{key}: {detail}"))
}

/// Service error code of a failed request, if the service sent one
pub(crate) fn error_code<E>(err: &SdkError<E, HttpResponse>) -> Option<&str>
where
    E: ProvideErrorMetadata,
{
    err.as_service_error().and_then(ProvideErrorMetadata::code)
}

/// Convert a failed SDK request into an osc error
///
/// `target` names what the request addressed (container or object path) and
/// prefixes the message.
pub(crate) fn map_sdk_error<E>(err: SdkError<E, HttpResponse>, target: &str) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    tracing::debug!(target_path = target, error = %DisplayErrorContext(&err), "S3 request failed");

    let kind = match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => ErrorKind::Transient,
        _ => classify(
            error_code(&err),
            err.raw_response().map(|r| r.status().as_u16()),
        ),
    };

    let detail = err
        .as_service_error()
        .and_then(|e| e.message().or(e.code()).map(str::to_string))
        .unwrap_or_else(|| DisplayErrorContext(&err).to_string());

    Error::from_kind(kind, format!("{target}: {detail}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_wins_over_status() {
        assert_eq!(
            classify(Some("BucketAlreadyExists"), Some(409)),
            ErrorKind::AlreadyExists
        );
        assert_eq!(classify(Some("BucketNotEmpty"), Some(409)), ErrorKind::NotEmpty);
        assert_eq!(classify(Some("NoSuchKey"), Some(404)), ErrorKind::NotFound);
    }

    #[test]
    fn test_status_fallback() {
        // HEAD responses carry no body, so no code
        assert_eq!(classify(None, Some(404)), ErrorKind::NotFound);
        assert_eq!(classify(None, Some(403)), ErrorKind::PermissionDenied);
        assert_eq!(classify(None, Some(503)), ErrorKind::Transient);
        assert_eq!(classify(None, Some(429)), ErrorKind::Transient);
        assert_eq!(classify(None, Some(501)), ErrorKind::Unsupported);
        assert_eq!(classify(None, Some(400)), ErrorKind::Validation);
        assert_eq!(classify(None, None), ErrorKind::Other);
    }

    #[test]
    fn test_unknown_code_uses_status() {
        assert_eq!(
            classify(Some("XMinioSomethingOdd"), Some(500)),
            ErrorKind::Transient
        );
        assert_eq!(classify(Some("XMinioSomethingOdd"), None), ErrorKind::Other);
    }

    #[test]
    fn test_permission_codes() {
        for code in ["AccessDenied", "InvalidAccessKeyId", "SignatureDoesNotMatch"] {
            assert_eq!(classify(Some(code), Some(403)), ErrorKind::PermissionDenied);
        }
    }

    #[test]
    fn test_batch_item_error() {
        let err = batch_item_error(Some("AccessDenied"), Some("Access Denied"), "a.txt");
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert_eq!(err.to_string(), "Permission denied: a.txt: Access Denied");

        let err = batch_item_error(None, None, "b.txt");
        assert_eq!(err.kind(), ErrorKind::Other);
    }
}
