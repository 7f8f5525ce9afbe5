//! Exit code definitions for the osc CLI
//!
//! Scripts branch on these values, so existing codes never change meaning.
//! New codes are only ever appended.

use osc_core::{Error, ErrorKind};

/// Exit codes for the osc CLI application.
///
/// Every failure maps to exactly one code so automation can tell a missing
/// object from a permission problem without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Operation completed successfully
    Success = 0,

    /// General/unspecified error
    GeneralError = 1,

    /// User input error: invalid arguments, malformed path, invalid metadata
    UsageError = 2,

    /// Retryable network error: timeout, connection reset, 503, etc.
    NetworkError = 3,

    /// Authentication or permission failure
    AuthError = 4,

    /// Resource not found: container, object or profile does not exist
    NotFound = 5,

    /// Conflict: name already taken, container not empty
    Conflict = 6,

    /// Backend does not support this feature
    UnsupportedFeature = 7,

    /// Batch operation where some items failed
    PartialFailure = 8,

    /// Operation was interrupted (e.g., Ctrl+C)
    Interrupted = 130,
}

impl ExitCode {
    /// Convert exit code to i32 for use with std::process::exit
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Create exit code from i32 value
    ///
    /// Returns None if the value doesn't correspond to a known exit code.
    pub const fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::GeneralError),
            2 => Some(Self::UsageError),
            3 => Some(Self::NetworkError),
            4 => Some(Self::AuthError),
            5 => Some(Self::NotFound),
            6 => Some(Self::Conflict),
            7 => Some(Self::UnsupportedFeature),
            8 => Some(Self::PartialFailure),
            130 => Some(Self::Interrupted),
            _ => None,
        }
    }

    /// Get a human-readable description of the exit code
    pub const fn description(self) -> &'static str {
        match self {
            Self::Success => "Operation completed successfully",
            Self::GeneralError => "General error",
            Self::UsageError => "Invalid arguments or path format",
            Self::NetworkError => "Network error (retryable)",
            Self::AuthError => "Authentication or permission failure",
            Self::NotFound => "Resource not found",
            Self::Conflict => "Conflict: already exists or not empty",
            Self::UnsupportedFeature => "Feature not supported by backend",
            Self::PartialFailure => "Some items of a batch operation failed",
            Self::Interrupted => "Operation interrupted",
        }
    }

    /// Exit code for a failed operation
    pub fn from_error(err: &Error) -> Self {
        match err.kind() {
            ErrorKind::NotFound => Self::NotFound,
            ErrorKind::AlreadyExists | ErrorKind::NotEmpty => Self::Conflict,
            ErrorKind::PermissionDenied => Self::AuthError,
            ErrorKind::Transient => Self::NetworkError,
            ErrorKind::Validation => Self::UsageError,
            ErrorKind::Unsupported => Self::UnsupportedFeature,
            ErrorKind::Partial => Self::PartialFailure,
            ErrorKind::Other => match err {
                Error::Config(_) => Self::UsageError,
                _ => Self::GeneralError,
            },
        }
    }
}

impl From<&Error> for ExitCode {
    fn from(err: &Error) -> Self {
        Self::from_error(err)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.as_i32()
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osc_core::BatchReport;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::GeneralError.as_i32(), 1);
        assert_eq!(ExitCode::UsageError.as_i32(), 2);
        assert_eq!(ExitCode::NetworkError.as_i32(), 3);
        assert_eq!(ExitCode::AuthError.as_i32(), 4);
        assert_eq!(ExitCode::NotFound.as_i32(), 5);
        assert_eq!(ExitCode::Conflict.as_i32(), 6);
        assert_eq!(ExitCode::UnsupportedFeature.as_i32(), 7);
        assert_eq!(ExitCode::PartialFailure.as_i32(), 8);
        assert_eq!(ExitCode::Interrupted.as_i32(), 130);
    }

    #[test]
    fn test_exit_code_from_i32() {
        for code in [0, 1, 2, 3, 4, 5, 6, 7, 8, 130] {
            let exit = ExitCode::from_i32(code).unwrap();
            assert_eq!(exit.as_i32(), code);
        }
        assert_eq!(ExitCode::from_i32(99), None);
    }

    #[test]
    fn test_exit_code_into_i32() {
        let code: i32 = ExitCode::NotFound.into();
        assert_eq!(code, 5);
    }

    #[test]
    fn test_exit_code_display() {
        let display = format!("{}", ExitCode::NotFound);
        assert!(display.contains("5"));
        assert!(display.contains("not found"));
    }

    #[test]
    fn test_from_error_matches_core_exit_codes() {
        let mut report = BatchReport::new("drain container c");
        report.record_failure("k", Error::PermissionDenied("k".into()));

        let errors = [
            Error::NotFound("x".into()),
            Error::AlreadyExists("x".into()),
            Error::NotEmpty("x".into()),
            Error::PermissionDenied("x".into()),
            Error::Transient("x".into()),
            Error::Validation("x".into()),
            Error::InvalidPath("x".into()),
            Error::Unsupported("x".into()),
            Error::Config("x".into()),
            Error::ProfileNotFound("x".into()),
            Error::ProfileExists("x".into()),
            Error::Partial(Box::new(report)),
            Error::General("x".into()),
        ];

        for err in &errors {
            assert_eq!(ExitCode::from(err).as_i32(), err.exit_code(), "{err}");
        }
    }
}
