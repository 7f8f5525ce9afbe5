//! Error types for osc-core
//!
//! Every backend reports failures through this one taxonomy so callers can
//! branch on the kind of failure instead of a provider-specific shape.

use std::fmt;

use thiserror::Error;

/// Result type alias for osc-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for osc operations
#[derive(Error, Debug)]
pub enum Error {
    /// Container or object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Create on a name that is already taken
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Delete of a non-empty container without force
    #[error("Container not empty: {0}")]
    NotEmpty(String),

    /// Credential or authorization failure
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Network, timeout or rate-limit failure (retryable)
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Malformed input: empty name, oversized metadata, invalid characters
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation not implemented by this backend
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Batch operation where some items failed
    #[error("{0}")]
    Partial(Box<BatchReport>),

    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid path format
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Profile not found
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    /// Profile name already taken
    #[error("Profile already exists: {0}")]
    ProfileExists(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// General error
    #[error("{0}")]
    General(String),
}

/// Coarse classification of an [`Error`], for callers that branch on outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    NotEmpty,
    PermissionDenied,
    Transient,
    Validation,
    Unsupported,
    Partial,
    Other,
}

impl Error {
    /// Build the error variant that reports `kind`
    ///
    /// `Partial` and `Other` have no message-only variant and become
    /// [`Error::General`].
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::NotFound => Error::NotFound(message),
            ErrorKind::AlreadyExists => Error::AlreadyExists(message),
            ErrorKind::NotEmpty => Error::NotEmpty(message),
            ErrorKind::PermissionDenied => Error::PermissionDenied(message),
            ErrorKind::Transient => Error::Transient(message),
            ErrorKind::Validation => Error::Validation(message),
            ErrorKind::Unsupported => Error::Unsupported(message),
            ErrorKind::Partial | ErrorKind::Other => Error::General(message),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) | Error::ProfileNotFound(_) => ErrorKind::NotFound,
            Error::AlreadyExists(_) | Error::ProfileExists(_) => ErrorKind::AlreadyExists,
            Error::NotEmpty(_) => ErrorKind::NotEmpty,
            Error::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Error::Transient(_) => ErrorKind::Transient,
            Error::Validation(_) | Error::InvalidPath(_) => ErrorKind::Validation,
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::Partial(_) => ErrorKind::Partial,
            _ => ErrorKind::Other,
        }
    }

    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }

    /// Whether this error reports a missing container or object
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Get the appropriate exit code for this error
    pub const fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidPath(_) | Error::Validation(_) | Error::Config(_) => 2, // UsageError
            Error::Transient(_) => 3,                                            // NetworkError
            Error::PermissionDenied(_) => 4,                                     // AuthError
            Error::NotFound(_) | Error::ProfileNotFound(_) => 5,                 // NotFound
            Error::AlreadyExists(_) | Error::NotEmpty(_) | Error::ProfileExists(_) => 6, // Conflict
            Error::Unsupported(_) => 7,                                          // UnsupportedFeature
            Error::Partial(_) => 8,                                              // PartialFailure
            _ => 1,                                                              // GeneralError
        }
    }
}

/// One failed item of a batch operation
#[derive(Debug)]
pub struct ItemFailure {
    /// Object key or container name the failure applies to
    pub name: String,
    pub error: Error,
}

/// Outcome of a batch operation that does not stop at the first error
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Operation label used in the error message, e.g. "drain container photos"
    pub operation: String,
    pub succeeded: Vec<String>,
    pub failed: Vec<ItemFailure>,
}

impl BatchReport {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Default::default()
        }
    }

    pub fn record_success(&mut self, name: impl Into<String>) {
        self.succeeded.push(name.into());
    }

    pub fn record_failure(&mut self, name: impl Into<String>, error: Error) {
        self.failed.push(ItemFailure {
            name: name.into(),
            error,
        });
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Fold another report's items into this one
    pub fn merge(&mut self, other: BatchReport) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
    }

    /// `Ok(self)` when nothing failed, otherwise `Error::Partial`
    pub fn into_result(self) -> Result<BatchReport> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(Error::Partial(Box::new(self)))
        }
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} succeeded, {} failed",
            self.operation,
            self.succeeded.len(),
            self.failed.len()
        )?;
        if let Some(first) = self.failed.first() {
            write!(f, " (first failure: {}: {})", first.name, first.error)?;
        }
        Ok(())
    }
}
