//! Error types for APIQL.

use thiserror::Error;

use crate::auth::Action;

/// The main error type for APIQL operations.
#[derive(Debug, Error)]
pub enum ApiqlError {
    /// Malformed schema text. Carries the unconsumed input at the failure point.
    #[error("Parse error: {message} at '{remaining}'")]
    Parse { message: String, remaining: String },

    /// Fingerprint unknown to every cache tier.
    #[error("Persisted query not found: {0}")]
    CacheMiss(String),

    /// Denied by the authorization capability.
    #[error("Not authorized to {action} {subject}")]
    Unauthorized { action: Action, subject: String },

    /// Operation not bound at any level of its (dotted) name.
    #[error("Unknown operation: '{0}'")]
    UnknownOperation(String),

    /// Field not exposed by the entity's attribute whitelist.
    #[error("Unknown attribute '{field}' on {type_name}")]
    UnknownAttribute { type_name: String, field: String },

    /// Value cannot be rendered against the requested selection.
    #[error("Render error: {0}")]
    Render(String),

    /// The request deadline passed before resolution finished.
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// Failure raised by a bound operation or repository.
    #[error("Operation failed: {0}")]
    Operation(String),

    /// Durable cache tier failure.
    #[error("Store error: {0}")]
    Store(String),

    /// Error reported by a remote endpoint.
    #[error("{kind} error: {message}")]
    Remote { kind: ErrorKind, message: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport-level classification of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    CacheMiss,
    Unauthorized,
    BadRequest,
    Timeout,
    Internal,
}

impl ErrorKind {
    /// Wire code carried in error response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::CacheMiss => "CACHE_MISS",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
            Self::Timeout => "TIMEOUT",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn from_code(code: &str) -> Self {
        match code {
            "CACHE_MISS" => Self::CacheMiss,
            "UNAUTHORIZED" => Self::Unauthorized,
            "BAD_REQUEST" => Self::BadRequest,
            "TIMEOUT" => Self::Timeout,
            _ => Self::Internal,
        }
    }

    /// HTTP status code for this kind.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::CacheMiss => 404,
            Self::Unauthorized => 401,
            Self::BadRequest => 400,
            Self::Timeout => 504,
            Self::Internal => 500,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl ApiqlError {
    /// Create a parse error at the given remaining input.
    pub fn parse(message: impl Into<String>, remaining: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            remaining: remaining.into(),
        }
    }

    pub fn unknown_attribute(type_name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownAttribute {
            type_name: type_name.into(),
            field: field.into(),
        }
    }

    /// Whether the error stays inside the subtree that raised it.
    ///
    /// Contained errors degrade to `null` in lenient mode; everything else
    /// fails the whole resolution.
    pub fn is_contained(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized { .. }
                | Self::UnknownOperation(_)
                | Self::UnknownAttribute { .. }
                | Self::Render(_)
        )
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CacheMiss(_) => ErrorKind::CacheMiss,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::Parse { .. } | Self::UnknownOperation(_) | Self::UnknownAttribute { .. } => {
                ErrorKind::BadRequest
            }
            Self::DeadlineExceeded => ErrorKind::Timeout,
            Self::Remote { kind, .. } => *kind,
            _ => ErrorKind::Internal,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }
}

/// Result type alias for APIQL operations.
pub type ApiqlResult<T> = Result<T, ApiqlError>;
