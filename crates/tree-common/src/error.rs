//! Error taxonomy shared by the data service crates.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::path::NodePath;

/// Result type alias using DataError.
pub type DataResult<T> = Result<T, DataError>;

/// A failed or timed-out adapter call, tagged with the node it was issued against.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("backend failure at {path}: {message}")]
pub struct BackendError {
    pub path: NodePath,
    pub message: String,
    /// Whether retrying the same call may succeed (timeouts, dropped connections).
    pub transient: bool,
}

impl BackendError {
    pub fn permanent(path: NodePath, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
            transient: false,
        }
    }

    pub fn transient(path: NodePath, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
            transient: true,
        }
    }

    pub fn timeout(path: NodePath, elapsed: Duration) -> Self {
        Self::transient(path, format!("timed out after {} ms", elapsed.as_millis()))
    }
}

/// Primary error type for data access operations.
///
/// Clone so that every waiter on a shared cache computation receives the
/// same failure.
#[derive(Debug, Clone, Error)]
pub enum DataError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: '{action}' is not permitted on {path}")]
    Forbidden { path: String, action: String },

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Cache corruption: {0}")]
    CacheCorruption(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable external name of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    ValidationError,
    Unauthorized,
    Forbidden,
    UnsupportedMediaType,
    BackendError,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::UnsupportedMediaType => "unsupported_media_type",
            ErrorKind::BackendError => "backend_error",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DataError {
    pub fn not_found(path: &NodePath) -> Self {
        DataError::NotFound(format!("no node at {}", path))
    }

    pub fn forbidden(path: &NodePath, action: impl fmt::Display) -> Self {
        DataError::Forbidden {
            path: path.to_string(),
            action: action.to_string(),
        }
    }

    /// External kind. Cache corruption is never surfaced as such.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DataError::NotFound(_) => ErrorKind::NotFound,
            DataError::Validation(_) => ErrorKind::ValidationError,
            DataError::Unauthorized(_) => ErrorKind::Unauthorized,
            DataError::Forbidden { .. } => ErrorKind::Forbidden,
            DataError::UnsupportedMediaType(_) => ErrorKind::UnsupportedMediaType,
            DataError::Backend(_) => ErrorKind::BackendError,
            DataError::CacheCorruption(_) | DataError::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::ValidationError => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::UnsupportedMediaType => 406,
            ErrorKind::BackendError => 502,
            ErrorKind::InternalError => 500,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, DataError::Backend(e) if e.transient)
    }

    /// Message safe to show a client. Backend and internal detail is hidden
    /// unless `debug` is set.
    pub fn public_message(&self, debug: bool) -> String {
        match self {
            DataError::Backend(e) if !debug => {
                format!("backend read failed at {}", e.path)
            }
            DataError::Internal(_) | DataError::CacheCorruption(_) if !debug => {
                "internal error".to_string()
            }
            other => other.to_string(),
        }
    }
}
