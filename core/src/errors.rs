//! Intake error types
//!
//! Every failure path surfaces as an `IntakeError` carrying one kind from the
//! taxonomy below plus a human-readable detail. Validation and ownership
//! errors are raised before any store mutation; storage errors roll back the
//! in-flight transaction.

use crate::validate::ValidationError;
use thiserror::Error;

/// Error kind for structured logging and transport mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Answer violates the option catalog or a numeric range
    Validation,
    /// Session or response record absent
    NotFound,
    /// Caller identity does not match the target identity
    Ownership,
    /// Merge found nothing to merge
    Conflict,
    /// Underlying store failure
    Storage,
    /// `intake.toml` or catalog file misconfigured
    Config,
}

impl ErrorKind {
    /// Machine-readable code for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Ownership => "OWNERSHIP_ERROR",
            Self::Conflict => "CONFLICT",
            Self::Storage => "STORAGE_ERROR",
            Self::Config => "CONFIG_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Intake error with kind and context
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("caller {caller} may not act on behalf of {target}")]
    Ownership { caller: String, target: String },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl IntakeError {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Ownership { .. } => ErrorKind::Ownership,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Storage { .. } => ErrorKind::Storage,
            Self::Config { .. } => ErrorKind::Config,
        }
    }

    /// Create a not-found error for a session
    pub fn session_not_found(session_id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity: "session",
            key: session_id.to_string(),
        }
    }

    /// Create a not-found error for a response record
    pub fn response_not_found(session_id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity: "response",
            key: session_id.to_string(),
        }
    }

    /// Create an ownership error
    pub fn ownership(caller: impl Into<String>, target: impl Into<String>) -> Self {
        Self::Ownership {
            caller: caller.into(),
            target: target.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Create a storage error with source
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for intake operations
pub type Result<T> = std::result::Result<T, IntakeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            IntakeError::session_not_found("session_x").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(IntakeError::ownership("u1", "u2").kind(), ErrorKind::Ownership);
        assert_eq!(IntakeError::conflict("nothing").kind(), ErrorKind::Conflict);
        assert_eq!(IntakeError::storage("boom").kind(), ErrorKind::Storage);
        assert_eq!(IntakeError::config("bad").kind(), ErrorKind::Config);
    }

    #[test]
    fn test_display_carries_detail() {
        let err = IntakeError::ownership("u1", "u2");
        assert_eq!(err.to_string(), "caller u1 may not act on behalf of u2");

        let err = IntakeError::response_not_found("session_abc");
        assert_eq!(err.to_string(), "response not found: session_abc");
        assert_eq!(err.kind().as_str(), "NOT_FOUND");
    }

    #[test]
    fn test_storage_keeps_source() {
        let io = std::io::Error::other("disk gone");
        let err = IntakeError::storage_with_source("failed to open db", io);
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("disk gone"));
    }
}
