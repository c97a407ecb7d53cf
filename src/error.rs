//! Error types for the promptlog engine.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=connection, 3=migration, 4=not_found, ...)
//! - Retryability flags so callers own their retry policy
//! - Operation + key context on every storage failure
//! - Structured JSON output for piped / non-TTY consumers

use std::fmt;
use thiserror::Error;

/// Result type alias for promptlog operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Connection (exit 2)
    ConnectionUnavailable,

    // Migration (exit 3)
    MigrationFailed,

    // Not Found (exit 4)
    ConversationNotFound,
    SessionNotFound,
    MessageNotFound,
    RatingNotFound,

    // Constraint (exit 5)
    InvalidArgument,
    ConstraintViolation,

    // Contention (exit 6)
    LockTimeout,

    // Storage (exit 7)
    DatabaseError,

    // Config (exit 8)
    ConfigError,

    // I/O (exit 9)
    IoError,
    JsonError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::ConnectionUnavailable => "CONNECTION_UNAVAILABLE",
            Self::MigrationFailed => "MIGRATION_FAILED",
            Self::ConversationNotFound => "CONVERSATION_NOT_FOUND",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::MessageNotFound => "MESSAGE_NOT_FOUND",
            Self::RatingNotFound => "RATING_NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::ConstraintViolation => "CONSTRAINT_VIOLATION",
            Self::LockTimeout => "LOCK_TIMEOUT",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
        }
    }

    /// Category-based exit code (2-9).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::ConnectionUnavailable => 2,
            Self::MigrationFailed => 3,
            Self::ConversationNotFound
            | Self::SessionNotFound
            | Self::MessageNotFound
            | Self::RatingNotFound => 4,
            Self::InvalidArgument | Self::ConstraintViolation => 5,
            Self::LockTimeout => 6,
            Self::DatabaseError => 7,
            Self::ConfigError => 8,
            Self::IoError | Self::JsonError => 9,
        }
    }

    /// Whether a caller may retry.
    ///
    /// Lock contention is retryable as-is; constraint and validation errors
    /// are retryable with corrected input. Startup failures are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LockTimeout | Self::InvalidArgument | Self::ConstraintViolation
        )
    }
}

/// Which stage of a migration run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationFailure {
    /// Creating the `schema_migrations` bookkeeping table.
    CreateBookkeeping,
    /// Listing the migrations directory.
    ScanDirectory,
    /// Two up-scripts share a version token.
    DuplicateVersion,
    /// Looking up whether a version is already recorded.
    CheckStatus,
    /// Reading the script from disk.
    ReadScript,
    /// Executing the script body.
    Execute,
    /// Inserting the bookkeeping row.
    Record,
    /// Committing the script's transaction.
    Commit,
}

impl fmt::Display for MigrationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CreateBookkeeping => "create migrations table",
            Self::ScanDirectory => "scan migrations directory",
            Self::DuplicateVersion => "resolve version (duplicate token)",
            Self::CheckStatus => "check migration status",
            Self::ReadScript => "read script",
            Self::Execute => "execute",
            Self::Record => "record version",
            Self::Commit => "commit",
        };
        f.write_str(s)
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in promptlog operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection unavailable ({step}): {source}")]
    Connection {
        step: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Migration {script} failed to {failure}: {source}")]
    Migration {
        script: String,
        failure: MigrationFailure,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Conversation not found: {id}")]
    ConversationNotFound { id: i64 },

    #[error("No conversation for session: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Message not found: {id}")]
    MessageNotFound { id: i64 },

    #[error("Rating not found: {id}")]
    RatingNotFound { id: i64 },

    #[error("Validation failed for {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("Constraint violation in {op}: {message}")]
    ConstraintViolation { op: &'static str, message: String },

    #[error("Database locked during {op} ({key}): busy timeout exceeded")]
    LockTimeout { op: &'static str, key: String },

    #[error("Timed out waiting for a pooled connection during {op}: {source}")]
    PoolTimeout {
        op: &'static str,
        #[source]
        source: r2d2::Error,
    },

    #[error("{op} failed ({key}): {source}")]
    Storage {
        op: &'static str,
        key: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Connection { .. } => ErrorCode::ConnectionUnavailable,
            Self::Migration { .. } => ErrorCode::MigrationFailed,
            Self::ConversationNotFound { .. } => ErrorCode::ConversationNotFound,
            Self::SessionNotFound { .. } => ErrorCode::SessionNotFound,
            Self::MessageNotFound { .. } => ErrorCode::MessageNotFound,
            Self::RatingNotFound { .. } => ErrorCode::RatingNotFound,
            Self::Validation { .. } => ErrorCode::InvalidArgument,
            Self::ConstraintViolation { .. } => ErrorCode::ConstraintViolation,
            Self::LockTimeout { .. } | Self::PoolTimeout { .. } => ErrorCode::LockTimeout,
            Self::Storage { .. } | Self::Database(_) => ErrorCode::DatabaseError,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Whether the caller may retry the operation.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.error_code().is_retryable()
    }

    /// True for every "no such entity" outcome.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ConversationNotFound { .. }
                | Self::SessionNotFound { .. }
                | Self::MessageNotFound { .. }
                | Self::RatingNotFound { .. }
        )
    }

    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub(crate) fn connection(
        step: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Connection {
            step,
            source: source.into(),
        }
    }

    pub(crate) fn migration(
        script: impl Into<String>,
        failure: MigrationFailure,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Migration {
            script: script.into(),
            failure,
            source: source.into(),
        }
    }

    /// Attach operation context to a raw database error.
    ///
    /// Busy/locked failures become `LockTimeout`, constraint failures become
    /// `ConstraintViolation`. Already-typed errors pass through unchanged.
    #[must_use]
    pub(crate) fn in_op(self, op: &'static str, key: impl fmt::Display) -> Self {
        match self {
            Self::Database(source) => Self::from_sqlite(source, op, key.to_string()),
            other => other,
        }
    }

    fn from_sqlite(source: rusqlite::Error, op: &'static str, key: String) -> Self {
        match source.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked) => {
                Self::LockTimeout { op, key }
            }
            Some(rusqlite::ErrorCode::ConstraintViolation) => Self::ConstraintViolation {
                op,
                message: source.to_string(),
            },
            _ => Self::Storage { op, key, source },
        }
    }

    /// Context-aware recovery hint for operators.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::Connection { step, .. } => Some(format!(
                "Startup failed while trying to {step}. Check the database path and permissions."
            )),
            Self::Migration { script, .. } => Some(format!(
                "Fix {script} and re-run `promptlog migrate`; earlier migrations stay applied."
            )),
            Self::ConversationNotFound { .. } | Self::SessionNotFound { .. } => Some(
                "Use `promptlog conversations list` to see stored conversations.".to_string(),
            ),
            Self::LockTimeout { .. } | Self::PoolTimeout { .. } => Some(
                "Another writer holds the database lock. Retry, or raise the busy timeout."
                    .to_string(),
            ),
            Self::Validation { field, .. } if *field == "rating" => {
                Some("Ratings are integers from 1 to 5.".to_string())
            }
            _ => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(code: std::os::raw::c_int) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None)
    }

    #[test]
    fn test_busy_maps_to_lock_timeout() {
        let err = Error::from(sqlite_failure(rusqlite::ffi::SQLITE_BUSY)).in_op("create_message", 7);
        assert!(matches!(err, Error::LockTimeout { op: "create_message", ref key } if key == "7"));
        assert!(err.is_retryable());
        assert_eq!(err.exit_code(), 6);
    }

    #[test]
    fn test_constraint_maps_to_violation() {
        let err = Error::from(sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT)).in_op("create_rating", "x");
        assert_eq!(err.error_code(), ErrorCode::ConstraintViolation);
    }

    #[test]
    fn test_typed_errors_pass_through_in_op() {
        let err = Error::RatingNotFound { id: 3 }.in_op("delete_rating", 3);
        assert!(matches!(err, Error::RatingNotFound { id: 3 }));
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_structured_json_includes_hint() {
        let err = Error::ConversationNotFound { id: 42 };
        let json = err.to_structured_json();
        assert_eq!(json["error"]["code"], "CONVERSATION_NOT_FOUND");
        assert_eq!(json["error"]["exit_code"], 4);
        assert!(json["error"]["hint"].is_string());
    }
}
