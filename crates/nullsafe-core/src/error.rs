//! Error types for nullsafe
//!
//! All fallible operations return `Result<T, Error>`.
//! None of these are recoverable locally: field access is expected to be
//! total on a well-formed record, so any failure is surfaced immediately.

use thiserror::Error;

/// nullsafe error types
#[derive(Debug, Error)]
pub enum Error {
    /// A field could not be located, read, or written on a record
    #[error("Field access error on {record}.{field}: {reason}")]
    FieldAccess {
        record: String,
        field: String,
        reason: String,
    },

    /// A field no longer matches the shape recorded for it
    #[error("Internal consistency violation on {record}.{field}: expected {expected}, found {found}")]
    InternalConsistency {
        record: String,
        field: String,
        expected: String,
        found: String,
    },

    /// A dynamic value does not conform to its declared field type
    #[error("Type mismatch on {field}: expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    /// Malformed or inconsistent record schema
    #[error("Schema error: {0}")]
    Schema(String),

    /// Output protocol misuse or encoding failure
    #[error("Wire error: {0}")]
    Wire(String),

    /// JSON document could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn field_access(
        record: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::FieldAccess {
            record: record.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn inconsistent(
        record: impl Into<String>,
        field: impl Into<String>,
        expected: impl ToString,
        found: impl ToString,
    ) -> Self {
        Error::InternalConsistency {
            record: record.into(),
            field: field.into(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

/// Result type alias for nullsafe operations
pub type Result<T> = std::result::Result<T, Error>;
