//! Typed error kinds raised by the ingestion pipeline.
//!
//! Every per-file failure is one of these kinds. The driver catches them at the
//! file boundary and records them in the failure ledger; only connection and
//! ledger bootstrap failures escape a run.

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// The source file could not be read or is not well-formed tabular data.
    #[error("Failed to decode {file}: {message}")]
    Decode { file: String, message: String },
    /// A constraint rejected the write (duplicate key, NOT NULL, CHECK, ...).
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),
    #[error("Database unavailable: {0}")]
    Connectivity(String),
    /// A referenced table or column does not exist, or a setting is invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("File '{0}' is already recorded in the success ledger")]
    DuplicateKey(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;

impl IngestError {
    pub fn decode(file: impl Into<String>, message: impl ToString) -> Self {
        IngestError::Decode {
            file: file.into(),
            message: message.to_string(),
        }
    }

    /// Short label used in logs and the JSON run report.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Decode { .. } => "decode",
            IngestError::IntegrityViolation(_) => "integrity",
            IngestError::Connectivity(_) => "connectivity",
            IngestError::Configuration(_) => "configuration",
            IngestError::DuplicateKey(_) => "duplicate_key",
            IngestError::Storage(_) => "storage",
        }
    }
}

impl From<rusqlite::Error> for IngestError {
    fn from(err: rusqlite::Error) -> Self {
        let message = err.to_string();
        match &err {
            rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
                ErrorCode::ConstraintViolation => IngestError::IntegrityViolation(message),
                ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure
                | ErrorCode::PermissionDenied
                | ErrorCode::ReadOnly => IngestError::Connectivity(message),
                _ if names_missing_object(&message) => IngestError::Configuration(message),
                _ => IngestError::Storage(message),
            },
            _ if names_missing_object(&message) => IngestError::Configuration(message),
            _ => IngestError::Storage(message),
        }
    }
}

fn names_missing_object(message: &str) -> bool {
    message.contains("no such table")
        || message.contains("no such column")
        || message.contains("has no column named")
}
