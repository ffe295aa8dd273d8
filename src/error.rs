//! Error types for RatRopy

use thiserror::Error;

use crate::types::TrialStatus;

/// Errors raised by the trial core
#[derive(Debug, Error)]
pub enum TrialError {
    #[error("Subject not found: {0}")]
    SubjectNotFound(String),

    #[error("Cannot {operation} while session is {status}")]
    InvalidSessionState {
        operation: &'static str,
        status: TrialStatus,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Export error: {0}")]
    Export(String),
}

/// Errors raised by subject and experiment stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Subject already registered: {0}")]
    DuplicateSubject(String),

    #[error("No subject with id {0}")]
    SubjectMissing(String),

    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: i64, reason: String },
}

/// Errors raised while loading or validating a study configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}
