use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::types::ValidationIssue;

/// Closed error taxonomy used for retry decisions and for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    #[serde(rename = "CONNECTION_ERROR")]
    Connection,
    #[serde(rename = "TIMEOUT_ERROR")]
    Timeout,
    ConstraintViolation,
    #[serde(rename = "DEADLOCK_ERROR")]
    Deadlock,
    #[serde(rename = "SERIALIZATION_ERROR")]
    Serialization,
    #[serde(rename = "VALIDATION_ERROR")]
    Validation,
    #[serde(rename = "SCHEMA_ERROR")]
    Schema,
    #[serde(rename = "UNKNOWN_ERROR")]
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => "CONNECTION_ERROR",
            Self::Timeout => "TIMEOUT_ERROR",
            Self::ConstraintViolation => "CONSTRAINT_VIOLATION",
            Self::Deadlock => "DEADLOCK_ERROR",
            Self::Serialization => "SERIALIZATION_ERROR",
            Self::Validation => "VALIDATION_ERROR",
            Self::Schema => "SCHEMA_ERROR",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone)]
pub enum PersistError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Operation timeout after {0}ms")]
    Timeout(u64),

    #[error("Parent record '{0}' not found")]
    ParentNotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Schema validation failed: {}", summarize(issues))]
    Schema { issues: Vec<ValidationIssue> },

    #[error("Validation failed: {}", summarize(issues))]
    Validation { issues: Vec<ValidationIssue> },

    #[error("Verification failed: expected {expected} items, found {actual}")]
    Verification { expected: usize, actual: usize },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Operation failed after {attempts} attempt(s): {last_error}")]
    Retry {
        attempts: u32,
        #[source]
        last_error: Box<PersistError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl PersistError {
    /// Unwraps retry wrappers down to the error that actually ended the last attempt.
    pub fn root(&self) -> &PersistError {
        match self {
            Self::Retry { last_error, .. } => last_error.root(),
            other => other,
        }
    }

    /// Field-level issues carried by validation failures, if any.
    pub fn issues(&self) -> &[ValidationIssue] {
        match self.root() {
            Self::Schema { issues } | Self::Validation { issues } => issues,
            _ => &[],
        }
    }
}

fn summarize(issues: &[ValidationIssue]) -> String {
    match issues.first() {
        None => "no details".to_string(),
        Some(first) if issues.len() == 1 => first.to_string(),
        Some(first) => format!("{} (and {} more)", first, issues.len() - 1),
    }
}

pub type Result<T> = std::result::Result<T, PersistError>;

impl From<std::io::Error> for PersistError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PersistError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
