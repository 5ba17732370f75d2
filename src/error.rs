//! Custom error types for pubtrends.
//!
//! This module defines all error types used throughout the pipeline.
//! All functions return `Result<T, TrendsError>` instead of using `unwrap()`.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for pubtrends operations.
///
/// Per-record failures (`MalformedRecord`) are recoverable: the reader yields
/// them and keeps going. Everything else aborts the run before publishing.
#[derive(Debug, Error)]
pub enum TrendsError {
    /// The term store could not be opened
    #[error("Term store unavailable at {path}: {reason}")]
    StoreUnavailable {
        /// Path of the store handle
        path: PathBuf,
        /// Underlying cause
        reason: String,
    },

    /// A single store entry could not be parsed into a term record
    #[error("Malformed record for term '{term}': {reason}")]
    MalformedRecord {
        /// Key of the offending entry
        term: String,
        /// Parse failure description
        reason: String,
    },

    /// The store byte stream is structurally broken (truncated, not an object)
    #[error("Corrupt term store: {0}")]
    CorruptStore(String),

    /// A derivation had no qualifying data
    #[error("No data available: {0}")]
    EmptyAggregate(String),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A shard worker panicked or was cancelled
    #[error("Worker error: {0}")]
    Worker(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl TrendsError {
    /// True for errors that only invalidate a single record.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TrendsError::MalformedRecord { .. })
    }
}

/// Result type alias using `TrendsError`
pub type Result<T> = std::result::Result<T, TrendsError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with an empty-aggregate message
    fn ok_or_empty(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_empty(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| TrendsError::EmptyAggregate(msg.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        let malformed = TrendsError::MalformedRecord {
            term: "cancer".to_string(),
            reason: "bad".to_string(),
        };
        assert!(malformed.is_recoverable());
        assert!(!TrendsError::CorruptStore("eof".to_string()).is_recoverable());
    }

    #[test]
    fn test_ok_or_empty() {
        let none: Option<i32> = None;
        match none.ok_or_empty("no categories") {
            Err(TrendsError::EmptyAggregate(msg)) => assert_eq!(msg, "no categories"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
