//! Error types for the collection pipeline

use std::fmt;

use crate::value::ValueError;

/// Result type alias for collection operations
pub type CollectResult<T> = Result<T, CollectError>;

/// Errors that can occur while collecting from a single target
///
/// None of these abort a scrape. Each one is logged with its context and the
/// affected target simply contributes no rows.
#[derive(Debug)]
pub enum CollectError {
    /// Session to the target could not be established
    Connection(String),

    /// Remote procedure call failed
    Call(String),

    /// Response did not have the expected shape
    MalformedResponse(String),

    /// Metric configuration contains an unusable entry
    Configuration(String),

    /// Target did not answer before the scrape deadline
    Timeout(String),
}

impl fmt::Display for CollectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectError::Connection(msg) => write!(f, "failed to connect to target: {}", msg),
            CollectError::Call(msg) => write!(f, "remote call failed: {}", msg),
            CollectError::MalformedResponse(msg) => write!(f, "malformed response: {}", msg),
            CollectError::Configuration(msg) => write!(f, "invalid configuration: {}", msg),
            CollectError::Timeout(msg) => write!(f, "deadline exceeded: {}", msg),
        }
    }
}

impl std::error::Error for CollectError {}

impl From<ValueError> for CollectError {
    fn from(err: ValueError) -> Self {
        CollectError::MalformedResponse(err.to_string())
    }
}
