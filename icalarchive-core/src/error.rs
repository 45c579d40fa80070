//! Error types for the icalarchive engine.

use thiserror::Error;

/// Errors that can occur in archive operations.
///
/// None of these are fatal: a `Parse` error rejects one fetch, a `Recurrence`
/// error drops one definition from an expansion, an `InvalidPattern` error
/// disables one rule or output filter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArchiveError {
    #[error("ICS parse error: {0}")]
    Parse(String),

    #[error("Recurrence error for '{identity}': {message}")]
    Recurrence { identity: String, message: String },

    #[error("Output not found: {0}")]
    UnknownOutput(String),

    #[error("Rule not found: {0}")]
    UnknownRule(String),

    #[error("Invalid pattern in '{owner}': {message}")]
    InvalidPattern { owner: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for archive operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;
