//! Routing-specific error types

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the router to its callers
///
/// Routing itself never fails; these cover the feedback and setup paths.
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Outcome reported for a decision that is unknown or aged out of the log
    #[error("unknown decision: {0}")]
    UnknownDecision(Uuid),

    /// Outcome carried a value outside its valid range
    #[error("invalid outcome: {0}")]
    InvalidOutcome(String),

    /// Pattern repository failure
    #[error(transparent)]
    Pattern(#[from] PatternError),
}

/// Errors raised by pattern repositories
#[derive(Debug, Error)]
pub enum PatternError {
    /// Pattern file could not be read
    #[error("failed to read pattern file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Pattern file is not valid TOML or does not match the schema
    #[error("failed to parse patterns: {0}")]
    Parse(String),

    /// Pattern set is structurally invalid
    #[error("invalid pattern set: {0}")]
    Invalid(String),

    /// Requested pattern id is not registered
    #[error("unknown pattern: {0}")]
    UnknownPattern(String),
}
