//! Error types for the novelty engine
//!
//! The engine recovers locally from guardrail breaches only (long lines,
//! token floods); everything else is surfaced to the caller as one of the
//! variants below.

use thiserror::Error;

/// Errors surfaced by the engine and its snapshot machinery
#[derive(Error, Debug)]
pub enum EngineError {
    /// Line could not be interpreted as text (non-UTF-8 input at the caller
    /// boundary)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A configuration value is out of its documented domain
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Snapshot file is unreadable, malformed, or from a future version
    #[error("snapshot format error in field '{field}': {reason}")]
    SnapshotFormat { field: String, reason: String },

    /// Snapshot parsed but a field is semantically invalid (e.g. g <= 0)
    #[error("snapshot incompatible: field '{field}' {reason}")]
    SnapshotIncompatible { field: String, reason: String },

    /// I/O failure while reading or writing a snapshot
    #[error("snapshot I/O error: {0}")]
    SnapshotIo(#[from] std::io::Error),
}

impl EngineError {
    pub(crate) fn format(field: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::SnapshotFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn incompatible(field: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::SnapshotIncompatible {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, EngineError>;
