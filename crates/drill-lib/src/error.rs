//! Error types
//!
//! Only failures the caller must see are represented here. Missing tables,
//! empty windows and delegate outages are absorbed where they occur.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced to the caller of the extraction engine
#[derive(Debug, Error)]
pub enum DrillError {
    #[error("failed to read interval table {path}: {reason}")]
    IntervalTable { path: PathBuf, reason: String },

    #[error("interval index {index} out of range for {len} intervals")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("invalid topology: {0}")]
    Topology(String),

    #[error("{0} is required")]
    MissingComponent(&'static str),
}

/// Failure reading a backing table that does exist
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("table {path} has no column {column}")]
    MissingColumn { path: PathBuf, column: String },
}

/// Failure of the semantic shortlist delegate
#[derive(Debug, Error)]
pub enum DelegateError {
    #[error("delegate request failed: {0}")]
    Transport(String),

    #[error("delegate returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not parse delegate reply: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for DelegateError {
    fn from(err: reqwest::Error) -> Self {
        DelegateError::Transport(err.to_string())
    }
}
