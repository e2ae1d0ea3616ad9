//! Policy error types
//!
//! Errors possible when reading or writing the trigger and prefetch lists
//!
//! Only IO errors fail a read; the line errors describe what a reader skipped

use crate::error::item::ParseItemError;

/// Policy result type
pub type PolicyResult<T> = core::result::Result<T, PolicyError>;

/// Policy error type
#[derive(Debug)]
pub enum PolicyError {
    /// An error with IO ocurred
    IoError(std::io::Error),

    /// A policy file could not be opened or created
    Open {
        path: std::path::PathBuf,
        error: std::io::Error,
    },

    /// A malformed line in the trigger list, or a malformed trigger line in the prefetch list
    BadTrigger { line: usize, error: ParseItemError },

    /// A malformed item line in the prefetch list
    BadItem { line: usize, error: ParseItemError },

    /// A `===TRIGGER===` delimiter not followed by the trigger line
    MissingTrigger { line: usize },

    /// A prefetch item before any `===TRIGGER===` delimiter
    ItemOutsideSegment { line: usize },
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyError::IoError(io) => f.write_fmt(format_args!("IO error: {}", io)),
            PolicyError::Open { path, error } => f.write_fmt(format_args!(
                "failed to open {}: {}",
                path.display(),
                error
            )),
            PolicyError::BadTrigger { line, error } => f.write_fmt(format_args!(
                "bad trigger in line {}: {}",
                line, error
            )),
            PolicyError::BadItem { line, error } => {
                f.write_fmt(format_args!("bad item in line {}: {}", line, error))
            }
            PolicyError::MissingTrigger { line } => f.write_fmt(format_args!(
                "segment delimiter in line {} is not followed by a trigger",
                line
            )),
            PolicyError::ItemOutsideSegment { line } => f.write_fmt(format_args!(
                "item in line {} does not belong to any segment",
                line
            )),
        }
    }
}

impl std::error::Error for PolicyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PolicyError::IoError(io) => Some(io),
            PolicyError::Open { error, .. } => Some(error),
            PolicyError::BadTrigger { error, .. } => Some(error),
            PolicyError::BadItem { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PolicyError {
    fn from(value: std::io::Error) -> Self {
        PolicyError::IoError(value)
    }
}
