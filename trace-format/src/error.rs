use std::num::ParseIntError;

/// Error obtained when parsing a record from a log line
#[derive(Debug)]
pub enum ParseLineError {
    /// The line is not a record of the expected kind (e.g., a banner line)
    NotARecord,
    MissingField(&'static str),
    BadTimestamp(String),
    BadInt {
        field: &'static str,
        error: ParseIntError,
    },
}

impl std::fmt::Display for ParseLineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseLineError::NotARecord => f.write_str("not a record line"),
            ParseLineError::MissingField(field) => {
                f.write_fmt(format_args!("missing the `{}` field", field))
            }
            ParseLineError::BadTimestamp(s) => {
                f.write_fmt(format_args!("invalid timestamp: `{}`", s))
            }
            ParseLineError::BadInt { field, error } => {
                f.write_fmt(format_args!("invalid integer in `{}`: {}", field, error))
            }
        }
    }
}

impl std::error::Error for ParseLineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseLineError::BadInt { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Error obtained when reading a whole log
#[derive(Debug)]
pub enum TraceReadError {
    IoError(std::io::Error),
    Open {
        path: std::path::PathBuf,
        error: std::io::Error,
    },
}

impl std::fmt::Display for TraceReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceReadError::IoError(io) => f.write_fmt(format_args!("IO error: {}", io)),
            TraceReadError::Open { path, error } => f.write_fmt(format_args!(
                "failed to open log {}: {}",
                path.display(),
                error
            )),
        }
    }
}

impl std::error::Error for TraceReadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TraceReadError::IoError(io) => Some(io),
            TraceReadError::Open { error, .. } => Some(error),
        }
    }
}

impl From<std::io::Error> for TraceReadError {
    fn from(value: std::io::Error) -> Self {
        TraceReadError::IoError(value)
    }
}
