use std::num::ParseIntError;

/// Error obtained when parsing a `path,offset,length` line
#[derive(Debug, PartialEq, Eq)]
pub enum ParseItemError {
    /// The line does not have the two `,` delimiters
    MissingDelimiter(String),
    EmptyPath,
    BadOffset(ParseIntError),
    BadLength(ParseIntError),
}

impl std::fmt::Display for ParseItemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseItemError::MissingDelimiter(s) => f.write_fmt(format_args!(
                "expected `path,offset,length`, found `{}`",
                s
            )),
            ParseItemError::EmptyPath => f.write_str("empty path"),
            ParseItemError::BadOffset(e) => f.write_fmt(format_args!("invalid offset: {}", e)),
            ParseItemError::BadLength(e) => f.write_fmt(format_args!("invalid length: {}", e)),
        }
    }
}

impl std::error::Error for ParseItemError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseItemError::BadOffset(e) => Some(e),
            ParseItemError::BadLength(e) => Some(e),
            _ => None,
        }
    }
}
