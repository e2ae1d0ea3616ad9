//! Field extraction for the `Key:value | Key:value` log lines
use crate::error::ParseLineError;

use chrono::NaiveDateTime;

const FIELD_SEPARATOR: &str = " | ";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Split a log line into its timestamp text (if bracketed) and its fields
///
/// `[2025-11-12 21:54:13] PID:12 | Type:READ | File:/a | Offset:0 | Size:10`
pub(crate) struct Fields<'a> {
    timestamp: Option<&'a str>,
    body: &'a str,
}

impl<'a> Fields<'a> {
    pub(crate) fn new(line: &'a str) -> Self {
        let line = line.trim_end_matches(['\n', '\r']);
        if let Some(rest) = line.trim_start().strip_prefix('[') {
            if let Some((ts, body)) = rest.split_once(']') {
                return Fields {
                    timestamp: Some(ts),
                    body: body.trim_start(),
                };
            }
        }

        Fields {
            timestamp: None,
            body: line,
        }
    }

    /// Raw value of a field
    ///
    /// The key has to match a whole field name: `Offset` does not match `FileOffset`
    pub(crate) fn get(&self, key: &str) -> Option<&'a str> {
        self.body
            .split(FIELD_SEPARATOR)
            .filter_map(|field| field.split_once(':'))
            .find(|(k, _)| k.trim() == key)
            .map(|(_, v)| v)
    }

    pub(crate) fn require(&self, key: &'static str) -> Result<&'a str, ParseLineError> {
        self.get(key).ok_or(ParseLineError::MissingField(key))
    }

    /// Parse the leading integer of a field (trailing garbage is ignored)
    pub(crate) fn int(&self, key: &'static str) -> Result<u64, ParseLineError> {
        let value = self.require(key)?.trim_start();
        let end = value
            .char_indices()
            .find(|(_, c)| !c.is_ascii_digit())
            .map(|(idx, _)| idx)
            .unwrap_or(value.len());

        value[..end]
            .parse::<u64>()
            .map_err(|error| ParseLineError::BadInt { field: key, error })
    }

    /// Timestamp, in seconds
    pub(crate) fn timestamp(&self) -> Result<f64, ParseLineError> {
        let ts = self
            .timestamp
            .ok_or(ParseLineError::MissingField("timestamp"))?;
        parse_timestamp(ts)
    }
}

/// Parse a `YYYY-MM-DD HH:MM:SS` timestamp into seconds
///
/// Timestamps are only ever compared against one another, so the wall clock is read as UTC
pub fn parse_timestamp(s: &str) -> Result<f64, ParseLineError> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
        .map(|dt| dt.and_utc().timestamp() as f64)
        .map_err(|_| ParseLineError::BadTimestamp(s.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn split_fields() {
        let fields = Fields::new(
            "[2025-11-12 21:54:13] PID:12 | Type:MMAP | File:/a/b | FileOffset:4096 | Size:10\n",
        );
        assert_eq!(fields.get("PID"), Some("12"));
        assert_eq!(fields.get("Type"), Some("MMAP"));
        assert_eq!(fields.get("File"), Some("/a/b"));
        assert_eq!(fields.get("Offset"), None);
        assert_eq!(fields.int("FileOffset").unwrap(), 4096);
        assert_eq!(fields.int("Size").unwrap(), 10);
    }

    #[test]
    fn bad_fields() {
        let fields = Fields::new("[2025-11-12 21:54:13] Size:abc");
        assert!(matches!(
            fields.int("Size"),
            Err(ParseLineError::BadInt { field: "Size", .. })
        ));
        assert!(matches!(
            fields.int("Offset"),
            Err(ParseLineError::MissingField("Offset"))
        ));

        let fields = Fields::new("Size:10");
        assert!(matches!(
            fields.timestamp(),
            Err(ParseLineError::MissingField("timestamp"))
        ));
    }

    #[test]
    fn timestamps() {
        let a = parse_timestamp("2025-11-12 21:54:13").unwrap();
        let b = parse_timestamp("2025-11-12 21:55:14").unwrap();
        assert_eq!(b - a, 61.0);
        assert!(parse_timestamp("2025-13-12 21:54:13").is_err());
        assert!(parse_timestamp("yesterday").is_err());
    }
}
