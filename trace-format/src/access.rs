use crate::error::ParseLineError;
use crate::fields::Fields;

use std::str::FromStr;

/// What kind of access produced an [`AccessEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    /// `read(2)` or `fread(3)`
    Read {
        /// Whether it came through stdio (`fread`)
        buffered: bool,

        /// Bytes actually transferred, when the tracer recorded them
        actual_len: Option<u64>,
    },

    /// A file-backed mapping appeared in `/proc/<pid>/maps`
    Mmap { addr_start: u64, addr_end: u64 },
}

/// A timestamped access to a byte range of a file
#[derive(Debug, Clone, PartialEq)]
pub struct AccessEvent {
    /// Seconds
    pub timestamp: f64,
    pub path: String,
    pub offset: u64,

    /// Requested length (for reads) or mapping size (for mmaps)
    pub length: u64,
    pub kind: AccessKind,
}

impl AccessEvent {
    pub fn is_read(&self) -> bool {
        matches!(self.kind, AccessKind::Read { .. })
    }

    pub fn is_mmap(&self) -> bool {
        matches!(self.kind, AccessKind::Mmap { .. })
    }

    /// Whether this event touches exactly the `(path, offset, length)` range
    pub fn same_range(&self, path: &str, offset: u64, length: u64) -> bool {
        self.path == path && self.offset == offset && self.length == length
    }
}

impl FromStr for AccessEvent {
    type Err = ParseLineError;

    /// parse a line in the read or mmap log
    ///
    /// `[<date> <time>] PID:<pid> | Type:READ | ... | File:<path> | Offset:<int> | Size:<int>`
    /// `[<date> <time>] PID:<pid> | Type:MMAP | ... | File:<path> | AddrStart:<int> | AddrEnd:<int> | FileOffset:<int> | Size:<int>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields = Fields::new(s);
        let kind = fields.get("Type").ok_or(ParseLineError::NotARecord)?;

        let path = fields.require("File")?.trim();
        if path.is_empty() {
            return Err(ParseLineError::MissingField("File"));
        }

        let (kind, offset) = match kind.trim() {
            ty @ ("READ" | "FREAD") => (
                AccessKind::Read {
                    buffered: ty == "FREAD",
                    actual_len: None,
                },
                fields.int("Offset")?,
            ),
            "MMAP" => (
                AccessKind::Mmap {
                    addr_start: fields.int("AddrStart")?,
                    addr_end: fields.int("AddrEnd")?,
                },
                fields.int("FileOffset")?,
            ),
            _ => return Err(ParseLineError::NotARecord),
        };

        Ok(AccessEvent {
            timestamp: fields.timestamp()?,
            path: path.to_string(),
            offset,
            length: fields.int("Size")?,
            kind,
        })
    }
}
