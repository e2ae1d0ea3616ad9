//! Prefetch policies
//!
//! A policy maps trigger accesses to the items to prefetch when they happen again.
//! It is persisted as two text files: a flat trigger list and a prefetch list segmented by
//! [`TRIGGER_DELIMITER`] lines
use crate::error::ParseItemError;

use std::str::FromStr;

/// Separates the segments of a prefetch list
pub const TRIGGER_DELIMITER: &str = "===TRIGGER===";

/// Default file name of the trigger list
pub const TRIGGER_LIST: &str = "trigger_log.txt";

/// Default file name of the prefetch list
pub const PREFETCH_LIST: &str = "prefetch_log.txt";

/// A byte range of a file, `path,offset,length` in the policy files
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrefetchItem {
    pub path: String,
    pub offset: u64,
    pub length: u64,
}

impl PrefetchItem {
    pub fn new<S: Into<String>>(path: S, offset: u64, length: u64) -> Self {
        PrefetchItem {
            path: path.into(),
            offset,
            length,
        }
    }

    /// Whether `other` starts exactly where this item ends, in the same file
    pub fn precedes(&self, other: &PrefetchItem) -> bool {
        self.path == other.path && self.offset.saturating_add(self.length) == other.offset
    }
}

impl std::fmt::Display for PrefetchItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{},{},{}", self.path, self.offset, self.length))
    }
}

impl FromStr for PrefetchItem {
    type Err = ParseItemError;

    /// parse a policy line
    ///
    /// `<path>,<offset>,<length>` (the path itself may contain commas)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim_end_matches(['\n', '\r']);
        let mut fields = s.rsplitn(3, ',');
        let (Some(length), Some(offset), Some(path)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(ParseItemError::MissingDelimiter(s.to_string()));
        };

        if path.is_empty() {
            return Err(ParseItemError::EmptyPath);
        }

        Ok(PrefetchItem {
            path: path.to_string(),
            offset: offset
                .trim()
                .parse()
                .map_err(ParseItemError::BadOffset)?,
            length: length
                .trim()
                .parse()
                .map_err(ParseItemError::BadLength)?,
        })
    }
}

/// An access chosen as a trigger
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerRecord {
    pub path: String,
    pub offset: u64,
    pub length: u64,

    /// When it happened in the trace; unknown once the policy is persisted
    pub timestamp: Option<f64>,
}

impl TriggerRecord {
    pub fn item(&self) -> PrefetchItem {
        PrefetchItem::new(self.path.clone(), self.offset, self.length)
    }
}

impl From<PrefetchItem> for TriggerRecord {
    fn from(item: PrefetchItem) -> Self {
        TriggerRecord {
            path: item.path,
            offset: item.offset,
            length: item.length,
            timestamp: None,
        }
    }
}

/// A trigger with the items to prefetch when it fires
///
/// The trigger's own range never appears among the items
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerSegment {
    pub trigger: TriggerRecord,
    pub items: Vec<PrefetchItem>,
}

impl TriggerSegment {
    pub fn total_bytes(&self) -> u64 {
        self.items.iter().map(|item| item.length).sum()
    }

    /// Distinct files, in order of first appearance
    pub fn files(&self) -> Vec<&str> {
        let mut files: Vec<&str> = Vec::new();
        for item in &self.items {
            if !files.contains(&item.path.as_str()) {
                files.push(&item.path);
            }
        }
        files
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Policy {
    /// `APP=` header passed through from the trace
    pub app_header: Option<String>,

    /// Contents of the trigger list
    pub triggers: Vec<PrefetchItem>,

    /// Contents of the prefetch list
    pub segments: Vec<TriggerSegment>,
}

impl Policy {
    /// Policy whose trigger list mirrors its segments
    pub fn new(app_header: Option<String>, segments: Vec<TriggerSegment>) -> Self {
        Policy {
            app_header,
            triggers: segments.iter().map(|s| s.trigger.item()).collect(),
            segments,
        }
    }

    /// First segment whose trigger is on `path`
    pub fn segment_for(&self, path: &str) -> Option<&TriggerSegment> {
        self.segments.iter().find(|s| s.trigger.path == path)
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty() && self.segments.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ok_parse() {
        assert_eq!(
            "/tmp/data/a.bin,4096,20000".parse::<PrefetchItem>().unwrap(),
            PrefetchItem::new("/tmp/data/a.bin", 4096, 20000)
        );
        assert_eq!(
            "/tmp/odd,name.bin,0,1\r\n".parse::<PrefetchItem>().unwrap(),
            PrefetchItem::new("/tmp/odd,name.bin", 0, 1)
        );
    }

    #[test]
    fn err_parse() {
        assert!(matches!(
            "/tmp/a.bin,0".parse::<PrefetchItem>(),
            Err(ParseItemError::MissingDelimiter(_))
        ));
        assert!(matches!(
            ",0,1".parse::<PrefetchItem>(),
            Err(ParseItemError::EmptyPath)
        ));
        assert!(matches!(
            "/a,x,1".parse::<PrefetchItem>(),
            Err(ParseItemError::BadOffset(_))
        ));
        assert!(matches!(
            "/a,0,-1".parse::<PrefetchItem>(),
            Err(ParseItemError::BadLength(_))
        ));
    }

    #[test]
    fn display() {
        let item = PrefetchItem::new("/tmp/b.bin", 0, 5000);
        assert_eq!(item.to_string(), "/tmp/b.bin,0,5000");
        assert_eq!(item.to_string().parse::<PrefetchItem>().unwrap(), item);
    }

    #[test]
    fn contiguity() {
        let a = PrefetchItem::new("/a", 0, 10);
        assert!(a.precedes(&PrefetchItem::new("/a", 10, 5)));
        assert!(!a.precedes(&PrefetchItem::new("/a", 11, 5)));
        assert!(!a.precedes(&PrefetchItem::new("/b", 10, 5)));
    }

    #[test]
    fn segments() {
        let segment = TriggerSegment {
            trigger: PrefetchItem::new("/t", 0, 1).into(),
            items: vec![
                PrefetchItem::new("/b", 0, 10),
                PrefetchItem::new("/c", 0, 20),
                PrefetchItem::new("/b", 10, 5),
            ],
        };
        assert_eq!(segment.total_bytes(), 35);
        assert_eq!(segment.files(), ["/b", "/c"]);

        let policy = Policy::new(None, vec![segment]);
        assert_eq!(policy.triggers, [PrefetchItem::new("/t", 0, 1)]);
        assert!(policy.segment_for("/t").is_some());
        assert!(policy.segment_for("/b").is_none());
    }
}
