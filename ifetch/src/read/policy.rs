use crate::error::*;
use crate::policy::{Policy, PrefetchItem, TriggerSegment, TRIGGER_DELIMITER};

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

const APP_HEADER_PREFIX: &str = "APP=";

impl Policy {
    /// Read and parse a trigger list and its prefetch list
    ///
    /// The `APP=` header is taken from the trigger list, or else from the prefetch list
    pub fn from_readers<T: BufRead, P: BufRead>(triggers: T, prefetch: P) -> PolicyResult<Self> {
        let (trigger_header, triggers) = read_trigger_list(triggers)?;
        let (prefetch_header, segments) = read_prefetch_list(prefetch)?;

        Ok(Policy {
            app_header: trigger_header.or(prefetch_header),
            triggers,
            segments,
        })
    }

    /// Open a policy from its two files
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(
        trigger_path: P,
        prefetch_path: Q,
    ) -> PolicyResult<Self> {
        let open = |path: &Path| {
            File::open(path)
                .map(BufReader::new)
                .map_err(|error| PolicyError::Open {
                    path: path.to_path_buf(),
                    error,
                })
        };

        Self::from_readers(
            open(trigger_path.as_ref())?,
            open(prefetch_path.as_ref())?,
        )
    }
}

/// A header is only recognized before the first record
fn take_header(line: &str, header: &mut Option<String>, seen_record: bool) -> bool {
    if seen_record || header.is_some() || !line.starts_with(APP_HEADER_PREFIX) {
        return false;
    }

    *header = Some(line.to_string());
    true
}

/// Malformed lines never abort a load
fn skip(error: PolicyError) {
    tracing::warn!(%error, "skipping policy line");
}

fn read_trigger_list<R: BufRead>(r: R) -> PolicyResult<(Option<String>, Vec<PrefetchItem>)> {
    let mut header = None;
    let mut triggers = Vec::new();
    for (idx, line) in r.lines().enumerate() {
        let line = line?;
        let line = line.trim_end();
        if line.is_empty() || take_header(line, &mut header, !triggers.is_empty()) {
            continue;
        }

        match line.parse() {
            Ok(trigger) => triggers.push(trigger),
            Err(error) => skip(PolicyError::BadTrigger {
                line: idx + 1,
                error,
            }),
        }
    }

    Ok((header, triggers))
}

/// Where the prefetch list reader is, relative to the segment delimiters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    /// No delimiter seen yet
    Preamble,

    /// After a delimiter, on its line
    AwaitingTrigger(usize),

    /// Within a segment
    Items,

    /// Within a segment whose trigger line was bad
    Dropping,
}

fn read_prefetch_list<R: BufRead>(r: R) -> PolicyResult<(Option<String>, Vec<TriggerSegment>)> {
    let mut header = None;
    let mut segments: Vec<TriggerSegment> = Vec::new();
    let mut cursor = Cursor::Preamble;
    let mut dropped = 0;

    for (idx, line) in r.lines().enumerate() {
        let line = line?;
        let line = line.trim_end();
        let line_no = idx + 1;
        if line.is_empty() {
            continue;
        }

        if line == TRIGGER_DELIMITER {
            if let Cursor::AwaitingTrigger(line) = cursor {
                skip(PolicyError::MissingTrigger { line });
            }
            cursor = Cursor::AwaitingTrigger(line_no);
            continue;
        }

        if cursor == Cursor::Preamble && take_header(line, &mut header, false) {
            continue;
        }

        let item = match line.parse::<PrefetchItem>() {
            Ok(item) => item,
            Err(error) if matches!(cursor, Cursor::AwaitingTrigger(_)) => {
                skip(PolicyError::BadTrigger {
                    line: line_no,
                    error,
                });
                dropped += 1;
                cursor = Cursor::Dropping;
                continue;
            }
            Err(error) => {
                skip(PolicyError::BadItem {
                    line: line_no,
                    error,
                });
                continue;
            }
        };

        match cursor {
            Cursor::AwaitingTrigger(_) => {
                segments.push(TriggerSegment {
                    trigger: item.into(),
                    items: Vec::new(),
                });
                cursor = Cursor::Items;
            }
            Cursor::Items => {
                if let Some(segment) = segments.last_mut() {
                    segment.items.push(item);
                }
            }
            Cursor::Preamble => skip(PolicyError::ItemOutsideSegment { line: line_no }),
            Cursor::Dropping => {}
        }
    }

    if let Cursor::AwaitingTrigger(line) = cursor {
        skip(PolicyError::MissingTrigger { line });
    }
    if dropped > 0 {
        tracing::warn!(segments = dropped, "dropped segments without a valid trigger line");
    }

    Ok((header, segments))
}
