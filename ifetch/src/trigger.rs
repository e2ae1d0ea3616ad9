//! Trigger resolution
//!
//! A burst is attributed to the file whose first access shortly precedes it and which keeps
//! being read while the burst grows. Accepted triggers are then deduplicated across bursts

use crate::config::AnalyzerConfig;
use crate::filter::Canonicalizer;
use crate::policy::TriggerRecord;

use std::collections::{HashMap, HashSet};
use std::ops::Bound;
use trace_format::{AccessEvent, Timeline};

/// Why a candidate did not become a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    /// Shorter than the read-size threshold
    Length,

    /// Backed by a mapping alone
    MmapRule,

    /// The path is not legal
    Path,

    /// The same path fired too recently
    Cooldown,

    /// The path was already used in this run
    Assigned,
}

/// How many candidates were dropped, per reason
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RejectionCounts {
    pub length: usize,
    pub mmap_rule: usize,
    pub path: usize,
    pub cooldown: usize,
    pub assigned: usize,
}

impl RejectionCounts {
    pub fn count(&mut self, rejection: Rejection) {
        match rejection {
            Rejection::Length => self.length += 1,
            Rejection::MmapRule => self.mmap_rule += 1,
            Rejection::Path => self.path += 1,
            Rejection::Cooldown => self.cooldown += 1,
            Rejection::Assigned => self.assigned += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.length + self.mmap_rule + self.path + self.cooldown + self.assigned
    }
}

/// The access a burst is attributed to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedTrigger<'a> {
    /// Event the trigger range and timestamp come from
    pub event: &'a AccessEvent,

    /// Bytes read from the trigger's file during the burst
    pub burst_bytes: u64,
}

/// Number and volume of qualifying reads of `path` within the bounds
pub fn window_reads(
    timeline: &Timeline,
    path: &str,
    start: Bound<f64>,
    end: Bound<f64>,
    read_size_threshold: u64,
) -> (usize, u64) {
    timeline
        .between(start, end)
        .iter()
        .filter(|ev| ev.is_read() && ev.length >= read_size_threshold && ev.path == path)
        .fold((0, 0), |(count, bytes), ev| (count + 1, bytes + ev.length))
}

/// Attribute the burst spanning `[t_min, t_max]` (seconds) to a file access
///
/// Lookback windows are tried in order; the first one yielding a candidate wins
///
/// A path rejected for its length is counted once per burst, however many windows see it
pub fn resolve<'a>(
    timeline: &'a Timeline,
    config: &AnalyzerConfig,
    t_min: f64,
    t_max: f64,
    rejections: &mut RejectionCounts,
) -> Option<ResolvedTrigger<'a>> {
    let mut too_short: HashSet<&'a str> = HashSet::new();
    config.lookback.iter().find_map(|&tau| {
        resolve_with_lookback(timeline, config, t_min, t_max, tau, &mut too_short, rejections)
    })
}

fn resolve_with_lookback<'a>(
    timeline: &'a Timeline,
    config: &AnalyzerConfig,
    t_min: f64,
    t_max: f64,
    tau: f64,
    too_short: &mut HashSet<&'a str>,
    rejections: &mut RejectionCounts,
) -> Option<ResolvedTrigger<'a>> {
    let lookback = timeline.between(Bound::Included(t_min - tau), Bound::Included(t_min));
    let burst_end = config.boundary.upper(t_max + config.extend_sec);

    // events are in timeline order, so the first event seen per path is its first access
    let mut firsts: Vec<&AccessEvent> = Vec::new();
    for ev in lookback {
        if config.filter.skips_trigger(&ev.path) || firsts.iter().any(|f| f.path == ev.path) {
            continue;
        }
        if ev.length < config.read_size_threshold {
            if too_short.insert(ev.path.as_str()) {
                rejections.count(Rejection::Length);
            }
            continue;
        }
        firsts.push(ev);
    }

    // (first access timestamp, trigger)
    let mut best: Option<(f64, ResolvedTrigger<'a>)> = None;
    for first in firsts {
        let (reads, bytes) = window_reads(
            timeline,
            &first.path,
            Bound::Included(t_min),
            burst_end,
            config.read_size_threshold,
        );
        if reads < config.min_reads || bytes < config.min_bytes {
            continue;
        }

        let (confirming, _) = window_reads(
            timeline,
            &first.path,
            Bound::Excluded(first.timestamp),
            config.boundary.upper(t_max),
            config.read_size_threshold,
        );
        if confirming == 0 {
            continue;
        }

        let Some(event) = materialize(lookback, first, config, rejections) else {
            continue;
        };

        let better = match &best {
            None => true,
            Some((first_ts, b)) => {
                bytes > b.burst_bytes || (bytes == b.burst_bytes && first.timestamp < *first_ts)
            }
        };
        if better {
            best = Some((
                first.timestamp,
                ResolvedTrigger {
                    event,
                    burst_bytes: bytes,
                },
            ));
        }
    }

    best.map(|(_, trigger)| trigger)
}

/// Pick the concrete event a first access stands for
///
/// A mapping is replaced by a read of the same file within the lookback window, if any
fn materialize<'a>(
    lookback: &'a [AccessEvent],
    first: &'a AccessEvent,
    config: &AnalyzerConfig,
    rejections: &mut RejectionCounts,
) -> Option<&'a AccessEvent> {
    if first.is_read() {
        return Some(first);
    }

    let read = lookback.iter().find(|ev| {
        ev.is_read() && ev.path == first.path && ev.length >= config.read_size_threshold
    });
    match read {
        Some(read) => Some(read),
        None if config.allow_mmap_only => Some(first),
        None => {
            rejections.count(Rejection::MmapRule);
            None
        }
    }
}

/// Triggers accepted so far in a run, with the paths they and their items claimed
#[derive(Debug, Default)]
pub struct TriggerLedger {
    cooldown_sec: f64,
    dedupe_assigned: bool,
    fired: HashMap<String, Vec<f64>>,
    assigned: HashSet<String>,
}

impl TriggerLedger {
    pub fn new(config: &AnalyzerConfig) -> Self {
        TriggerLedger {
            cooldown_sec: config.cooldown_sec,
            dedupe_assigned: config.dedupe_assigned,
            fired: HashMap::new(),
            assigned: HashSet::new(),
        }
    }

    /// Check a resolved trigger against the legality, assignment and cooldown rules
    ///
    /// Returns the trigger record, with its canonical path
    pub fn check(
        &self,
        resolved: &ResolvedTrigger,
        config: &AnalyzerConfig,
        canon: &mut Canonicalizer,
    ) -> Result<TriggerRecord, Rejection> {
        let event = resolved.event;
        let path = canon.canonical(&event.path);
        if !config.filter.is_legal(&event.path) || !config.filter.is_legal(&path) {
            return Err(Rejection::Path);
        }

        if self.dedupe_assigned && self.assigned.contains(&path) {
            return Err(Rejection::Assigned);
        }

        let cooling = self.fired.get(&path).is_some_and(|fired| {
            fired
                .iter()
                .any(|&ts| (event.timestamp - ts).abs() < self.cooldown_sec)
        });
        if cooling {
            return Err(Rejection::Cooldown);
        }

        Ok(TriggerRecord {
            path,
            offset: event.offset,
            length: event.length,
            timestamp: Some(event.timestamp),
        })
    }

    /// Record an emitted trigger and the paths its segment claims
    pub fn accept<'a, I: IntoIterator<Item = &'a str>>(&mut self, trigger: &TriggerRecord, items: I) {
        if let Some(ts) = trigger.timestamp {
            self.fired.entry(trigger.path.clone()).or_default().push(ts);
        }
        self.assigned.insert(trigger.path.clone());
        self.assigned.extend(items.into_iter().map(str::to_string));
    }
}
