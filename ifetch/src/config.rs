//! Analyzer configuration
//!
//! The two deployment modes differ only in their defaults: see [`Profile`]

use crate::filter::PathFilter;

use std::ops::Bound;

/// Named sets of analyzer defaults
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Profile {
    /// Prefetch everything up to the end of the burst; loose thresholds
    #[default]
    Windowed,

    /// Prefetch a short fixed window after each trigger; never reuse a path
    Tight,
}

/// Whether window ends are inclusive (`<=`) or exclusive (`<`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WindowBoundary {
    #[default]
    Inclusive,
    Exclusive,
}

impl WindowBoundary {
    pub fn admits(self, ts: f64, end: f64) -> bool {
        match self {
            WindowBoundary::Inclusive => ts <= end,
            WindowBoundary::Exclusive => ts < end,
        }
    }

    pub fn upper(self, end: f64) -> Bound<f64> {
        match self {
            WindowBoundary::Inclusive => Bound::Included(end),
            WindowBoundary::Exclusive => Bound::Excluded(end),
        }
    }
}

/// How far past the trigger a prefetch segment reaches
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrefetchWindow {
    /// Until the end of the burst, plus `extend_sec`
    UntilBurstEnd,

    /// A fixed number of seconds after the trigger
    Fixed(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerConfig {
    /// Reads (and mmaps) shorter than this never count
    pub read_size_threshold: u64,

    /// Minimum distance between two triggers on the same path (seconds)
    pub cooldown_sec: f64,

    /// Density smoothing window (odd)
    pub window_size: usize,

    pub min_reads: usize,
    pub min_bytes: u64,

    /// Per-segment caps (`0` lifts a cap)
    pub max_items: usize,
    pub max_bytes: u64,

    /// Longest prefetch item, in bytes
    pub max_item_len: u64,

    /// Lookback windows tried in order when resolving a trigger (seconds)
    pub lookback: Vec<f64>,

    /// How far past the burst end subsequent reads still count (seconds)
    pub extend_sec: f64,

    /// Number of ranked bursts considered
    pub max_intervals: usize,

    /// Number of segments emitted
    pub max_triggers: usize,

    pub prefetch_window: PrefetchWindow,

    /// Reject triggers on paths already used as triggers or items in this run
    pub dedupe_assigned: bool,

    /// Coalesce contiguous items of the same file
    pub merge: bool,

    /// Accept a trigger backed by a mapping alone
    pub allow_mmap_only: bool,

    pub boundary: WindowBoundary,

    /// Only prefetch files in the trigger's directory
    pub same_dir_only: bool,

    /// Ignore everything before this timestamp (seconds)
    pub start_ts: Option<f64>,

    pub filter: PathFilter,

    /// Resolve symlinks in emitted paths
    pub canonicalize: bool,

    /// Record ceiling per log
    pub max_records: usize,
}

impl AnalyzerConfig {
    pub fn windowed() -> Self {
        AnalyzerConfig {
            read_size_threshold: 0,
            cooldown_sec: 5.0,
            window_size: 11,
            min_reads: 2,
            min_bytes: 32 * 1024,
            max_items: 12,
            max_bytes: 256 * 1024,
            max_item_len: 64 * 1024,
            lookback: vec![4.0, 2.0, 1.0, 0.5],
            extend_sec: 3.0,
            max_intervals: 5,
            max_triggers: 5,
            prefetch_window: PrefetchWindow::UntilBurstEnd,
            dedupe_assigned: false,
            merge: true,
            allow_mmap_only: false,
            boundary: WindowBoundary::Inclusive,
            same_dir_only: false,
            start_ts: None,
            filter: PathFilter::default(),
            canonicalize: true,
            max_records: 10000,
        }
    }

    pub fn tight() -> Self {
        AnalyzerConfig {
            read_size_threshold: 4096,
            max_items: 16,
            max_bytes: 128 * 1024,
            max_triggers: 3,
            prefetch_window: PrefetchWindow::Fixed(3.0),
            dedupe_assigned: true,
            ..Self::windowed()
        }
    }

    pub fn for_profile(profile: Profile) -> Self {
        match profile {
            Profile::Windowed => Self::windowed(),
            Profile::Tight => Self::tight(),
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self::windowed()
    }
}
