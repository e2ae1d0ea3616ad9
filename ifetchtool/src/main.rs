//! # `ifetchtool`
//!
//! A tool for learning a prefetch policy from a recorded trace
//!
//! Example usage:
//! ```sh
//! $ ifetchtool --log-dir /tmp # reads /tmp/{stat,read,mmap}_log, writes ./trigger_log.txt and ./prefetch_log.txt
//! $ ifetchtool --profile tight -o policy/ # fewer, shorter segments; never reuses a path
//! $ ANALYZER_TOP_K=8 IFETCHER_NO_MERGE=1 ifetchtool # every knob can also come from the environment
//! ```
use ifetch::filter::PathFilter;
use ifetch::*;
use trace_format::{Trace, TracePaths};

use anyhow::Context;
use clap::builder::BoolishValueParser;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ProfileArg {
    /// Prefetch up to the end of each burst
    Windowed,
    /// Short fixed windows, stricter reads, no path reuse
    Tight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BoundaryArg {
    Inclusive,
    Exclusive,
}

#[derive(Parser, Debug)]
#[command(version)]
/// ifetchtool: learn a prefetch policy from a recorded trace
///
/// Finds the bursts of disk activity in the trace, attributes each to the file access that
/// started it, and writes the accesses that followed as that trigger's prefetch segment
struct Cli {
    /// Directory with the `stat_log`, `read_log` and `mmap_log` traces
    #[arg(long, env = "IFETCHER_LOG_DIR", default_value = "/tmp", value_hint = clap::ValueHint::DirPath)]
    log_dir: PathBuf,

    /// Directory to write the trigger and prefetch lists to
    #[arg(short, long, default_value = ".", value_hint = clap::ValueHint::DirPath)]
    output_dir: PathBuf,

    /// Set of defaults to start from
    #[arg(long, value_enum, env = "IFETCHER_PROFILE", default_value_t = ProfileArg::Windowed)]
    profile: ProfileArg,

    /// Reads shorter than this (bytes) never count
    #[arg(long, env = "IFETCHER_READ_THRESHOLD")]
    read_threshold: Option<u64>,

    /// Minimum distance between two triggers on the same file (seconds)
    #[arg(long, env = "IFETCHER_SAME_FILE_COOLDOWN_SEC")]
    cooldown_sec: Option<f64>,

    /// Density smoothing window (samples)
    #[arg(long, env = "ANALYZER_DENSITY_WINDOW")]
    density_window: Option<usize>,

    /// Reads a trigger needs within its burst
    #[arg(long, env = "ANALYZER_MIN_READS_IN_WINDOW")]
    min_reads: Option<usize>,

    /// Bytes a trigger needs to read within its burst
    #[arg(long, env = "ANALYZER_MIN_BYTES_IN_WINDOW")]
    min_bytes: Option<u64>,

    /// Items per segment (0 lifts the cap)
    #[arg(long, env = "ANALYZER_PREFETCH_MAX_ITEMS")]
    max_items: Option<usize>,

    /// Bytes per segment (0 lifts the cap)
    #[arg(long, env = "ANALYZER_PREFETCH_MAX_BYTES")]
    max_bytes: Option<u64>,

    /// Longest prefetch item (KiB)
    #[arg(long, env = "IFETCHER_MAX_LEN_PER_ITEM_KB")]
    max_item_kb: Option<u64>,

    /// Lookback windows tried when resolving a trigger (seconds, comma separated)
    #[arg(long, env = "ANALYZER_LOOKBACK_SEC", value_delimiter = ',')]
    lookback: Vec<f64>,

    /// How long after a burst its reads still count (seconds)
    #[arg(long, env = "ANALYZER_TMAX_EXTEND_SEC")]
    extend_sec: Option<f64>,

    /// Bursts considered
    #[arg(long, env = "ANALYZER_TOP_K")]
    top_k: Option<usize>,

    /// Segments written
    #[arg(long, env = "IFETCHER_MAX_TRIGGERS")]
    max_triggers: Option<usize>,

    /// Prefetch a fixed window after each trigger instead of up to the end of its burst (seconds)
    #[arg(long, env = "IFETCHER_WINDOW_SEC")]
    window_sec: Option<f64>,

    /// Keep contiguous items of the same file apart
    #[arg(long, env = "IFETCHER_NO_MERGE", value_parser = BoolishValueParser::new())]
    no_merge: bool,

    /// Accept triggers backed only by a file mapping
    #[arg(long, env = "IFETCHER_ALLOW_MMAP_ONLY", value_parser = BoolishValueParser::new())]
    allow_mmap_only: bool,

    /// Whether window ends are part of the window
    #[arg(long, value_enum, env = "ANALYZER_WINDOW_BOUNDARY")]
    boundary: Option<BoundaryArg>,

    /// Only prefetch files in the trigger's directory
    #[arg(long, env = "ANALYZER_DIR_GROUPING", value_parser = BoolishValueParser::new())]
    dir_grouping: bool,

    /// Ignore everything recorded before this timestamp (seconds since the epoch)
    #[arg(long, env = "IFETCHER_START_TS")]
    start_ts: Option<f64>,

    /// Application data directory; everything beneath it may be prefetched
    #[arg(long, env = "IFETCHER_DATA_DIR", value_hint = clap::ValueHint::DirPath)]
    data_dir: Option<String>,

    /// Path prefixes never used as triggers or items (comma separated)
    #[arg(long, env = "ANALYZER_SKIP_PREFIXES", value_delimiter = ',')]
    skip_prefixes: Vec<String>,

    /// File extensions never used (comma separated)
    #[arg(long, env = "ANALYZER_SKIP_EXTS", value_delimiter = ',')]
    skip_exts: Vec<String>,

    /// Records read per log
    #[arg(long, env = "IFETCHER_MAX_RECORDS")]
    max_records: Option<usize>,

    /// Write paths as recorded instead of resolving symlinks
    #[arg(long)]
    no_canonicalize: bool,

    /// Log more (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

/// Older deployments set some knobs under a second name
fn env_alias<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}

impl Cli {
    fn analyzer_config(&self) -> AnalyzerConfig {
        let mut config = AnalyzerConfig::for_profile(match self.profile {
            ProfileArg::Windowed => Profile::Windowed,
            ProfileArg::Tight => Profile::Tight,
        });

        if let Some(threshold) = self.read_threshold {
            config.read_size_threshold = threshold;
        }
        if let Some(cooldown) = self.cooldown_sec {
            config.cooldown_sec = cooldown.max(0.0);
        }
        if let Some(window) = self.density_window {
            config.window_size = window;
        }
        if let Some(min_reads) = self.min_reads.or_else(|| env_alias("IFETCHER_MIN_READS")) {
            config.min_reads = min_reads;
        }
        if let Some(min_bytes) = self.min_bytes.or_else(|| env_alias("IFETCHER_MIN_BYTES")) {
            config.min_bytes = min_bytes;
        }
        if let Some(max_items) = self
            .max_items
            .or_else(|| env_alias("IFETCHER_PREFETCH_TOP_N"))
        {
            config.max_items = max_items;
        }
        if let Some(max_bytes) = self.max_bytes {
            config.max_bytes = max_bytes;
        }
        if let Some(kb) = self.max_item_kb.filter(|&kb| kb > 0) {
            config.max_item_len = kb * 1024;
        }

        let lookback = self
            .lookback
            .iter()
            .copied()
            .filter(|&tau| tau > 0.0)
            .collect::<Vec<_>>();
        if !lookback.is_empty() {
            config.lookback = lookback;
        }

        if let Some(extend) = self.extend_sec {
            config.extend_sec = extend.max(0.0);
        }
        if let Some(k) = self.top_k.filter(|&k| k > 0) {
            config.max_intervals = k;
        }
        if let Some(n) = self.max_triggers.filter(|&n| n > 0) {
            config.max_triggers = n;
        }
        if let Some(window) = self.window_sec.filter(|&w| w > 0.0) {
            config.prefetch_window = PrefetchWindow::Fixed(window);
        }

        config.merge &= !self.no_merge;
        config.allow_mmap_only |= self.allow_mmap_only;
        config.same_dir_only |= self.dir_grouping;
        config.canonicalize &= !self.no_canonicalize;

        if let Some(boundary) = self.boundary {
            config.boundary = match boundary {
                BoundaryArg::Inclusive => WindowBoundary::Inclusive,
                BoundaryArg::Exclusive => WindowBoundary::Exclusive,
            };
        }

        config.start_ts = self.start_ts.or(config.start_ts);
        config.filter = PathFilter {
            data_dir: self.data_dir.clone().filter(|dir| !dir.is_empty()),
            skip_prefixes: clean_list(&self.skip_prefixes),
            skip_extensions: clean_list(&self.skip_exts),
        };

        if let Some(max_records) = self.max_records {
            config.max_records = max_records;
        }

        config
    }
}

fn clean_list(list: &[String]) -> Vec<String> {
    list.iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn init_logging(verbose: u8, quiet: bool) {
    let fallback = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_logging(args.verbose, args.quiet);

    let config = args.analyzer_config();
    tracing::info!(
        read_threshold = config.read_size_threshold,
        cooldown_sec = config.cooldown_sec,
        window = config.window_size,
        min_reads = config.min_reads,
        min_bytes = config.min_bytes,
        max_items = config.max_items,
        max_bytes = config.max_bytes,
        max_item_len = config.max_item_len,
        lookback = ?config.lookback,
        extend_sec = config.extend_sec,
        top_k = config.max_intervals,
        merge = config.merge,
        "analyzer configuration"
    );

    let paths = TracePaths::in_dir(&args.log_dir);
    let trace = Trace::open(&paths, config.max_records).with_context(|| {
        format!("failed to read the traces in {}", args.log_dir.display())
    })?;

    let (policy, report) = analyze(trace, &config);
    tracing::info!(
        samples = report.samples,
        reads = report.reads,
        mmaps = report.mmaps,
        start_ts = ?report.start_ts,
        window = report.window,
        bursts = report.bursts,
        unresolved = report.unresolved,
        "analysis done"
    );
    tracing::info!(
        length = report.rejections.length,
        mmap_rule = report.rejections.mmap_rule,
        path = report.rejections.path,
        cooldown = report.rejections.cooldown,
        assigned = report.rejections.assigned,
        empty_segments = report.empty_segments,
        "rejected triggers"
    );
    if policy.segments.is_empty() {
        tracing::warn!("no trigger found, writing an empty policy");
    }

    let trigger_path = args.output_dir.join(TRIGGER_LIST);
    let prefetch_path = args.output_dir.join(PREFETCH_LIST);
    policy
        .write_files(&trigger_path, &prefetch_path)
        .context("failed to write the policy")?;

    tracing::info!(
        segments = report.segments,
        items = policy.segments.iter().map(|s| s.items.len()).sum::<usize>(),
        triggers = %trigger_path.display(),
        prefetch = %prefetch_path.display(),
        "policy written"
    );

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("ifetchtool").chain(args.iter().copied()))
    }

    #[test]
    fn profile_defaults() {
        let config = parse(&["--profile", "tight"]).analyzer_config();
        assert_eq!(config.read_size_threshold, 4096);
        assert_eq!(config.prefetch_window, PrefetchWindow::Fixed(3.0));
        assert!(config.dedupe_assigned);
    }

    #[test]
    fn overrides() {
        let config = parse(&[
            "--max-item-kb",
            "16",
            "--lookback",
            "2,0,0.5",
            "--window-sec",
            "1.5",
            "--boundary",
            "exclusive",
            "--no-merge",
            "--skip-prefixes",
            "/tmp/cache/, ",
            "--top-k",
            "0",
        ])
        .analyzer_config();

        assert_eq!(config.max_item_len, 16 * 1024);
        assert_eq!(config.lookback, [2.0, 0.5]);
        assert_eq!(config.prefetch_window, PrefetchWindow::Fixed(1.5));
        assert_eq!(config.boundary, WindowBoundary::Exclusive);
        assert!(!config.merge);
        assert_eq!(config.filter.skip_prefixes, ["/tmp/cache/"]);
        assert_eq!(config.max_intervals, 5);
    }
}
