//! # `runifetch`
//!
//! A tool for running an application with trigger-activated prefetching
//!
//! Example usage:
//! ```sh
//! $ runifetch # run the application named in the policy header
//! $ runifetch -- /usr/bin/viewer --scene big # run another command line
//! $ runifetch --no-spawn --idle-exit-ms 60000 # only watch, for an application started elsewhere
//! $ PREFETCH_CONCURRENCY=8 PREFETCH_COOLDOWN_MS=500 runifetch # every knob can also come from the environment
//! ```
use ifetch::engine::*;
use ifetch::*;
use trace_format::app_command;

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::{Child, Command};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version)]
/// runifetch: run an application and prefetch for it
///
/// Watches the trigger files of a policy; whenever one is accessed, the files that followed it
/// when the policy was learned are read ahead into the page cache
struct Cli {
    /// Trigger list
    #[arg(long, env = "TRIGGER_LOG_PATH", default_value = TRIGGER_LIST, value_hint = clap::ValueHint::FilePath)]
    trigger_log: PathBuf,

    /// Prefetch list
    #[arg(long, env = "PREFETCH_LOG_PATH", default_value = PREFETCH_LIST, value_hint = clap::ValueHint::FilePath)]
    prefetch_log: PathBuf,

    /// Minimum time between two prefetches of the same trigger (0 disables it)
    #[arg(long, env = "PREFETCH_COOLDOWN_MS", default_value_t = 0)]
    cooldown_ms: u64,

    /// Longest wait for a watch event
    #[arg(long, env = "EVENT_LOOP_POLL_MS", default_value_t = 1000)]
    poll_ms: u64,

    /// Stop after this long without a prefetch (0 disables it)
    #[arg(long, env = "EVENT_LOOP_IDLE_EXIT_MS", default_value_t = 0)]
    idle_exit_ms: u64,

    /// Workers per prefetch
    #[arg(long, env = "PREFETCH_CONCURRENCY", default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Pause of each worker after an item (microseconds)
    #[arg(long, env = "PREFETCH_SLEEP_US", default_value_t = 0)]
    sleep_us: u64,

    /// Skip files larger than this (KiB, 0 disables the guard)
    #[arg(long, env = "PREFETCH_MAX_SIZE_KB", default_value_t = 0)]
    max_size_kb: u64,

    /// Bytes read at the start of each item (KiB)
    #[arg(long, env = "PREFETCH_TOUCH_KB", default_value_t = DEFAULT_TOUCH_BYTES / 1024)]
    touch_kb: u64,

    /// Items kept per trigger (0 keeps them all)
    #[arg(long, env = "PREFETCH_TOP_N", default_value_t = 0)]
    top_n: usize,

    /// Items under these prefixes are never prefetched (comma separated)
    #[arg(long, env = "PREFETCH_SKIP_PREFIXES", value_delimiter = ',')]
    skip_prefixes: Vec<String>,

    /// Where each prefetch writes its summary
    #[arg(long, env = "PREFETCH_SUMMARY_PATH", default_value = DEFAULT_SUMMARY_PATH)]
    summary: PathBuf,

    /// Do not write prefetch summaries
    #[arg(long)]
    no_summary: bool,

    /// Watch trigger paths as written instead of resolving symlinks
    #[arg(long)]
    no_canonicalize: bool,

    /// Do not start the application
    #[arg(long)]
    no_spawn: bool,

    /// Log more (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,

    /// Application to run (defaults to the `APP=` header of the policy)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

impl Cli {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            load: LoadOptions {
                top_n: self.top_n,
                skip_prefixes: self
                    .skip_prefixes
                    .iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                canonicalize: !self.no_canonicalize,
            },
            event_loop: LoopConfig::from_millis(self.cooldown_ms, self.poll_ms, self.idle_exit_ms),
            executor: ExecutorConfig {
                concurrency: self.concurrency.max(1),
                sleep: Duration::from_micros(self.sleep_us),
                max_file_size: self.max_size_kb * 1024,
                touch_bytes: self.touch_kb * 1024,
                summary_path: (!self.no_summary).then(|| self.summary.clone()),
            },
        }
    }

    /// The command line to run, if any
    fn app(&self, policy: &Policy) -> Option<Vec<String>> {
        if self.no_spawn {
            return None;
        }
        if !self.command.is_empty() {
            return Some(self.command.clone());
        }

        policy.app_header.as_deref().and_then(app_command)
    }
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

fn spawn(argv: &[String]) -> anyhow::Result<Child> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow::anyhow!("empty application command line"))?;

    let child = Command::new(program)
        .args(args)
        .spawn()
        .with_context(|| format!("failed to start {}", program))?;
    tracing::info!(pid = child.id(), command = ?argv, "started application");

    Ok(child)
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_logging(args.verbose, args.quiet);
    let config = args.engine_config();

    let policy = Policy::open(&args.trigger_log, &args.prefetch_log).with_context(|| {
        format!(
            "failed to load the policy ({}, {})",
            args.trigger_log.display(),
            args.prefetch_log.display()
        )
    })?;

    let mut inotify = Inotify::new().context("failed to initialize inotify")?;
    let mut table = WatchTable::install(&policy, &mut inotify, &config.load);
    if table.is_empty() {
        anyhow::bail!(
            "none of the {} triggers in {} could be watched",
            policy.triggers.len(),
            args.trigger_log.display()
        );
    }
    tracing::info!(
        watches = table.len(),
        items = table.item_count(),
        "waiting for trigger accesses"
    );

    let mut child = match args.app(&policy) {
        Some(argv) => Some(spawn(&argv)?),
        None => {
            tracing::warn!("no application to run, only watching");
            None
        }
    };

    let event_loop = EventLoop::new(config.event_loop);
    let mut prefetcher = Prefetcher::new(config.executor);
    let summary = match child.as_mut() {
        Some(child) => event_loop.run(&mut table, &mut inotify, child, &mut prefetcher),
        None => event_loop.run(&mut table, &mut inotify, &mut Detached, &mut prefetcher),
    };

    let (batches, totals) = prefetcher.shutdown();
    table.teardown(&mut inotify);

    tracing::info!(
        reason = ?summary.reason,
        events = summary.events,
        dispatches = summary.dispatches,
        cooled = summary.cooled,
        batches,
        files = totals.files,
        bytes_advised = totals.bytes_advised,
        bytes_touched = totals.bytes_touched,
        open_failures = totals.open_failures,
        "stopped"
    );

    if summary.reason == StopReason::SourceFailed {
        anyhow::bail!("stopped watching: the watch source failed");
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("runifetch").chain(args.iter().copied()))
    }

    #[test]
    fn application() {
        let policy = Policy {
            app_header: Some("APP=/usr/bin/viewer --scene x | USER=me | HOST=box".to_string()),
            ..Default::default()
        };

        assert_eq!(
            parse(&[]).app(&policy),
            Some(vec!["/usr/bin/viewer".to_string(), "--scene".to_string(), "x".to_string()])
        );
        assert_eq!(
            parse(&["--", "/bin/true", "-v"]).app(&policy),
            Some(vec!["/bin/true".to_string(), "-v".to_string()])
        );
        assert_eq!(parse(&["--no-spawn"]).app(&policy), None);
        assert_eq!(parse(&[]).app(&Policy::default()), None);
    }

    #[test]
    fn engine_knobs() {
        let config = parse(&[
            "--cooldown-ms",
            "500",
            "--concurrency",
            "0",
            "--touch-kb",
            "8",
            "--skip-prefixes",
            "/tmp/cache/,",
            "--no-summary",
        ])
        .engine_config();

        assert_eq!(config.event_loop.cooldown, Some(Duration::from_millis(500)));
        assert_eq!(config.event_loop.idle_exit, None);
        assert_eq!(config.executor.concurrency, 1);
        assert_eq!(config.executor.touch_bytes, 8192);
        assert_eq!(config.executor.summary_path, None);
        assert_eq!(config.load.skip_prefixes, ["/tmp/cache/"]);
    }
}
