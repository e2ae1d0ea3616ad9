//! Concurrent prefetch executor
//!
//! A batch is the item list of a watch that fired. Its items go into a private queue drained by
//! a small pool of workers; each item is opened, clamped to the file size, advised with
//! `POSIX_FADV_WILLNEED` and optionally touched. Nothing is retried.

use crate::engine::event_loop::Dispatch;
use crate::policy::PrefetchItem;

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_TOUCH_BYTES: u64 = 64 * 1024;
pub const DEFAULT_SUMMARY_PATH: &str = "prefetch_summary.json";

/// Largest read issued while touching
const TOUCH_CHUNK: u64 = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Workers per batch (at least one)
    pub concurrency: usize,

    /// Pause after each item
    pub sleep: Duration,

    /// Files larger than this are skipped (`0` disables the guard)
    pub max_file_size: u64,

    /// Bytes read at the start of each range to make it resident
    pub touch_bytes: u64,

    /// Where each batch writes its summary
    pub summary_path: Option<PathBuf>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            concurrency: DEFAULT_CONCURRENCY,
            sleep: Duration::ZERO,
            max_file_size: 0,
            touch_bytes: DEFAULT_TOUCH_BYTES,
            summary_path: Some(PathBuf::from(DEFAULT_SUMMARY_PATH)),
        }
    }
}

/// Aggregate counters of one or more batches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Items advised
    pub files: u64,
    pub bytes_advised: u64,
    pub bytes_touched: u64,
    pub open_failures: u64,

    /// Items skipped by the size guard
    pub oversized: u64,

    pub advise_failures: u64,
}

impl BatchStats {
    pub fn add(&mut self, other: &BatchStats) {
        self.files += other.files;
        self.bytes_advised += other.bytes_advised;
        self.bytes_touched += other.bytes_touched;
        self.open_failures += other.open_failures;
        self.oversized += other.oversized;
        self.advise_failures += other.advise_failures;
    }

    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::OpenFailed => self.open_failures += 1,
            Outcome::Oversized => self.oversized += 1,
            Outcome::Prefetched {
                advised,
                touched,
                advise_failed,
            } => {
                self.files += 1;
                self.bytes_advised += advised;
                self.bytes_touched += touched;
                if advise_failed {
                    self.advise_failures += 1;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    OpenFailed,
    Oversized,
    Prefetched {
        advised: u64,
        touched: u64,
        advise_failed: bool,
    },
}

/// Clamp a requested range to a file of `size` bytes
///
/// A zero length or a range past the end is trimmed to the end of the file; an offset past the
/// end falls back to the whole file
pub fn clamp_range(offset: u64, length: u64, size: u64) -> (u64, u64) {
    if length != 0 && offset.saturating_add(length) <= size {
        return (offset, length);
    }

    if offset < size {
        (offset, size - offset)
    } else {
        (0, size)
    }
}

/// Advise the kernel that `[offset, offset + length)` will be needed soon
pub fn will_need<F: AsRawFd>(fd: &F, offset: u64, length: u64) -> io::Result<()> {
    let out_of_range = |_| io::Error::new(io::ErrorKind::InvalidInput, "range out of bounds");
    let offset = libc::off_t::try_from(offset).map_err(out_of_range)?;
    let length = libc::off_t::try_from(length).map_err(out_of_range)?;

    // SAFETY: no pointers involved, the result is checked
    let ret = unsafe { libc::posix_fadvise(fd.as_raw_fd(), offset, length, libc::POSIX_FADV_WILLNEED) };
    if ret != 0 {
        return Err(io::Error::from_raw_os_error(ret));
    }

    Ok(())
}

/// Read (and discard) up to `length` bytes from `offset`, returning how many were read
fn touch(file: &File, offset: u64, length: u64) -> u64 {
    let mut buf = vec![0u8; length.min(TOUCH_CHUNK) as usize];
    let mut done = 0;
    while done < length {
        let want = (length - done).min(buf.len() as u64) as usize;
        match file.read_at(&mut buf[..want], offset + done) {
            Ok(0) => break,
            Ok(n) => done += n as u64,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => {
                tracing::debug!(%error, "touch read failed");
                break;
            }
        }
    }

    done
}

fn prefetch_item(item: &PrefetchItem, config: &ExecutorConfig) -> Outcome {
    let file = match File::open(&item.path) {
        Ok(file) => file,
        Err(error) => {
            tracing::warn!(path = %item.path, %error, "failed to open prefetch item, skipping it");
            return Outcome::OpenFailed;
        }
    };

    let size = match file.metadata() {
        Ok(metadata) => metadata.len(),
        Err(error) => {
            tracing::warn!(path = %item.path, %error, "failed to stat prefetch item, skipping it");
            return Outcome::OpenFailed;
        }
    };

    if config.max_file_size > 0 && size > config.max_file_size {
        tracing::debug!(path = %item.path, size, "prefetch item over the size guard");
        return Outcome::Oversized;
    }

    let (offset, length) = clamp_range(item.offset, item.length, size);
    let advise_failed = match will_need(&file, offset, length) {
        Ok(()) => false,
        Err(error) => {
            tracing::warn!(path = %item.path, %error, "posix_fadvise failed");
            true
        }
    };
    let touched = touch(&file, offset, length.min(config.touch_bytes));

    tracing::trace!(path = %item.path, offset, length, touched, "prefetched");
    Outcome::Prefetched {
        advised: length,
        touched,
        advise_failed,
    }
}

struct BatchState {
    queue: VecDeque<PrefetchItem>,
    stats: BatchStats,
}

fn lock(state: &Mutex<BatchState>) -> MutexGuard<'_, BatchState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Pop items until the queue is empty; the lock is never held across I/O
fn worker(state: &Mutex<BatchState>, config: &ExecutorConfig) {
    loop {
        let Some(item) = lock(state).queue.pop_front() else {
            break;
        };

        let outcome = prefetch_item(&item, config);
        lock(state).stats.record(outcome);

        if !config.sleep.is_zero() {
            std::thread::sleep(config.sleep);
        }
    }
}

/// Prefetch every item, with `config.concurrency` workers, and return once all are done
pub fn run_batch(items: &[PrefetchItem], config: &ExecutorConfig) -> BatchStats {
    let workers = config.concurrency.clamp(1, items.len().max(1));
    let state = Mutex::new(BatchState {
        queue: items.iter().cloned().collect(),
        stats: BatchStats::default(),
    });

    match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
        Ok(pool) => pool.scope(|s| {
            for _ in 0..workers {
                s.spawn(|_| worker(&state, config));
            }
        }),
        Err(error) => {
            tracing::warn!(%error, "failed to start prefetch workers, prefetching inline");
            worker(&state, config);
        }
    }

    let stats = lock(&state).stats;
    stats
}

fn epoch_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Write the summary of a batch as JSON
///
/// The summary is written beside `path` and renamed over it, so concurrent batches replace each
/// other whole
pub fn write_summary<P: AsRef<Path>>(
    path: P,
    stats: &BatchStats,
    started: SystemTime,
    finished: SystemTime,
) -> io::Result<()> {
    let summary = json::object! {
        files: stats.files,
        bytes_advised: stats.bytes_advised,
        bytes_touched: stats.bytes_touched,
        open_failures: stats.open_failures,
        oversized: stats.oversized,
        advise_failures: stats.advise_failures,
        start: epoch_secs(started),
        end: epoch_secs(finished),
    };

    let path = path.as_ref();
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(summary.pretty(2).as_bytes())?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Run a batch and write its summary
pub fn prefetch_batch(items: &[PrefetchItem], config: &ExecutorConfig) -> BatchStats {
    let started = SystemTime::now();
    let stats = run_batch(items, config);

    tracing::debug!(
        files = stats.files,
        bytes = stats.bytes_advised,
        touched = stats.bytes_touched,
        "prefetch batch done"
    );
    if let Some(path) = &config.summary_path {
        if let Err(error) = write_summary(path, &stats, started, SystemTime::now()) {
            tracing::warn!(path = %path.display(), %error, "failed to write the prefetch summary");
        }
    }

    stats
}

/// Runs every dispatch on its own thread and keeps track of them
#[derive(Debug)]
pub struct Prefetcher {
    config: Arc<ExecutorConfig>,
    in_flight: Vec<JoinHandle<BatchStats>>,
    totals: BatchStats,
    batches: usize,
}

impl Prefetcher {
    pub fn new(config: ExecutorConfig) -> Self {
        Prefetcher {
            config: Arc::new(config),
            in_flight: Vec::new(),
            totals: BatchStats::default(),
            batches: 0,
        }
    }

    /// Counters of the batches collected so far
    pub fn totals(&self) -> BatchStats {
        self.totals
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn collect(&mut self, handle: JoinHandle<BatchStats>) {
        match handle.join() {
            Ok(stats) => {
                self.totals.add(&stats);
                self.batches += 1;
            }
            Err(_) => tracing::warn!("prefetch batch panicked"),
        }
    }

    /// Wait for every batch in flight and return the counters of all batches
    pub fn shutdown(mut self) -> (usize, BatchStats) {
        for handle in std::mem::take(&mut self.in_flight) {
            self.collect(handle);
        }

        (self.batches, self.totals)
    }
}

impl Dispatch for Prefetcher {
    fn dispatch(&mut self, wd: i32, items: Arc<[PrefetchItem]>) {
        let config = Arc::clone(&self.config);
        let spawned = std::thread::Builder::new()
            .name(format!("prefetch-{}", wd))
            .spawn(move || prefetch_batch(&items, &config));

        match spawned {
            Ok(handle) => self.in_flight.push(handle),
            Err(error) => tracing::warn!(wd, %error, "failed to start prefetch batch"),
        }
    }

    fn reap(&mut self) {
        let (done, running): (Vec<_>, Vec<_>) = std::mem::take(&mut self.in_flight)
            .into_iter()
            .partition(|handle| handle.is_finished());
        self.in_flight = running;
        for handle in done {
            self.collect(handle);
        }
    }
}
