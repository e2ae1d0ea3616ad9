use crate::access::AccessEvent;
use crate::disk::DiskSample;
use crate::error::{ParseLineError, TraceReadError};

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const APP_HEADER_PREFIX: &str = "APP=";

/// The `APP=` header may only appear among the first lines of a log
const HEADER_SCAN_LINES: usize = 32;

/// Records parsed from one log, with its passthrough header
#[derive(Debug, Clone, PartialEq)]
pub struct Log<T> {
    /// `APP=<cmdline> | USER=<u> | HOST=<h>`, verbatim
    pub app_header: Option<String>,
    pub records: Vec<T>,

    /// Malformed lines that did not produce a record
    pub skipped: usize,
}

impl<T> Default for Log<T> {
    fn default() -> Self {
        Log {
            app_header: None,
            records: Vec::new(),
            skipped: 0,
        }
    }
}

/// Read a full log
///
/// Lines that do not parse are dropped; reading stops after `max_records` records
/// (`0` lifts the ceiling)
pub fn read_log<T, BR>(reader: BR, max_records: usize) -> Result<Log<T>, TraceReadError>
where
    T: FromStr<Err = ParseLineError>,
    BR: BufRead,
{
    let mut log = Log::default();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if idx < HEADER_SCAN_LINES && log.app_header.is_none() {
            if let Some(header) = parse_app_header(&line) {
                log.app_header = Some(header);
                continue;
            }
        }

        match line.parse::<T>() {
            Ok(record) => log.records.push(record),
            Err(ParseLineError::NotARecord) => log.skipped += 1,
            Err(error) => {
                tracing::debug!(line = idx + 1, %error, "dropping malformed log line");
                log.skipped += 1;
            }
        }

        if max_records > 0 && log.records.len() >= max_records {
            tracing::warn!(max_records, "log record ceiling reached, ignoring the rest");
            break;
        }
    }

    Ok(log)
}

/// Open and read a log file
///
/// A missing log reads as an empty one
pub fn open_log<T, P>(path: P, max_records: usize) -> Result<Log<T>, TraceReadError>
where
    T: FromStr<Err = ParseLineError>,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    match File::open(path) {
        Ok(file) => read_log(BufReader::new(file), max_records),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "log not found, treating it as empty");
            Ok(Log::default())
        }
        Err(error) => Err(TraceReadError::Open {
            path: path.to_path_buf(),
            error,
        }),
    }
}

fn parse_app_header(line: &str) -> Option<String> {
    let line = line.trim_end_matches(['\n', '\r']);
    line.starts_with(APP_HEADER_PREFIX).then(|| line.to_string())
}

/// Extract the command line from an `APP=` header
///
/// `APP=/usr/bin/app --flag | USER=u | HOST=h` yields `["/usr/bin/app", "--flag"]`
pub fn app_command(header: &str) -> Option<Vec<String>> {
    let cmdline = header.trim().strip_prefix(APP_HEADER_PREFIX)?;
    let cmdline = cmdline
        .split_once(" | ")
        .map(|(cmd, _)| cmd)
        .unwrap_or(cmdline);
    let argv = cmdline
        .split_whitespace()
        .map(str::to_string)
        .collect::<Vec<_>>();

    (!argv.is_empty()).then_some(argv)
}

/// Fill in `cumulative_io` from the per-period deltas
pub fn accumulate_io(samples: &mut [DiskSample]) {
    let mut total = 0.0;
    for sample in samples {
        total += sample.delta_io;
        sample.cumulative_io = total;
    }
}

/// All access events, stably sorted by timestamp
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    events: Vec<AccessEvent>,
}

impl Timeline {
    /// Merge read and mmap events
    ///
    /// Events with equal timestamps keep their relative order, reads first
    pub fn new(reads: Vec<AccessEvent>, mmaps: Vec<AccessEvent>) -> Self {
        let mut events = reads;
        events.extend(mmaps);
        events.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        Timeline { events }
    }

    pub fn events(&self) -> &[AccessEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events whose timestamps lie within the bounds
    pub fn between(&self, start: Bound<f64>, end: Bound<f64>) -> &[AccessEvent] {
        let lo = match start {
            Bound::Included(ts) => self.events.partition_point(|ev| ev.timestamp < ts),
            Bound::Excluded(ts) => self.events.partition_point(|ev| ev.timestamp <= ts),
            Bound::Unbounded => 0,
        };
        let hi = match end {
            Bound::Included(ts) => self.events.partition_point(|ev| ev.timestamp <= ts),
            Bound::Excluded(ts) => self.events.partition_point(|ev| ev.timestamp < ts),
            Bound::Unbounded => self.events.len(),
        };

        if lo < hi {
            &self.events[lo..hi]
        } else {
            &[]
        }
    }

    /// Drop every event strictly before `start`
    pub fn retain_since(&mut self, start: f64) {
        let lo = self.events.partition_point(|ev| ev.timestamp < start);
        self.events.drain(..lo);
    }
}

/// Locations of the three logs of a recorded run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracePaths {
    pub stat: PathBuf,
    pub read: PathBuf,
    pub mmap: PathBuf,
}

impl TracePaths {
    /// `stat_log`, `read_log` and `mmap_log` inside `dir`
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        TracePaths {
            stat: dir.join("stat_log"),
            read: dir.join("read_log"),
            mmap: dir.join("mmap_log"),
        }
    }
}

/// A whole recorded run: disk activity and the merged access timeline
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trace {
    pub app_header: Option<String>,
    pub disk: Vec<DiskSample>,
    pub timeline: Timeline,

    /// Malformed lines across all three logs
    pub skipped: usize,
}

impl Trace {
    pub fn open(paths: &TracePaths, max_records: usize) -> Result<Self, TraceReadError> {
        let stat = open_log::<DiskSample, _>(&paths.stat, max_records)?;
        let reads = open_log::<AccessEvent, _>(&paths.read, max_records)?;
        let mmaps = open_log::<AccessEvent, _>(&paths.mmap, max_records)?;

        tracing::info!(
            samples = stat.records.len(),
            reads = reads.records.len(),
            mmaps = mmaps.records.len(),
            "loaded trace"
        );

        Ok(Trace::from_logs(stat, reads, mmaps))
    }

    /// Assemble a trace; the header is taken from the read log, then the mmap log, then the stat log
    pub fn from_logs(
        stat: Log<DiskSample>,
        reads: Log<AccessEvent>,
        mmaps: Log<AccessEvent>,
    ) -> Self {
        let app_header = reads
            .app_header
            .or(mmaps.app_header)
            .or(stat.app_header);
        let skipped = stat.skipped + reads.skipped + mmaps.skipped;

        let mut disk = stat.records;
        disk.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        accumulate_io(&mut disk);

        Trace {
            app_header,
            disk,
            timeline: Timeline::new(reads.records, mmaps.records),
            skipped,
        }
    }

    /// Ignore everything strictly before `start`
    ///
    /// Returns `false` (and leaves the trace untouched) if no access event lies at or after it
    pub fn activate_at(&mut self, start: f64) -> bool {
        if !self.timeline.events().iter().any(|ev| ev.timestamp >= start) {
            return false;
        }

        self.timeline.retain_since(start);
        self.disk.retain(|sample| sample.timestamp >= start);
        accumulate_io(&mut self.disk);
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::AccessKind;

    use std::io::Write;

    const READ_LOG: &str = "APP=/usr/bin/viewer --open scene | USER=me | HOST=box
===== Read Log Started =====
[2025-11-12 21:54:10] PID:7 | Type:READ | Status:OK | Errno:0 | FD:3 | File:/tmp/data/a.bin | Offset:0 | Size:20000
[2025-11-12 21:54:11] PID:7 | Type:READ | Status:OK | Errno:0 | FD:3 | File:/tmp/data/a.bin | Offset:20000 | Size:bogus
[2025-11-12 21:54:12] PID:7 | Type:FREAD | Status:OK | Errno:0 | FD:4 | File:/tmp/data/b.bin | Offset:0 | Size:5000
";

    fn read(ts: f64, path: &str) -> AccessEvent {
        AccessEvent {
            timestamp: ts,
            path: path.to_string(),
            offset: 0,
            length: 1,
            kind: AccessKind::Read {
                buffered: false,
                actual_len: None,
            },
        }
    }

    fn mmap(ts: f64, path: &str) -> AccessEvent {
        AccessEvent {
            kind: AccessKind::Mmap {
                addr_start: 0,
                addr_end: 4096,
            },
            ..read(ts, path)
        }
    }

    #[test]
    fn reads_log() {
        let log: Log<AccessEvent> = read_log(READ_LOG.as_bytes(), 0).unwrap();
        assert_eq!(
            log.app_header.as_deref(),
            Some("APP=/usr/bin/viewer --open scene | USER=me | HOST=box")
        );
        assert_eq!(log.records.len(), 2);
        assert_eq!(log.skipped, 2);
        assert_eq!(log.records[1].path, "/tmp/data/b.bin");
    }

    #[test]
    fn record_ceiling() {
        let log: Log<AccessEvent> = read_log(READ_LOG.as_bytes(), 1).unwrap();
        assert_eq!(log.records.len(), 1);
        assert_eq!(log.records[0].path, "/tmp/data/a.bin");
    }

    #[test]
    fn missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log: Log<DiskSample> = open_log(dir.path().join("stat_log"), 0).unwrap();
        assert!(log.records.is_empty());
        assert!(log.app_header.is_none());
    }

    #[test]
    fn opens_trace() {
        let dir = tempfile::tempdir().unwrap();
        let paths = TracePaths::in_dir(dir.path());
        File::create(&paths.read)
            .unwrap()
            .write_all(READ_LOG.as_bytes())
            .unwrap();
        let mut stat = File::create(&paths.stat).unwrap();
        writeln!(stat, "[2025-11-12 21:54:11] Device:sda | io_time_ms:4 | in_flight:0").unwrap();
        writeln!(stat, "[2025-11-12 21:54:10] Device:sda | io_time_ms:3 | in_flight:0").unwrap();

        let trace = Trace::open(&paths, 0).unwrap();
        assert!(trace.app_header.is_some());
        assert_eq!(trace.timeline.len(), 2);
        assert_eq!(trace.disk.len(), 2);
        assert_eq!(trace.disk[0].delta_io, 3.0);
        assert_eq!(trace.disk[1].cumulative_io, 7.0);
    }

    #[test]
    fn timeline_order() {
        let timeline = Timeline::new(
            vec![read(2.0, "/r2"), read(1.0, "/r1")],
            vec![mmap(1.0, "/m1"), mmap(0.5, "/m0")],
        );
        let paths = timeline
            .events()
            .iter()
            .map(|ev| ev.path.as_str())
            .collect::<Vec<_>>();
        assert_eq!(paths, ["/m0", "/r1", "/m1", "/r2"]);
    }

    #[test]
    fn timeline_between() {
        let timeline = Timeline::new(
            (0..5).map(|ts| read(ts as f64, "/a")).collect(),
            Vec::new(),
        );
        let ts = |evs: &[AccessEvent]| evs.iter().map(|ev| ev.timestamp).collect::<Vec<_>>();

        assert_eq!(
            ts(timeline.between(Bound::Excluded(1.0), Bound::Included(3.0))),
            [2.0, 3.0]
        );
        assert_eq!(
            ts(timeline.between(Bound::Included(1.0), Bound::Excluded(3.0))),
            [1.0, 2.0]
        );
        assert_eq!(
            ts(timeline.between(Bound::Unbounded, Bound::Excluded(0.0))),
            Vec::<f64>::new()
        );
        assert!(timeline
            .between(Bound::Included(4.0), Bound::Included(1.0))
            .is_empty());
    }

    #[test]
    fn activation() {
        let mut trace = Trace {
            timeline: Timeline::new(vec![read(1.0, "/a"), read(5.0, "/b")], Vec::new()),
            ..Default::default()
        };
        assert!(!trace.activate_at(10.0));
        assert_eq!(trace.timeline.len(), 2);

        assert!(trace.activate_at(2.0));
        assert_eq!(trace.timeline.len(), 1);
        assert_eq!(trace.timeline.events()[0].path, "/b");
    }

    #[test]
    fn app_commands() {
        assert_eq!(
            app_command("APP=/usr/bin/viewer --open scene | USER=me | HOST=box"),
            Some(vec![
                "/usr/bin/viewer".to_string(),
                "--open".to_string(),
                "scene".to_string()
            ])
        );
        assert_eq!(
            app_command("APP=/bin/true"),
            Some(vec!["/bin/true".to_string()])
        );
        assert_eq!(app_command("APP= | USER=me"), None);
        assert_eq!(app_command("/tmp/a,0,1"), None);
    }
}
