//! Offline analysis: from a recorded trace to a prefetch policy

use crate::burst::{find_bursts, rank};
use crate::config::{AnalyzerConfig, PrefetchWindow};
use crate::density::DensityCurve;
use crate::filter::Canonicalizer;
use crate::policy::{Policy, TriggerSegment};
use crate::segment::build_segment;
use crate::trigger::{resolve, RejectionCounts, TriggerLedger};

use trace_format::Trace;

/// What happened during an analysis run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisReport {
    pub samples: usize,
    pub reads: usize,
    pub mmaps: usize,

    /// Activation timestamp actually applied
    pub start_ts: Option<f64>,

    /// Density window actually used
    pub window: usize,

    /// Bursts considered, after ranking
    pub bursts: usize,

    /// Bursts no trigger could be resolved for
    pub unresolved: usize,

    pub rejections: RejectionCounts,

    /// Accepted triggers whose window held no prefetchable item
    pub empty_segments: usize,

    pub segments: usize,
}

/// Analyze a trace
pub fn analyze(mut trace: Trace, config: &AnalyzerConfig) -> (Policy, AnalysisReport) {
    let mut report = AnalysisReport::default();

    if let Some(start) = config.start_ts {
        if trace.activate_at(start) {
            report.start_ts = Some(start);
        } else {
            tracing::warn!(start, "no event after the activation timestamp, ignoring it");
        }
    }

    let events = trace.timeline.events();
    report.samples = trace.disk.len();
    report.reads = events.iter().filter(|ev| ev.is_read()).count();
    report.mmaps = events.len() - report.reads;

    let curve = DensityCurve::new(&trace.disk, config.window_size);
    report.window = curve.window();

    let bursts = rank(find_bursts(&curve), config.max_intervals);
    report.bursts = bursts.len();

    let mut canon = Canonicalizer::new(config.canonicalize);
    let mut ledger = TriggerLedger::new(config);
    let mut segments = Vec::new();

    for burst in bursts {
        if segments.len() >= config.max_triggers {
            break;
        }

        let t_min = trace.disk[burst.start].timestamp;
        let t_max = trace.disk[burst.end].timestamp;
        let Some(resolved) = resolve(&trace.timeline, config, t_min, t_max, &mut report.rejections)
        else {
            tracing::debug!(t_min, t_max, "no trigger for burst");
            report.unresolved += 1;
            continue;
        };

        let trigger = match ledger.check(&resolved, config, &mut canon) {
            Ok(trigger) => trigger,
            Err(rejection) => {
                tracing::debug!(path = %resolved.event.path, ?rejection, "trigger rejected");
                report.rejections.count(rejection);
                continue;
            }
        };

        let window_end = match config.prefetch_window {
            PrefetchWindow::UntilBurstEnd => t_max + config.extend_sec,
            PrefetchWindow::Fixed(window) => resolved.event.timestamp + window,
        };
        let items = build_segment(
            &trace.timeline,
            config,
            resolved.event,
            &trigger,
            window_end,
            &mut canon,
        );
        if items.is_empty() {
            tracing::debug!(path = %trigger.path, "trigger has nothing to prefetch");
            report.empty_segments += 1;
            continue;
        }

        tracing::debug!(
            path = %trigger.path,
            score = burst.score,
            items = items.len(),
            "accepted trigger"
        );
        ledger.accept(&trigger, items.iter().map(|item| item.path.as_str()));
        segments.push(TriggerSegment { trigger, items });
    }

    report.segments = segments.len();
    (Policy::new(trace.app_header, segments), report)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::policy::PrefetchItem;
    use crate::trigger::test::read;
    use trace_format::{AccessEvent, DiskSample, Timeline};

    /// Disk samples one second apart, from `t0`
    fn disk(t0: f64, io: &[f64]) -> Vec<DiskSample> {
        let mut samples = io
            .iter()
            .enumerate()
            .map(|(t, &delta_io)| DiskSample {
                timestamp: t0 + t as f64,
                delta_io,
                cumulative_io: 0.0,
            })
            .collect::<Vec<_>>();
        trace_format::accumulate_io(&mut samples);
        samples
    }

    fn trace(disk: Vec<DiskSample>, reads: Vec<AccessEvent>) -> Trace {
        Trace {
            app_header: Some("APP=/usr/bin/viewer | USER=me | HOST=box".to_string()),
            disk,
            timeline: Timeline::new(reads, Vec::new()),
            skipped: 0,
        }
    }

    fn config() -> AnalyzerConfig {
        AnalyzerConfig {
            window_size: 3,
            canonicalize: false,
            ..AnalyzerConfig::windowed()
        }
    }

    /// one burst, from 100s to its peak at 104s
    const BURST: [f64; 10] = [0.0, 0.0, 0.0, 50.0, 80.0, 50.0, 0.0, 0.0, 0.0, 0.0];

    #[test]
    fn trigger_with_its_followers() {
        let reads = vec![
            read(100.0, "/tmp/data/a.bin", 0, 20000),
            read(101.0, "/tmp/data/a.bin", 0, 20000),
            read(101.5, "/tmp/data/b.bin", 0, 5000),
            read(102.0, "/tmp/data/c.bin", 0, 3000),
        ];
        let config = AnalyzerConfig {
            max_item_len: 4096,
            ..config()
        };
        let (policy, report) = analyze(trace(disk(100.0, &BURST), reads), &config);

        assert_eq!(report.window, 3);
        assert_eq!(report.bursts, 1);
        assert_eq!(report.segments, 1);
        assert_eq!(
            policy.app_header.as_deref(),
            Some("APP=/usr/bin/viewer | USER=me | HOST=box")
        );
        assert_eq!(
            policy.triggers,
            [PrefetchItem::new("/tmp/data/a.bin", 0, 20000)]
        );

        let segment = &policy.segments[0];
        assert_eq!(segment.trigger.timestamp, Some(100.0));
        assert_eq!(
            segment.items,
            [
                PrefetchItem::new("/tmp/data/b.bin", 0, 4096),
                PrefetchItem::new("/tmp/data/c.bin", 0, 3000),
            ]
        );
        assert!(segment.total_bytes() <= config.max_bytes);
    }

    #[test]
    fn same_file_within_cooldown() {
        // two bursts, 101s..103s and 106s..108s, both driven by `a.bin`
        let io = [20.0, 0.0, 0.0, 50.0, 80.0, 10.0, 0.0, 0.0, 60.0, 90.0, 10.0, 0.0];
        let reads = vec![
            read(101.0, "/tmp/data/a.bin", 0, 20000),
            read(102.0, "/tmp/data/a.bin", 0, 20000),
            read(102.5, "/tmp/data/b.bin", 0, 5000),
            read(106.0, "/tmp/data/a.bin", 0, 20000),
            read(107.0, "/tmp/data/a.bin", 0, 20000),
            read(107.5, "/tmp/data/c.bin", 0, 5000),
        ];

        let (policy, report) = analyze(trace(disk(100.0, &io), reads.clone()), &config());
        assert_eq!(report.bursts, 2);
        assert_eq!(report.rejections.cooldown, 1);
        assert_eq!(policy.segments.len(), 1);
        assert_eq!(policy.triggers[0].path, "/tmp/data/a.bin");

        let short_cooldown = AnalyzerConfig {
            cooldown_sec: 0.5,
            ..config()
        };
        let (policy, report) = analyze(trace(disk(100.0, &io), reads), &short_cooldown);
        assert_eq!(report.rejections.cooldown, 0);
        assert_eq!(policy.segments.len(), 2);
    }

    #[test]
    fn no_activity() {
        let (policy, report) = analyze(Trace::default(), &config());
        assert!(policy.is_empty());
        assert_eq!(report.bursts, 0);

        let flat = trace(disk(100.0, &[5.0; 12]), vec![read(100.0, "/tmp/data/a.bin", 0, 1)]);
        let (policy, report) = analyze(flat, &config());
        assert!(policy.segments.is_empty());
        assert_eq!(report.samples, 12);
        assert_eq!(report.reads, 1);
    }

    #[test]
    fn activation_timestamp() {
        let reads = vec![
            read(100.0, "/tmp/data/a.bin", 0, 20000),
            read(101.0, "/tmp/data/a.bin", 0, 20000),
            read(101.5, "/tmp/data/b.bin", 0, 5000),
        ];

        let late = AnalyzerConfig {
            start_ts: Some(500.0),
            ..config()
        };
        let (policy, report) = analyze(trace(disk(100.0, &BURST), reads.clone()), &late);
        assert_eq!(report.start_ts, None);
        assert_eq!(policy.segments.len(), 1);

        let mid = AnalyzerConfig {
            start_ts: Some(101.0),
            ..config()
        };
        let (policy, report) = analyze(trace(disk(100.0, &BURST), reads), &mid);
        assert_eq!(report.start_ts, Some(101.0));
        assert_eq!(report.reads, 2);
        assert_eq!(report.samples, 9);
        assert!(policy
            .segments
            .iter()
            .all(|s| s.trigger.timestamp.is_some_and(|ts| ts >= 101.0)));
    }

    #[test]
    fn fixed_window() {
        let reads = vec![
            read(100.0, "/tmp/data/a.bin", 0, 20000),
            read(101.0, "/tmp/data/a.bin", 0, 20000),
            read(101.5, "/tmp/data/b.bin", 0, 5000),
            read(103.5, "/tmp/data/c.bin", 0, 5000),
        ];
        let short = AnalyzerConfig {
            prefetch_window: PrefetchWindow::Fixed(2.0),
            ..config()
        };
        let (policy, _) = analyze(trace(disk(100.0, &BURST), reads), &short);
        assert_eq!(
            policy.segments[0].items,
            [PrefetchItem::new("/tmp/data/b.bin", 0, 5000)]
        );
    }
}
