//! The watch/cooldown event loop
//!
//! Waits on the watch source with a bounded timeout, dispatches the prefetch list of every
//! watch that fires, and stops when the application exits, when it has been idle for too long,
//! or when it is cancelled. Cancellation is checked between poll cycles.

use crate::engine::table::WatchTable;
use crate::engine::watch::EventSource;
use crate::policy::PrefetchItem;

use std::process::Child;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Something that prefetches the items of a watch that fired
///
/// `dispatch` must not block on the prefetch itself
pub trait Dispatch {
    fn dispatch(&mut self, wd: i32, items: Arc<[PrefetchItem]>);

    /// Called once per poll cycle
    fn reap(&mut self) {}
}

/// The monitored application
pub trait AppMonitor {
    /// Non-blocking check
    fn has_exited(&mut self) -> bool;
}

impl AppMonitor for Child {
    fn has_exited(&mut self) -> bool {
        match self.try_wait() {
            Ok(Some(status)) => {
                tracing::info!(pid = self.id(), %status, "application exited");
                true
            }
            Ok(None) => false,
            Err(error) => {
                tracing::warn!(pid = self.id(), %error, "failed to check on the application");
                true
            }
        }
    }
}

/// No application to monitor: only idle exit or cancellation stop the loop
#[derive(Debug, Clone, Copy, Default)]
pub struct Detached;

impl AppMonitor for Detached {
    fn has_exited(&mut self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    AppExited,
    IdleTimeout,
    SourceFailed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    /// Minimum time between two dispatches of the same watch (`None` disables it)
    pub cooldown: Option<Duration>,

    /// Longest single wait on the watch source
    pub poll_interval: Duration,

    /// Stop after this long without a dispatch (`None` disables it)
    pub idle_exit: Option<Duration>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        LoopConfig {
            cooldown: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            idle_exit: None,
        }
    }
}

impl LoopConfig {
    /// Build from millisecond knobs, where `0` disables cooldown and idle exit
    pub fn from_millis(cooldown_ms: u64, poll_ms: u64, idle_exit_ms: u64) -> Self {
        let enabled = |ms: u64| (ms > 0).then(|| Duration::from_millis(ms));
        LoopConfig {
            cooldown: enabled(cooldown_ms),
            poll_interval: Duration::from_millis(poll_ms),
            idle_exit: enabled(idle_exit_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    pub reason: StopReason,

    /// Access/open records seen
    pub events: usize,

    pub dispatches: usize,

    /// Records dropped because their watch was cooling down
    pub cooled: usize,

    /// Records for watches the table does not know
    pub unknown: usize,
}

#[derive(Debug)]
pub struct EventLoop {
    config: LoopConfig,
    cancel: Arc<AtomicBool>,
}

impl EventLoop {
    pub fn new(config: LoopConfig) -> Self {
        EventLoop {
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Setting the returned flag stops the loop at the end of the current poll cycle
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn run<S: EventSource, A: AppMonitor, D: Dispatch>(
        &self,
        table: &mut WatchTable,
        source: &mut S,
        app: &mut A,
        dispatcher: &mut D,
    ) -> LoopSummary {
        let mut summary = LoopSummary {
            reason: StopReason::Cancelled,
            events: 0,
            dispatches: 0,
            cooled: 0,
            unknown: 0,
        };
        let mut last_dispatch = Instant::now();

        summary.reason = loop {
            if self.cancel.load(Ordering::Relaxed) {
                break StopReason::Cancelled;
            }

            let events = match source.wait(self.config.poll_interval) {
                Ok(events) => events,
                Err(error) => {
                    tracing::warn!(%error, "failed to wait for watch events");
                    break StopReason::SourceFailed;
                }
            };

            for event in events.into_iter().filter(|ev| ev.is_access_or_open()) {
                summary.events += 1;
                let Some(entry) = table.get_mut(event.wd) else {
                    tracing::warn!(wd = event.wd, "no prefetch list for watch");
                    summary.unknown += 1;
                    continue;
                };

                let now = Instant::now();
                if let Some(cooldown) = self.config.cooldown {
                    if entry.cooling_down(now, cooldown) {
                        tracing::debug!(wd = event.wd, "cooldown active, skipping prefetch");
                        summary.cooled += 1;
                        continue;
                    }
                }

                tracing::debug!(wd = event.wd, trigger = %entry.trigger, items = entry.items.len(), "trigger fired");
                entry.fire(now);
                dispatcher.dispatch(event.wd, Arc::clone(&entry.items));
                summary.dispatches += 1;
                last_dispatch = now;
            }

            dispatcher.reap();

            if app.has_exited() {
                break StopReason::AppExited;
            }

            if let Some(idle) = self.config.idle_exit {
                if last_dispatch.elapsed() >= idle {
                    tracing::info!(idle_ms = idle.as_millis() as u64, "idle timeout reached");
                    break StopReason::IdleTimeout;
                }
            }
        };

        summary
    }
}
