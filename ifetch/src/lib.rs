//! # `ifetch`
//!
//! `ifetch` learns which file accesses announce a burst of I/O and prefetches what follows them.
//!
//! Offline, [`analyze`](analyze::analyze) turns a recorded [`trace_format::Trace`] into a
//! [`Policy`]: disk activity is smoothed into a density curve, its ramps become bursts, each burst
//! is traced back to the access that started it, and the accesses that followed become that
//! trigger's prefetch segment. Policies are persisted as a trigger list and a segmented prefetch
//! list.
//!
//! Online, the [`engine`] watches the trigger files and, when one is touched, advises the kernel
//! to read its segment ahead.

pub mod analyze;
pub mod burst;
pub mod config;
pub mod density;
pub mod engine;
pub mod error;
pub mod filter;
pub mod policy;
pub mod segment;
pub mod trigger;

mod read;
mod write;

pub use analyze::{analyze, AnalysisReport};
pub use config::{AnalyzerConfig, PrefetchWindow, Profile, WindowBoundary};
pub use policy::{Policy, PrefetchItem, TriggerRecord, TriggerSegment};
pub use policy::{PREFETCH_LIST, TRIGGER_DELIMITER, TRIGGER_LIST};

pub use error::{ParseItemError, PolicyError, PolicyResult};
