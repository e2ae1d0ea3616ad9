//! # `trace-format`
//!
//! Readers for the logs recorded by the I/O tracer: disk activity (`stat_log`),
//! `read`/`fread` events (`read_log`) and file mappings (`mmap_log`)
mod access;
mod disk;
pub mod error;
mod fields;
mod trace;

pub use access::{AccessEvent, AccessKind};
pub use disk::DiskSample;
pub use error::{ParseLineError, TraceReadError};
pub use fields::parse_timestamp;
pub use trace::{accumulate_io, app_command, open_log, read_log, Log, Timeline, Trace, TracePaths};
