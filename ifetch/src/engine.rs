//! Online engine
//!
//! Loads a policy into a [`WatchTable`], waits for trigger files to be touched in an
//! [`EventLoop`] and prefetches their segments with a [`Prefetcher`]
mod event_loop;
mod executor;
mod table;
mod watch;

pub use event_loop::*;
pub use executor::*;
pub use table::*;
pub use watch::*;

/// Everything the engine can be tuned with
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    pub load: LoadOptions,
    pub event_loop: LoopConfig,
    pub executor: ExecutorConfig,
}
