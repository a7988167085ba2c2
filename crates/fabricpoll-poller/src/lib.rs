//! fabricpoll Poller - crawl, persist and reclaim device state
//!
//! This crate holds the polling core:
//! - Differential persistence that skips writes of unchanged values
//! - A plan-driven crawler over Redfish resource trees
//! - Liveness tracking with relative-staleness eviction
//! - A fixed-interval scheduler and the per-endpoint device poller

pub mod crawler;
pub mod error;
pub mod liveness;
pub mod persist;
pub mod plan;
pub mod poller;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use crawler::{CrawlReport, Crawler};
pub use error::{CrawlError, PollError};
pub use liveness::{LivenessMap, LivenessTracker};
pub use persist::{persist, PersistOutcome};
pub use plan::{Link, Step, TraversalPlan};
pub use poller::{DevicePoller, PollerConfig};
pub use scheduler::PollScheduler;
