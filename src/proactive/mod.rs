//! Ancillary periodic background work: the `ProactiveScheduler`.

/// `ProactiveScheduler` and its configuration.
pub mod scheduler;

pub use scheduler::{ProactiveConfig, ProactiveScheduler};
