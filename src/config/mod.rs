//! Serde-validated configuration for a whole deployment: worker pool,
//! router, remote cluster nodes, and per-label rate/concurrency limits.

pub mod app;

pub use app::{AppConfig, ConcurrencyLimitConfig, RateLimitConfig, RemoteNodeConfig};
