//! Core scheduling abstractions: errors, audit logging, the task
//! descriptor, the token-bucket rate limiter, resource probing, the
//! priority worker pool, and the task registry.

pub mod audit;
pub mod error;
pub mod registry;
pub mod resource_probe;
pub mod task;
pub mod token_bucket;
pub mod worker_pool;

pub use audit::{build_audit_event, AuditEvent, AuditSink, InMemoryAuditSink};
pub use error::{AppResult, SchedulerError};
pub use registry::{FnHandler, TaskHandler, TaskRegistry};
pub use resource_probe::{MockProbe, ResourceProbe, SysinfoProbe};
pub use task::{BoxFuture, RetryPolicy, ScheduledTask, TaskFn, TaskMeta, TaskOutcome, TaskResult};
pub use token_bucket::TokenBucket;
pub use worker_pool::{EndCallback, PoolStats, PriorityWorkerPool, StartCallback, WorkerPoolConfig};
