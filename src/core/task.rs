//! C2 — the immutable task descriptor and its type-erased executable unit.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::core::error::SchedulerError;
use crate::external::llm::Token;
use crate::util::ids::{Priority, TaskId};

/// A boxed, `Send` future — the shape every task closure and handler future
/// takes once type-erased.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a task produced. Heterogeneous task results are represented as
/// either an opaque JSON value or a streaming token channel, per the boxed
/// tagged-union design called out for heterogeneous payloads.
pub enum TaskResult {
    /// A one-shot result value.
    Value(Value),
    /// A streaming result; the receiving end reads tokens as they land.
    Tokens(flume::Receiver<Token>),
    /// The task produced no meaningful result (side-effect only).
    Empty,
}

impl fmt::Debug for TaskResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Tokens(_) => f.write_str("Tokens(..)"),
            Self::Empty => f.write_str("Empty"),
        }
    }
}

impl Clone for TaskResult {
    fn clone(&self) -> Self {
        match self {
            Self::Value(v) => Self::Value(v.clone()),
            // `flume::Receiver` is itself a cheap, cloneable handle onto the
            // same underlying channel, so cloning a streaming result gives
            // the clone its own read position over the same stream of tokens.
            Self::Tokens(rx) => Self::Tokens(rx.clone()),
            Self::Empty => Self::Empty,
        }
    }
}

/// What a task's closure resolves to.
pub type TaskOutcome = Result<TaskResult, SchedulerError>;

/// The type-erased executable unit carried by a [`ScheduledTask`].
///
/// `Fn`, not `FnOnce`: a retried task is invoked again from scratch, so the
/// closure must be safely re-callable. `Arc` makes re-enqueuing cheap (no
/// clone of captured state) and lets the same closure be shared if a task
/// is ever inspected without being consumed.
pub type TaskFn = Arc<dyn Fn() -> BoxFuture<'static, TaskOutcome> + Send + Sync>;

/// Retry behavior shared by the pool's own retry loop and by
/// `ProactiveScheduler`'s resubmission path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first failure.
    pub max_retries: u32,
    /// Base of the exponential backoff (`backoff_base ^ retries`).
    pub backoff_base: f64,
    /// Upper bound on a single backoff delay.
    pub backoff_cap: Duration,
    /// Fractional jitter applied symmetrically around the computed delay, `0..1`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base: 1.5,
            backoff_cap: Duration::from_secs(60),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Validate the policy's fields.
    ///
    /// # Errors
    /// Returns [`SchedulerError::InvalidArgument`] if `jitter` is out of `[0, 1]`.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(SchedulerError::InvalidArgument(format!(
                "jitter must be within [0, 1], got {}",
                self.jitter
            )));
        }
        if self.backoff_base <= 0.0 {
            return Err(SchedulerError::InvalidArgument(
                "backoff_base must be positive".into(),
            ));
        }
        Ok(())
    }

    /// The base backoff delay for the given retry attempt, before jitter and
    /// before the cap is applied.
    #[must_use]
    pub fn base_delay(&self, retries: u32) -> Duration {
        let secs = self.backoff_base.powi(i32::try_from(retries).unwrap_or(i32::MAX));
        Duration::from_secs_f64(secs.min(self.backoff_cap.as_secs_f64()))
    }
}

/// An immutable task descriptor. Owned by the submitter until it enters the
/// queue, then owned by the pool until final completion or a retry
/// re-enqueue. Every field is immutable except `retries` and `scheduled_at`,
/// which the pool bumps on retry.
pub struct ScheduledTask {
    /// Opaque, pool-unique identifier.
    pub task_id: TaskId,
    /// Scheduling priority.
    pub priority: Priority,
    /// Wall-clock instant (ms since epoch) at or after which the task may run.
    pub scheduled_at: u128,
    /// Monotone submission sequence number; breaks ties within a priority/time.
    pub sequence: u64,
    /// The executable unit, invoked once per attempt (including retries).
    pub func: TaskFn,
    /// Human-readable name (often the registry name for registry-dispatched work).
    pub name: String,
    /// Capability/rate-limit/concurrency tags.
    pub labels: HashSet<String>,
    /// Optional wall-clock deadline (ms since epoch) after which the task is abandoned.
    pub deadline: Option<u128>,
    /// Retry behavior.
    pub retry: RetryPolicy,
    /// Attempts made so far.
    pub retries: u32,
    /// Opaque observability context.
    pub context: std::collections::HashMap<String, Value>,
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("task_id", &self.task_id)
            .field("priority", &self.priority)
            .field("scheduled_at", &self.scheduled_at)
            .field("sequence", &self.sequence)
            .field("name", &self.name)
            .field("labels", &self.labels)
            .field("deadline", &self.deadline)
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}

/// A snapshot of a task's observable fields, handed to the pool's
/// start/end callbacks. Does not carry the executable closure.
#[derive(Debug, Clone)]
pub struct TaskMeta {
    /// The task's identifier.
    pub task_id: TaskId,
    /// The task's registered/human-readable name.
    pub name: String,
    /// Scheduling priority.
    pub priority: Priority,
    /// Labels carried by the task.
    pub labels: HashSet<String>,
    /// Observability context.
    pub context: std::collections::HashMap<String, Value>,
    /// Attempt number this callback corresponds to (0 on first attempt).
    pub retries: u32,
}

impl From<&ScheduledTask> for TaskMeta {
    fn from(task: &ScheduledTask) -> Self {
        Self {
            task_id: task.task_id,
            name: task.name.clone(),
            priority: task.priority,
            labels: task.labels.clone(),
            context: task.context.clone(),
            retries: task.retries,
        }
    }
}
