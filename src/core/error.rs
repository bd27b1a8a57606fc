//! Error types for scheduler, dispatcher, and router operations.

use thiserror::Error;

/// Errors produced by scheduler components.
#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    /// A submit-time argument failed validation (bad priority, negative delay, …).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The pool has been stopped and no longer accepts submissions.
    #[error("pool stopped")]
    PoolStopped,

    /// An optional queue-depth bound was configured and has been reached.
    #[error("queue full")]
    QueueFull,

    /// A task's deadline passed before it was executed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Internal signal used by the worker loop to re-enqueue a task that a
    /// rate limiter denied. Never surfaced to an end-callback.
    #[error("rate limited")]
    RateLimited,

    /// An `LLMBackend`/`MemoryStore`/`FocusManager` collaborator returned an error.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A remote node rejected or could not be reached for a submission.
    #[error("remote submit failed: {0}")]
    RemoteSubmitFailed(String),

    /// `StreamResult`'s wall-clock timeout elapsed before the stream closed.
    #[error("stream timeout")]
    StreamTimeout,

    /// A handler raised after exhausting its retry budget.
    #[error("handler panicked: {0}")]
    HandlerPanicked(String),

    /// No handler is registered under the requested name.
    #[error("unknown task name: {0}")]
    UnknownTaskName(String),

    /// A backend-specific failure with free-form context (retained from the
    /// original pool-only error type for audit/log call sites).
    #[error("backend error: {0}")]
    Backend(String),
}

/// Application-facing result using anyhow for call sites that aggregate
/// errors across subsystems (configuration loading, CLI entry points, …).
pub type AppResult<T> = Result<T, anyhow::Error>;
