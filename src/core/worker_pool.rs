//! C3 — the priority worker pool: dedicated OS-thread workers consuming a
//! priority queue, enforcing delays, deadlines, rate limits, label
//! concurrency caps, and CPU/process resource guards, with retry-with-
//! backoff on handler failure.

mod native;

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Worker-count and resource-guard configuration for a [`PriorityWorkerPool`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Number of dedicated OS-thread workers.
    pub worker_count: usize,
    /// CPU utilization percentage, at or above which the pool is "hot".
    pub cpu_threshold: f32,
    /// Process-name substring counted by the process-count guard. Empty
    /// disables the process-count guard.
    pub max_process_name: String,
    /// Process-count threshold for `max_process_name`; at or above this
    /// many matching processes, the pool is "hot".
    pub max_processes: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            cpu_threshold: 90.0,
            max_process_name: String::new(),
            max_processes: 0,
        }
    }
}

impl WorkerPoolConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns a description string if `worker_count` is zero.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        Ok(())
    }
}

/// Point-in-time pool statistics.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Tasks currently executing.
    pub active_tasks: u64,
    /// Tasks waiting in the queue.
    pub queued_tasks: u64,
    /// Tasks submitted over the pool's lifetime.
    pub submitted_tasks: u64,
    /// Tasks that completed successfully.
    pub completed_tasks: u64,
    /// Tasks that ended in a reported failure.
    pub failed_tasks: u64,
    /// Tasks abandoned due to an expired deadline.
    pub deadline_exceeded_tasks: u64,
}

#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub active_tasks: AtomicU64,
    pub submitted_tasks: AtomicU64,
    pub completed_tasks: AtomicU64,
    pub failed_tasks: AtomicU64,
    pub deadline_exceeded_tasks: AtomicU64,
}

impl PoolCounters {
    pub fn snapshot(&self, worker_count: usize, queued_tasks: u64) -> PoolStats {
        PoolStats {
            worker_count,
            active_tasks: self.active_tasks.load(Ordering::Relaxed),
            queued_tasks,
            submitted_tasks: self.submitted_tasks.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
            deadline_exceeded_tasks: self.deadline_exceeded_tasks.load(Ordering::Relaxed),
        }
    }
}

pub use native::{EndCallback, PriorityWorkerPool, StartCallback};
