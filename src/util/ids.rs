//! Shared identifier and priority types used across the pool, dispatcher, and router.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Opaque task identifier, unique within one [`crate::core::worker_pool::PriorityWorkerPool`]
/// instance.
///
/// Callers must treat this as opaque: it happens to wrap a counter, but no
/// code outside this crate should rely on its numeric value or ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Monotonic generator for [`TaskId`]s, one per pool instance.
#[derive(Debug, Default)]
pub struct TaskIdGenerator {
    next: AtomicU64,
}

impl TaskIdGenerator {
    /// Allocate the next task id.
    pub fn next(&self) -> TaskId {
        TaskId::from_raw(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Task scheduling priority. `CRITICAL` is serviced before `HIGH`, which is
/// serviced before `NORMAL`, and so on — spec.md's "lower ordinal = higher
/// priority" ordering. `Ord` is derived so that comparing two `Priority`
/// values answers "which one the queue should prefer" directly when the
/// queue's comparator flips it for a max-heap (see `core::worker_pool`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Must run before anything else; reserved for user-interactive work.
    Critical,
    /// Above-normal priority.
    High,
    /// Default priority for most submissions.
    Normal,
    /// Below-normal priority; tolerant of delay.
    Low,
    /// Runs only when nothing else is contending for workers.
    Background,
}

impl Priority {
    /// Rank used for ordering: higher rank services first. `Critical` has
    /// the highest rank so a max-heap pops it first.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Critical => 4,
            Self::High => 3,
            Self::Normal => 2,
            Self::Low => 1,
            Self::Background => 0,
        }
    }

    /// Spec ordinal (`CRITICAL` = 0 .. `BACKGROUND` = 4), used on the wire
    /// protocol where "lower ordinal = higher priority" is the contract.
    /// This is the inverse of [`rank`](Self::rank), which instead orders by
    /// "higher services first" for the max-heap comparator.
    #[must_use]
    pub const fn ordinal(self) -> u8 {
        4 - self.rank()
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}
