//! `PriorityWorkerPool`: dedicated OS-thread workers draining a priority
//! queue, each running a single-threaded Tokio runtime so task futures can
//! use async I/O without contending with the main runtime.
//!
//! # Design Principles
//!
//! - **Bounded-wait pop, not blocking `recv`**: the queue pop blocks at most
//!   250ms before re-checking the stop flag, so workers notice `Stop`
//!   promptly without a sentinel task.
//! - **RAII label release**: `LabelGuard` decrements `inflight_per_label` on
//!   drop, covering the panic-unwind path the same way a `finally` would.
//! - **Clean shutdown**: `stop` flips `stopping`, then joins workers with a
//!   bounded timeout per worker, detaching any that refuse to exit in time.

use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, RwLock};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::core::error::SchedulerError;
use crate::core::resource_probe::ResourceProbe;
use crate::core::task::{RetryPolicy, ScheduledTask, TaskFn, TaskMeta, TaskOutcome, TaskResult};
use crate::core::token_bucket::TokenBucket;
use crate::util::clock::now_ms;
use crate::util::ids::{Priority, TaskId, TaskIdGenerator};

use super::{PoolCounters, PoolStats, WorkerPoolConfig};

/// Pool-level hook fired just before a task's closure runs.
pub type StartCallback = Arc<dyn Fn(&TaskMeta) + Send + Sync>;
/// Pool-level hook fired once a task reaches a terminal outcome for this attempt.
pub type EndCallback = Arc<dyn Fn(&TaskMeta, Result<&TaskResult, &SchedulerError>) + Send + Sync>;

/// Heap entry wrapping a [`ScheduledTask`] with the ordering spec.md
/// mandates: strict priority, then earliest `scheduled_at`, then lowest
/// `sequence` — a max-heap pop yields the task that should run next, so the
/// natural (ascending) comparisons on `scheduled_at`/`sequence` are reversed.
struct QueuedTask(ScheduledTask);

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.0.priority == other.0.priority
            && self.0.scheduled_at == other.0.scheduled_at
            && self.0.sequence == other.0.sequence
    }
}
impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0
            .priority
            .rank()
            .cmp(&other.0.priority.rank())
            .then_with(|| other.0.scheduled_at.cmp(&self.0.scheduled_at))
            .then_with(|| other.0.sequence.cmp(&self.0.sequence))
    }
}

/// RAII guard releasing acquired label concurrency slots on drop, so a
/// panicking handler still frees its slots.
struct LabelGuard {
    inflight: Arc<Mutex<HashMap<String, u32>>>,
    labels: Vec<String>,
    released: bool,
}

impl LabelGuard {
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let mut inflight = self.inflight.lock();
        for label in &self.labels {
            if let Some(count) = inflight.get_mut(label) {
                *count = count.saturating_sub(1);
            }
        }
    }
}

impl Drop for LabelGuard {
    fn drop(&mut self) {
        self.release();
    }
}

struct Inner {
    queue: Mutex<BinaryHeap<QueuedTask>>,
    queue_cv: Condvar,
    rate_buckets: RwLock<HashMap<String, TokenBucket>>,
    max_inflight_per_label: RwLock<HashMap<String, u32>>,
    inflight_per_label: Arc<Mutex<HashMap<String, u32>>>,
    paused: AtomicBool,
    stopping: AtomicBool,
    sequence: AtomicU64,
    task_ids: TaskIdGenerator,
    cpu_threshold: RwLock<f32>,
    max_process_name: RwLock<String>,
    max_processes: RwLock<usize>,
    probe: Arc<dyn ResourceProbe>,
    worker_count: usize,
    workers: Mutex<Vec<JoinHandle<()>>>,
    on_start: Option<StartCallback>,
    on_end: Option<EndCallback>,
    counters: PoolCounters,
}

enum Admit {
    Granted(LabelGuard),
    Denied,
}

impl Inner {
    fn resources_hot(&self) -> bool {
        let cpu_threshold = *self.cpu_threshold.read();
        if self.probe.cpu_percent() >= cpu_threshold {
            return true;
        }
        let needle = self.max_process_name.read();
        let max_processes = *self.max_processes.read();
        if !needle.is_empty() && max_processes > 0 {
            return self.probe.process_count(&needle) >= max_processes;
        }
        false
    }

    /// Atomically charge the rate limiter for every label and acquire a
    /// concurrency slot for every label, or do neither. Returns `Denied`
    /// (with everything rolled back) if any label's bucket or cap refuses.
    fn try_admit(&self, labels: &HashSet<String>) -> Admit {
        let buckets = self.rate_buckets.read();
        let mut charged: Vec<&TokenBucket> = Vec::new();
        for label in labels {
            if let Some(bucket) = buckets.get(label) {
                if bucket.allow(1.0) {
                    charged.push(bucket);
                } else {
                    for b in charged {
                        b.refund(1.0);
                    }
                    return Admit::Denied;
                }
            }
        }
        drop(buckets);

        let caps = self.max_inflight_per_label.read();
        let mut inflight = self.inflight_per_label.lock();
        for label in labels {
            let cap = caps.get(label).copied().unwrap_or(u32::MAX);
            let current = inflight.get(label).copied().unwrap_or(0);
            if current >= cap {
                // Roll back the rate-limit charge too: an admission is all-or-nothing.
                let buckets = self.rate_buckets.read();
                for label in labels {
                    if let Some(bucket) = buckets.get(label) {
                        bucket.refund(1.0);
                    }
                }
                return Admit::Denied;
            }
        }
        for label in labels {
            *inflight.entry(label.clone()).or_insert(0) += 1;
        }
        drop(inflight);

        Admit::Granted(LabelGuard {
            inflight: Arc::clone(&self.inflight_per_label),
            labels: labels.iter().cloned().collect(),
            released: false,
        })
    }

    fn reenqueue(&self, task: ScheduledTask) {
        self.queue.lock().push(QueuedTask(task));
        self.queue_cv.notify_one();
    }

    fn pop_wait(&self, timeout: Duration) -> Option<ScheduledTask> {
        let mut queue = self.queue.lock();
        if queue.is_empty() {
            let result = self.queue_cv.wait_for(&mut queue, timeout);
            if result.timed_out() && queue.is_empty() {
                return None;
            }
        }
        queue.pop().map(|q| q.0)
    }
}

/// C3 — the priority worker pool. Created stopped; call [`start`](Self::start)
/// to spawn its workers.
pub struct PriorityWorkerPool {
    inner: Arc<Inner>,
}

impl PriorityWorkerPool {
    /// Build a pool with the given configuration and resource probe.
    ///
    /// # Panics
    /// Panics if `config` fails validation; validate separately if the
    /// configuration source is untrusted.
    #[must_use]
    pub fn new(config: WorkerPoolConfig, probe: Arc<dyn ResourceProbe>) -> Self {
        config.validate().expect("invalid worker pool configuration");
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(BinaryHeap::new()),
                queue_cv: Condvar::new(),
                rate_buckets: RwLock::new(HashMap::new()),
                max_inflight_per_label: RwLock::new(HashMap::new()),
                inflight_per_label: Arc::new(Mutex::new(HashMap::new())),
                paused: AtomicBool::new(false),
                stopping: AtomicBool::new(true),
                sequence: AtomicU64::new(0),
                task_ids: TaskIdGenerator::default(),
                cpu_threshold: RwLock::new(config.cpu_threshold),
                max_process_name: RwLock::new(config.max_process_name),
                max_processes: RwLock::new(config.max_processes),
                probe,
                worker_count: config.worker_count,
                workers: Mutex::new(Vec::new()),
                on_start: None,
                on_end: None,
                counters: PoolCounters::default(),
            }),
        }
    }

    /// Attach a start callback, fired just before a task's closure runs.
    #[must_use]
    pub fn with_start_callback(mut self, cb: StartCallback) -> Self {
        Arc::get_mut(&mut self.inner).map(|inner| inner.on_start = Some(cb));
        self
    }

    /// Attach an end callback, fired once a task reaches a terminal outcome.
    #[must_use]
    pub fn with_end_callback(mut self, cb: EndCallback) -> Self {
        Arc::get_mut(&mut self.inner).map(|inner| inner.on_end = Some(cb));
        self
    }

    /// Register (or replace) the rate-limit bucket for `label`.
    pub fn set_rate_limit(&self, label: impl Into<String>, fill_rate: f64, capacity: f64) {
        self.inner
            .rate_buckets
            .write()
            .insert(label.into(), TokenBucket::new(fill_rate, capacity));
    }

    /// Set the per-label concurrency cap. `n` must be at least 1.
    ///
    /// # Errors
    /// Returns [`SchedulerError::InvalidArgument`] if `n == 0`.
    pub fn set_concurrency_limit(&self, label: impl Into<String>, n: u32) -> Result<(), SchedulerError> {
        if n == 0 {
            return Err(SchedulerError::InvalidArgument(
                "concurrency limit must be >= 1".into(),
            ));
        }
        self.inner
            .max_inflight_per_label
            .write()
            .insert(label.into(), n);
        Ok(())
    }

    /// Submit a task for execution.
    ///
    /// # Errors
    /// Returns [`SchedulerError::PoolStopped`] if the pool has not been
    /// started (or has since been stopped), or [`SchedulerError::InvalidArgument`]
    /// if `retry` fails validation.
    #[allow(clippy::too_many_arguments)]
    pub fn submit(
        &self,
        func: TaskFn,
        priority: Priority,
        delay: Duration,
        labels: HashSet<String>,
        deadline: Option<Duration>,
        retry: RetryPolicy,
        name: impl Into<String>,
        context: HashMap<String, serde_json::Value>,
    ) -> Result<TaskId, SchedulerError> {
        if self.inner.stopping.load(Ordering::Acquire) {
            return Err(SchedulerError::PoolStopped);
        }
        retry.validate()?;

        let now = now_ms();
        let task_id = self.inner.task_ids.next();
        let sequence = self.inner.sequence.fetch_add(1, Ordering::Relaxed);
        let task = ScheduledTask {
            task_id,
            priority,
            #[allow(clippy::cast_possible_truncation)]
            scheduled_at: now + delay.as_millis(),
            sequence,
            func,
            name: name.into(),
            labels,
            deadline: deadline.map(|d| now + d.as_millis()),
            retry,
            retries: 0,
            context,
        };
        self.inner.counters.submitted_tasks.fetch_add(1, Ordering::Relaxed);
        self.inner.reenqueue(task);
        Ok(task_id)
    }

    /// Idempotently pause the pool: running tasks finish, no new task
    /// transitions from queued to running until [`resume`](Self::resume).
    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::Release);
    }

    /// Idempotently resume the pool.
    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::Release);
        self.inner.queue_cv.notify_all();
    }

    /// Spawn `worker_count` dedicated worker threads. Idempotent: calling
    /// `start` on an already-started pool is a no-op.
    pub fn start(&self) {
        if !self.inner.stopping.swap(false, Ordering::AcqRel) {
            return;
        }
        let mut workers = self.inner.workers.lock();
        for idx in 0..self.inner.worker_count {
            let inner = Arc::clone(&self.inner);
            workers.push(thread::spawn(move || worker_loop(idx, &inner)));
        }
        info!(worker_count = self.inner.worker_count, "pool started");
    }

    /// Stop the pool. If `drain` is true, workers keep popping until the
    /// queue is empty before exiting; otherwise they exit after their
    /// current task. If `wait` is true, blocks (up to a bounded timeout per
    /// worker) until all workers have exited.
    pub fn stop(&self, wait: bool, drain: bool) {
        if self.inner.stopping.swap(true, Ordering::AcqRel) {
            return;
        }
        if drain {
            loop {
                if self.inner.queue.lock().is_empty() {
                    break;
                }
                thread::sleep(Duration::from_millis(20));
            }
        }
        self.inner.queue_cv.notify_all();
        if !wait {
            return;
        }
        let mut workers = self.inner.workers.lock();
        for (idx, worker) in workers.drain(..).enumerate() {
            let (tx, rx) = std::sync::mpsc::channel();
            thread::spawn(move || {
                let joined = worker.join();
                let _ = tx.send(joined.is_ok());
            });
            match rx.recv_timeout(Duration::from_secs(2)) {
                Ok(true) => debug!(worker_id = idx, "worker joined"),
                Ok(false) => warn!(worker_id = idx, "worker thread panicked"),
                Err(_) => warn!(worker_id = idx, "worker did not exit within timeout, detaching"),
            }
        }
        info!("pool stopped");
    }

    /// A point-in-time statistics snapshot.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let queued = self.inner.queue.lock().len() as u64;
        self.inner.counters.snapshot(self.inner.worker_count, queued)
    }
}

fn backoff_delay(retry: &RetryPolicy, retries: u32) -> Duration {
    let base = retry.base_delay(retries);
    let jitter_frac = rand::rng().random_range(-retry.jitter..=retry.jitter);
    Duration::from_secs_f64((base.as_secs_f64() * (1.0 + jitter_frac)).max(0.0))
}

fn worker_loop(worker_id: usize, inner: &Arc<Inner>) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build worker runtime");

    loop {
        let Some(mut task) = inner.pop_wait(Duration::from_millis(250)) else {
            if inner.stopping.load(Ordering::Acquire) && inner.queue.lock().is_empty() {
                break;
            }
            continue;
        };

        let now = now_ms();
        if task.scheduled_at > now {
            let wait = Duration::from_millis(u64::try_from((task.scheduled_at - now).min(100)).unwrap_or(100));
            inner.reenqueue(task);
            thread::sleep(wait);
            continue;
        }

        if inner.paused.load(Ordering::Acquire) || inner.resources_hot() {
            task.scheduled_at = now_ms() + 200;
            inner.reenqueue(task);
            continue;
        }

        let guard = match inner.try_admit(&task.labels) {
            Admit::Granted(guard) => guard,
            Admit::Denied => {
                task.scheduled_at = now_ms() + 200;
                inner.reenqueue(task);
                continue;
            }
        };

        if let Some(deadline) = task.deadline {
            if now_ms() > deadline {
                drop(guard);
                inner.counters.deadline_exceeded_tasks.fetch_add(1, Ordering::Relaxed);
                let meta = TaskMeta::from(&task);
                if let Some(on_end) = &inner.on_end {
                    on_end(&meta, Err(&SchedulerError::DeadlineExceeded));
                }
                continue;
            }
        }

        let meta = TaskMeta::from(&task);
        if let Some(on_start) = &inner.on_start {
            on_start(&meta);
        }
        inner.counters.active_tasks.fetch_add(1, Ordering::Relaxed);
        debug!(worker_id, task_id = %task.task_id, name = %task.name, "running task");

        let fut = (task.func)();
        let outcome: TaskOutcome = runtime.block_on(fut);

        inner.counters.active_tasks.fetch_sub(1, Ordering::Relaxed);
        drop(guard);

        match outcome {
            Ok(result) => {
                inner.counters.completed_tasks.fetch_add(1, Ordering::Relaxed);
                if let Some(on_end) = &inner.on_end {
                    on_end(&meta, Ok(&result));
                }
            }
            Err(err) => {
                if task.retries < task.retry.max_retries {
                    let wait = backoff_delay(&task.retry, task.retries);
                    task.retries += 1;
                    task.scheduled_at = now_ms() + wait.as_millis();
                    debug!(task_id = %task.task_id, retries = task.retries, ?wait, "retrying after failure");
                    inner.reenqueue(task);
                } else {
                    inner.counters.failed_tasks.fetch_add(1, Ordering::Relaxed);
                    if let Some(on_end) = &inner.on_end {
                        on_end(&meta, Err(&err));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resource_probe::MockProbe;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex as StdMutex;

    fn pool(worker_count: usize) -> PriorityWorkerPool {
        let config = WorkerPoolConfig {
            worker_count,
            ..Default::default()
        };
        PriorityWorkerPool::new(config, Arc::new(MockProbe::new(0.0, 0)))
    }

    fn value_task(value: i64) -> TaskFn {
        Arc::new(move || {
            Box::pin(async move { Ok(TaskResult::Value(serde_json::json!(value))) })
        })
    }

    #[test]
    fn priority_ordering() {
        let pool = pool(1);
        let order: Arc<StdMutex<Vec<i64>>> = Arc::new(StdMutex::new(Vec::new()));
        let order_cb = Arc::clone(&order);
        let pool = pool.with_end_callback(Arc::new(move |meta, _| {
            order_cb
                .lock()
                .unwrap()
                .push(meta.context.get("n").and_then(serde_json::Value::as_i64).unwrap_or(-1));
        }));
        pool.start();

        for (n, priority) in [(1, Priority::Low), (2, Priority::Critical), (3, Priority::Normal)] {
            let mut ctx = HashMap::new();
            ctx.insert("n".to_string(), serde_json::json!(n));
            pool.submit(
                value_task(n),
                priority,
                Duration::ZERO,
                HashSet::new(),
                None,
                RetryPolicy::default(),
                "t",
                ctx,
            )
            .unwrap();
        }

        thread::sleep(Duration::from_millis(300));
        pool.stop(true, false);
        assert_eq!(*order.lock().unwrap(), vec![2, 3, 1]);
    }

    #[test]
    fn retry_then_succeed() {
        let pool = pool(1);
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_cb = Arc::clone(&attempts);
        let succeeded = Arc::new(AtomicBool::new(false));
        let succeeded_cb = Arc::clone(&succeeded);
        let pool = pool.with_end_callback(Arc::new(move |_, result| {
            if result.is_ok() {
                succeeded_cb.store(true, Ordering::SeqCst);
            }
        }));
        pool.start();

        let func: TaskFn = Arc::new(move || {
            let attempts = Arc::clone(&attempts_cb);
            Box::pin(async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(SchedulerError::Backend("transient".into()))
                } else {
                    Ok(TaskResult::Empty)
                }
            })
        });

        let mut retry = RetryPolicy::default();
        retry.max_retries = 3;
        retry.backoff_base = 1.0;
        retry.backoff_cap = Duration::from_millis(10);
        retry.jitter = 0.0;

        pool.submit(
            func,
            Priority::Normal,
            Duration::ZERO,
            HashSet::new(),
            None,
            retry,
            "flaky",
            HashMap::new(),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(500));
        pool.stop(true, false);
        assert!(succeeded.load(Ordering::SeqCst));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn submit_after_stop_is_rejected() {
        let pool = pool(1);
        pool.start();
        pool.stop(true, false);
        let result = pool.submit(
            value_task(1),
            Priority::Normal,
            Duration::ZERO,
            HashSet::new(),
            None,
            RetryPolicy::default(),
            "t",
            HashMap::new(),
        );
        assert!(matches!(result, Err(SchedulerError::PoolStopped)));
    }

    #[test]
    fn label_concurrency_cap_is_respected() {
        let pool = pool(4);
        pool.set_concurrency_limit("llm", 2).unwrap();
        let concurrent = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));
        pool.start();

        for _ in 0..5 {
            let concurrent = Arc::clone(&concurrent);
            let max_seen = Arc::clone(&max_seen);
            let func: TaskFn = Arc::new(move || {
                let concurrent = Arc::clone(&concurrent);
                let max_seen = Arc::clone(&max_seen);
                Box::pin(async move {
                    let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    concurrent.fetch_sub(1, Ordering::SeqCst);
                    Ok(TaskResult::Empty)
                })
            });
            let mut labels = HashSet::new();
            labels.insert("llm".to_string());
            pool.submit(
                func,
                Priority::Normal,
                Duration::ZERO,
                labels,
                None,
                RetryPolicy::default(),
                "llm-task",
                HashMap::new(),
            )
            .unwrap();
        }

        thread::sleep(Duration::from_millis(500));
        pool.stop(true, false);
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn deadline_is_respected() {
        let pool = pool(1);
        pool.pause();
        let fired = Arc::new(AtomicBool::new(false));
        let saw_deadline = Arc::new(AtomicBool::new(false));
        let fired_cb = Arc::clone(&fired);
        let saw_deadline_cb = Arc::clone(&saw_deadline);
        let pool = pool.with_end_callback(Arc::new(move |_, result| {
            fired_cb.store(true, Ordering::SeqCst);
            if matches!(result, Err(SchedulerError::DeadlineExceeded)) {
                saw_deadline_cb.store(true, Ordering::SeqCst);
            }
        }));
        pool.start();

        pool.submit(
            value_task(1),
            Priority::Normal,
            Duration::ZERO,
            HashSet::new(),
            Some(Duration::from_millis(1)),
            RetryPolicy::default(),
            "t",
            HashMap::new(),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(50));
        pool.resume();
        thread::sleep(Duration::from_millis(200));
        pool.stop(true, false);
        assert!(fired.load(Ordering::SeqCst));
        assert!(saw_deadline.load(Ordering::SeqCst));
    }
}
