//! `ProactiveScheduler`: a periodic, self-resubmitting pool task that
//! checks focus/resource state while idle and proposes (or auto-submits)
//! a next action.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Timelike};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::core::error::SchedulerError;
use crate::core::registry::TaskRegistry;
use crate::core::task::{BoxFuture, RetryPolicy, TaskOutcome, TaskResult};
use crate::core::worker_pool::PriorityWorkerPool;
use crate::external::focus::FocusManager;
use crate::util::ids::Priority;

/// Tunables for [`ProactiveScheduler`].
#[derive(Debug, Clone)]
pub struct ProactiveConfig {
    /// Delay between the end of one tick and the start of the next.
    pub interval: Duration,
    /// Minimum score (in `[0, 1]`) at which a proposed action is acted on.
    pub threshold: f64,
    /// If `true`, an accepted action is submitted as `toolchain.execute`
    /// directly; otherwise it is appended to the pending-approvals list.
    pub auto_submit: bool,
    /// Local hour (0..24, inclusive start) the scheduler is allowed to run.
    pub start_hour: u32,
    /// Local hour (0..24, exclusive end) the scheduler is allowed to run.
    pub end_hour: u32,
}

impl Default for ProactiveConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(900),
            threshold: 0.6,
            auto_submit: false,
            start_hour: 8,
            end_hour: 22,
        }
    }
}

impl ProactiveConfig {
    fn in_window(&self, hour: u32) -> bool {
        if self.start_hour == self.end_hour {
            return true;
        }
        if self.start_hour < self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }

    fn seconds_until_window(&self, hour: u32, minute: u32, second: u32) -> u64 {
        let elapsed_in_hour = u64::from(minute) * 60 + u64::from(second);
        let hours_until = if hour < self.start_hour {
            self.start_hour - hour
        } else {
            24 - hour + self.start_hour
        };
        hours_until.saturating_mul(3600).saturating_sub(elapsed_in_hour)
    }
}

async fn drain_text(result: TaskResult) -> String {
    match result {
        TaskResult::Value(v) => v.as_str().map(ToOwned::to_owned).unwrap_or_else(|| v.to_string()),
        TaskResult::Empty => String::new(),
        TaskResult::Tokens(rx) => {
            let mut text = String::new();
            while let Ok(token) = rx.recv_async().await {
                if token.is_final {
                    break;
                }
                text.push_str(&token.text);
            }
            text
        }
    }
}

/// Periodic background task: collects context, proposes a next action via
/// `llm.fast`, scores it, and either auto-submits or queues it for approval.
pub struct ProactiveScheduler {
    pool: Arc<PriorityWorkerPool>,
    registry: Arc<TaskRegistry>,
    focus: Option<Arc<dyn FocusManager>>,
    config: ProactiveConfig,
    pending_approvals: Mutex<Vec<String>>,
}

impl ProactiveScheduler {
    /// Build a scheduler. Call [`ProactiveScheduler::start`] to submit its
    /// first tick.
    #[must_use]
    pub fn new(
        pool: Arc<PriorityWorkerPool>,
        registry: Arc<TaskRegistry>,
        focus: Option<Arc<dyn FocusManager>>,
        config: ProactiveConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            pool,
            registry,
            focus,
            config,
            pending_approvals: Mutex::new(Vec::new()),
        })
    }

    /// Actions proposed above threshold when `auto_submit` is `false`,
    /// oldest first.
    #[must_use]
    pub fn pending_approvals(&self) -> Vec<String> {
        self.pending_approvals.lock().clone()
    }

    /// Submit the first tick, at `label = "llm"`, `priority = LOW`.
    ///
    /// # Errors
    /// Propagates [`SchedulerError::PoolStopped`] if the pool was never
    /// started, or `InvalidArgument` from a malformed submission.
    pub fn start(self: &Arc<Self>) -> Result<(), SchedulerError> {
        self.schedule_next(Duration::ZERO)
    }

    fn schedule_next(self: &Arc<Self>, delay: Duration) -> Result<(), SchedulerError> {
        let scheduler = Arc::clone(self);
        let func = Arc::new(move || {
            let scheduler = Arc::clone(&scheduler);
            let fut: BoxFuture<'static, TaskOutcome> = Box::pin(async move { scheduler.tick().await });
            fut
        });
        self.pool
            .submit(
                func,
                Priority::Low,
                delay,
                [String::from("llm")].into_iter().collect(),
                None,
                RetryPolicy::default(),
                "proactive.tick",
                HashMap::new(),
            )
            .map(|_| ())
    }

    async fn tick(self: &Arc<Self>) -> TaskOutcome {
        let now = Local::now();
        let hour = now.hour();
        if !self.config.in_window(hour) {
            let delay = Duration::from_secs(self.config.seconds_until_window(hour, now.minute(), now.second()));
            self.schedule_next(delay)?;
            return Ok(TaskResult::Empty);
        }

        let focus_text = match &self.focus {
            Some(focus) => focus.current_focus().await,
            None => None,
        };
        let stats = self.pool.stats();
        let context_summary = json!({
            "focus": focus_text,
            "active_tasks": stats.active_tasks,
            "queued_tasks": stats.queued_tasks,
        });

        let propose_prompt = format!(
            "Given this context, propose exactly one concrete next action: {context_summary}"
        );
        let action = match self.call_fast(&propose_prompt).await {
            Ok(text) => text,
            Err(err) => {
                warn!(%err, "proactive action proposal failed");
                self.schedule_next(self.config.interval)?;
                return Ok(TaskResult::Empty);
            }
        };

        let score_prompt = format!("Score this proposed action from 0 to 1, respond with only the number: {action}");
        let score = match self.call_fast(&score_prompt).await {
            Ok(text) => text.trim().parse::<f64>().unwrap_or(0.0),
            Err(_) => 0.0,
        };

        if score >= self.config.threshold {
            if self.config.auto_submit {
                self.submit_action(&action)?;
            } else {
                info!(%action, score, "proactive action queued for approval");
                self.pending_approvals.lock().push(action);
            }
        }

        self.schedule_next(self.config.interval)?;
        Ok(TaskResult::Empty)
    }

    async fn call_fast(&self, prompt: &str) -> Result<String, SchedulerError> {
        let result = self
            .registry
            .execute("llm.fast", json!({ "prompt": prompt }), HashMap::new())
            .await?;
        Ok(drain_text(result).await)
    }

    fn submit_action(&self, action: &str) -> Result<(), SchedulerError> {
        let payload: Value = json!({ "action": action });
        let registry = Arc::clone(&self.registry);
        let func = Arc::new(move || {
            let registry = Arc::clone(&registry);
            let payload = payload.clone();
            let fut: BoxFuture<'static, TaskOutcome> =
                Box::pin(async move { registry.execute("toolchain.execute", payload, HashMap::new()).await });
            fut
        });
        self.pool
            .submit(
                func,
                Priority::Normal,
                Duration::ZERO,
                [String::from("toolchain")].into_iter().collect(),
                None,
                RetryPolicy::default(),
                "toolchain.execute",
                HashMap::new(),
            )
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_wraps_past_midnight() {
        let cfg = ProactiveConfig {
            start_hour: 22,
            end_hour: 6,
            ..ProactiveConfig::default()
        };
        assert!(cfg.in_window(23));
        assert!(cfg.in_window(2));
        assert!(!cfg.in_window(12));
    }

    #[test]
    fn same_start_and_end_means_always_on() {
        let cfg = ProactiveConfig {
            start_hour: 9,
            end_hour: 9,
            ..ProactiveConfig::default()
        };
        assert!(cfg.in_window(0));
        assert!(cfg.in_window(23));
    }
}
