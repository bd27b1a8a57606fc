//! C4 (dispatch half) — `ClusterDispatcher`: routes submissions to the
//! local pool or to a remote node, and exposes streaming retrieval.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, info};

use crate::core::error::SchedulerError;
use crate::core::registry::TaskRegistry;
use crate::core::task::{RetryPolicy, TaskMeta, TaskOutcome, TaskResult};
use crate::core::worker_pool::{EndCallback, PriorityWorkerPool};
use crate::external::llm::Token;
use crate::util::ids::{Priority, TaskId};

use super::node::RemoteNode;
use super::transport::{recv_with_timeout, stream_remote, submit_remote, SubmitRequest};

/// Where a `submit_task` call landed. Local tasks are tracked by `TaskId`
/// and their result observed through the pool's end-callback; remote tasks
/// are tracked by the remote node's own task id.
#[derive(Debug, Clone)]
pub enum DispatchHandle {
    /// Dispatched to the local pool.
    Local(TaskId),
    /// Dispatched to a remote node.
    Remote {
        /// The node's base URL, needed to address the streaming endpoint.
        base_url: String,
        /// Bearer token for the node, if configured.
        auth_token: Option<String>,
        /// The task id the remote node assigned.
        remote_task_id: String,
    },
}

/// A token stream retrieved via [`ClusterDispatcher::stream_result`].
pub struct TokenStream {
    rx: flume::Receiver<Token>,
}

impl TokenStream {
    /// Receive the next token, subject to `timeout` since this call began.
    ///
    /// # Errors
    /// Returns [`SchedulerError::StreamTimeout`] if no token (and no
    /// channel close) arrives within `timeout`.
    pub async fn recv(&self, timeout: Duration) -> Result<Option<Token>, SchedulerError> {
        recv_with_timeout(&self.rx, timeout).await
    }

    /// Unwrap into the raw token channel, for callers (counsel-mode
    /// aggregation) that need to hand several streams to `select_all`/drain
    /// loops directly rather than through [`TokenStream::recv`]'s timeout.
    #[must_use]
    pub fn into_receiver(self) -> flume::Receiver<Token> {
        self.rx
    }
}

/// Name→handler registry plus routing across the local pool and remote nodes.
pub struct ClusterDispatcher {
    nodes: RwLock<Vec<Arc<RemoteNode>>>,
    registry: Arc<TaskRegistry>,
    pool: Arc<PriorityWorkerPool>,
    results: Arc<Mutex<HashMap<TaskId, TaskOutcome>>>,
    http: reqwest::Client,
}

impl ClusterDispatcher {
    /// Build a dispatcher over an already-constructed pool and registry.
    ///
    /// `results` must be the same map installed into the pool via
    /// [`ClusterDispatcher::result_sink`] before the pool was wrapped in an
    /// `Arc` (the pool's end-callback can only be set at construction time).
    #[must_use]
    pub fn new(
        pool: Arc<PriorityWorkerPool>,
        registry: Arc<TaskRegistry>,
        results: Arc<Mutex<HashMap<TaskId, TaskOutcome>>>,
    ) -> Self {
        Self {
            nodes: RwLock::new(Vec::new()),
            registry,
            pool,
            results,
            http: reqwest::Client::new(),
        }
    }

    /// Build the pool end-callback that feeds `results`, so later
    /// `stream_result`/local task-result lookups can find it.
    #[must_use]
    pub fn result_sink(results: Arc<Mutex<HashMap<TaskId, TaskOutcome>>>) -> EndCallback {
        Arc::new(move |meta: &TaskMeta, outcome: Result<&TaskResult, &SchedulerError>| {
            let stored = outcome.map(Clone::clone).map_err(Clone::clone);
            results.lock().insert(meta.task_id, stored);
        })
    }

    /// Register a remote node as a routing candidate.
    pub fn add_node(&self, node: RemoteNode) {
        info!(node = %node.name, "remote node registered");
        self.nodes.write().push(Arc::new(node));
    }

    /// Route a submission to the local pool or a remote node.
    ///
    /// Routing rule: `router_hint == Some("local")` always runs locally.
    /// Otherwise the least-loaded node (by ascending in-flight count, then
    /// descending weight, then descending recency of last success) whose
    /// labels intersect the task's labels is chosen; if none qualifies, the
    /// task runs locally.
    ///
    /// # Errors
    /// Propagates [`SchedulerError::PoolStopped`]/`InvalidArgument` from the
    /// local pool, or [`SchedulerError::RemoteSubmitFailed`] from a remote node.
    #[allow(clippy::too_many_arguments)]
    pub async fn submit_task(
        &self,
        name: impl Into<String>,
        payload: Value,
        priority: Priority,
        labels: HashSet<String>,
        delay: Duration,
        context: HashMap<String, Value>,
        router_hint: Option<&str>,
    ) -> Result<DispatchHandle, SchedulerError> {
        let name = name.into();
        if router_hint != Some("local") {
            if let Some(node) = self.pick_node(&labels) {
                return self
                    .dispatch_remote(node, name, payload, priority, labels, context)
                    .await;
            }
        }
        self.dispatch_local(name, payload, priority, delay, labels, context)
    }

    fn pick_node(&self, labels: &HashSet<String>) -> Option<Arc<RemoteNode>> {
        self.nodes
            .read()
            .iter()
            .filter(|n| !n.labels.is_disjoint(labels))
            .min_by_key(|n| n.load_key())
            .cloned()
    }

    fn dispatch_local(
        &self,
        name: String,
        payload: Value,
        priority: Priority,
        delay: Duration,
        labels: HashSet<String>,
        context: HashMap<String, Value>,
    ) -> Result<DispatchHandle, SchedulerError> {
        let registry = Arc::clone(&self.registry);
        let ctx_for_task = context.clone();
        let task_name = name.clone();
        let func = Arc::new(move || {
            let registry = Arc::clone(&registry);
            let name = task_name.clone();
            let payload = payload.clone();
            let ctx = ctx_for_task.clone();
            let fut: crate::core::task::BoxFuture<'static, TaskOutcome> =
                Box::pin(async move { registry.execute(&name, payload, ctx).await });
            fut
        });
        let task_id = self.pool.submit(
            func,
            priority,
            delay,
            labels,
            None,
            RetryPolicy::default(),
            name,
            context,
        )?;
        Ok(DispatchHandle::Local(task_id))
    }

    async fn dispatch_remote(
        &self,
        node: Arc<RemoteNode>,
        name: String,
        payload: Value,
        priority: Priority,
        labels: HashSet<String>,
        context: HashMap<String, Value>,
    ) -> Result<DispatchHandle, SchedulerError> {
        let request = SubmitRequest {
            name,
            payload,
            context: Value::Object(context.into_iter().collect()),
            priority: priority.ordinal(),
            labels: labels.into_iter().collect(),
        };
        node.begin_submission();
        let result = submit_remote(
            &self.http,
            &node.base_url,
            node.auth_token.as_deref(),
            &request,
        )
        .await;
        node.end_submission(result.is_ok());
        let remote_task_id = result?;
        debug!(node = %node.name, remote_task_id, "submitted to remote node");
        Ok(DispatchHandle::Remote {
            base_url: node.base_url.clone(),
            auth_token: node.auth_token.clone(),
            remote_task_id,
        })
    }

    /// Retrieve a streaming result for a prior submission.
    ///
    /// For a local handle, this waits (bounded by `timeout`) for the pool's
    /// end-callback to have recorded a result, then requires it to be a
    /// streaming ([`TaskResult::Tokens`]) result. For a remote handle, it
    /// opens the node's `/stream` endpoint directly.
    ///
    /// # Errors
    /// Returns [`SchedulerError::StreamTimeout`] if a local result never
    /// appears within `timeout`, or if the resolved result was not streaming.
    pub async fn stream_result(
        &self,
        handle: &DispatchHandle,
        timeout: Duration,
    ) -> Result<TokenStream, SchedulerError> {
        match handle {
            DispatchHandle::Remote {
                base_url,
                auth_token,
                remote_task_id,
            } => {
                let rx = stream_remote(
                    self.http.clone(),
                    base_url.clone(),
                    auth_token.clone(),
                    remote_task_id.clone(),
                );
                Ok(TokenStream { rx })
            }
            DispatchHandle::Local(task_id) => {
                let deadline = tokio::time::Instant::now() + timeout;
                loop {
                    if let Some(outcome) = self.results.lock().remove(task_id) {
                        return match outcome? {
                            TaskResult::Tokens(rx) => Ok(TokenStream { rx }),
                            other => {
                                let (tx, rx) = flume::unbounded();
                                if let TaskResult::Value(v) = other {
                                    let _ = tx.send(Token::chunk(v.to_string()));
                                }
                                let _ = tx.send(Token::end());
                                Ok(TokenStream { rx })
                            }
                        };
                    }
                    if tokio::time::Instant::now() >= deadline {
                        return Err(SchedulerError::StreamTimeout);
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}
