//! C4 (registry half) — the name-to-handler map consulted by
//! `ClusterDispatcher` and, directly, by the router's producers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::core::error::SchedulerError;
use crate::core::task::{BoxFuture, TaskOutcome};

/// A registered unit of work, addressed by name (`"llm.fast"`,
/// `"toolchain.execute"`, …). Handlers are stored as trait objects, so
/// unlike the pool's `TaskFn` there is no compile-time payload type — the
/// handler is responsible for interpreting its own `payload`.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Run the handler against `payload` and `context`, returning either a
    /// one-shot value or a streaming token channel.
    async fn execute(
        &self,
        payload: Value,
        context: HashMap<String, Value>,
    ) -> TaskOutcome;
}

/// Adapts a plain async closure into a [`TaskHandler`].
pub struct FnHandler<F>(F);

impl<F> FnHandler<F> {
    /// Wrap a closure as a handler.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> TaskHandler for FnHandler<F>
where
    F: Fn(Value, HashMap<String, Value>) -> BoxFuture<'static, TaskOutcome> + Send + Sync,
{
    async fn execute(&self, payload: Value, context: HashMap<String, Value>) -> TaskOutcome {
        (self.0)(payload, context).await
    }
}

/// Process-wide name → handler map. Registration is one-shot per name:
/// registering under an existing name replaces the prior handler.
#[derive(Default)]
pub struct TaskRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn TaskHandler>>>,
}

impl TaskRegistry {
    /// Build an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any prior registration.
    pub fn register(&self, name: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.write().insert(name.into(), handler);
    }

    /// Look up the handler registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.read().get(name).cloned()
    }

    /// Invoke the handler registered under `name`.
    ///
    /// # Errors
    /// Returns [`SchedulerError::UnknownTaskName`] if nothing is registered.
    pub async fn execute(
        &self,
        name: &str,
        payload: Value,
        context: HashMap<String, Value>,
    ) -> TaskOutcome {
        let handler = self
            .get(name)
            .ok_or_else(|| SchedulerError::UnknownTaskName(name.to_owned()))?;
        handler.execute(payload, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::TaskResult;

    #[tokio::test]
    async fn registration_replaces_prior_handler() {
        let registry = TaskRegistry::new();
        registry.register(
            "echo",
            Arc::new(FnHandler::new(|payload, _ctx| {
                Box::pin(async move { Ok(TaskResult::Value(payload)) })
            })),
        );
        registry.register(
            "echo",
            Arc::new(FnHandler::new(|_payload, _ctx| {
                Box::pin(async move { Ok(TaskResult::Value(serde_json::json!("replaced"))) })
            })),
        );

        let result = registry
            .execute("echo", serde_json::json!("original"), HashMap::new())
            .await
            .unwrap();
        match result {
            TaskResult::Value(v) => assert_eq!(v, serde_json::json!("replaced")),
            _ => panic!("expected a value result"),
        }
    }

    #[tokio::test]
    async fn unknown_name_is_an_error() {
        let registry = TaskRegistry::new();
        let result = registry.execute("missing", Value::Null, HashMap::new()).await;
        assert!(matches!(result, Err(SchedulerError::UnknownTaskName(_))));
    }
}
