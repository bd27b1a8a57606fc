//! Wires the reserved `llm.*` task names onto an [`LLMBackend`], the only
//! production-shaped handler this crate installs by default. Action-route
//! handlers (`toolchain.execute`, `bash_agent.execute`, …) are the
//! embedding application's responsibility and are left unregistered here —
//! same posture as `LLMBackend` itself: no production backend ships, only
//! the seam and a test double.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::error::SchedulerError;
use crate::core::registry::{TaskHandler, TaskRegistry};
use crate::core::task::{TaskOutcome, TaskResult};
use crate::external::llm::{LLMBackend, ModelTier, StreamParams};

use super::producers::tier_task_name;

struct LLMTierHandler {
    backend: Arc<dyn LLMBackend>,
    tier: ModelTier,
}

fn prompt_of(payload: &Value) -> String {
    payload
        .get("prompt")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| payload.to_string())
}

#[async_trait]
impl TaskHandler for LLMTierHandler {
    async fn execute(&self, payload: Value, _context: HashMap<String, Value>) -> TaskOutcome {
        let prompt = prompt_of(&payload);
        let params = StreamParams::for_tier(self.tier);
        let rx = self.backend.stream(&prompt, params).await?;
        Ok(TaskResult::Tokens(rx))
    }
}

/// Register every `llm.*` reserved task name against `backend`.
pub fn register_default_handlers(registry: &TaskRegistry, backend: Arc<dyn LLMBackend>) {
    for tier in [
        ModelTier::Fast,
        ModelTier::Intermediate,
        ModelTier::Deep,
        ModelTier::Reasoning,
        ModelTier::Tool,
        ModelTier::Triage,
    ] {
        registry.register(
            tier_task_name(tier),
            Arc::new(LLMTierHandler {
                backend: Arc::clone(&backend),
                tier,
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::llm::EchoLLMBackend;

    #[tokio::test]
    async fn registers_all_six_tiers() {
        let registry = TaskRegistry::new();
        register_default_handlers(&registry, Arc::new(EchoLLMBackend::default()));
        for tier in [
            ModelTier::Fast,
            ModelTier::Intermediate,
            ModelTier::Deep,
            ModelTier::Reasoning,
            ModelTier::Tool,
            ModelTier::Triage,
        ] {
            assert!(registry.get(tier_task_name(tier)).is_some());
        }
    }
}
