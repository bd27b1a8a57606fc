//! Integration tests for the streaming query router: classification
//! ordering, markers, and the action-route interruption rule, exercised
//! end to end through `Router::run`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use task_cortex::cluster::ClusterDispatcher;
use task_cortex::core::registry::{FnHandler, TaskRegistry};
use task_cortex::core::resource_probe::MockProbe;
use task_cortex::core::task::TaskResult;
use task_cortex::core::worker_pool::{PriorityWorkerPool, WorkerPoolConfig};
use task_cortex::external::llm::EchoLLMBackend;
use task_cortex::router::handlers::register_default_handlers;
use task_cortex::router::{Router, RouterConfig};

fn build_router() -> Router {
    let registry = Arc::new(TaskRegistry::new());
    register_default_handlers(&registry, Arc::new(EchoLLMBackend::default()));
    registry.register(
        "toolchain.execute",
        Arc::new(FnHandler::new(|_payload, _ctx| {
            Box::pin(async move { Ok(TaskResult::Value(serde_json::json!("toolchain ran"))) })
        })),
    );

    let mut pool = PriorityWorkerPool::new(WorkerPoolConfig::default(), Arc::new(MockProbe::new(0.0, 0)));
    let results = Arc::new(Mutex::new(HashMap::new()));
    pool = pool.with_end_callback(ClusterDispatcher::result_sink(Arc::clone(&results)));
    let pool = Arc::new(pool);
    pool.start();

    let dispatcher = Arc::new(ClusterDispatcher::new(pool, registry, results));
    Router::new(dispatcher, None, None, RouterConfig::default())
}

async fn collect(rx: flume::Receiver<String>) -> String {
    let mut out = String::new();
    while let Ok(chunk) = rx.recv_async().await {
        out.push_str(&chunk);
    }
    out
}

#[tokio::test]
async fn simple_query_produces_non_empty_output() {
    let router = build_router();
    let output = collect(router.run("session-1", "simple question")).await;
    assert!(!output.is_empty());
}

#[tokio::test]
async fn toolchain_route_emits_executing_marker_before_action_output() {
    let router = build_router();
    let output = collect(router.run("session-2", "toolchain run the build")).await;
    assert!(output.contains("--- Executing ---"));
    let marker_pos = output.find("--- Executing ---").unwrap();
    let action_pos = output.find("toolchain ran").expect("action output present");
    assert!(action_pos > marker_pos);
}

#[tokio::test]
async fn intermediate_classification_reaches_conclusion_marker() {
    let router = build_router();
    let output = collect(router.run("session-3", "intermediate please help")).await;
    assert!(output.contains("--- Conclusion ---"));
}
