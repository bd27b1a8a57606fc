//! Integration tests for `ClusterDispatcher`: local dispatch/streaming and
//! routing to a remote node over the documented wire protocol.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use task_cortex::cluster::{ClusterDispatcher, RemoteNode};
use task_cortex::core::registry::{FnHandler, TaskRegistry};
use task_cortex::core::resource_probe::MockProbe;
use task_cortex::core::task::TaskResult;
use task_cortex::core::worker_pool::{PriorityWorkerPool, WorkerPoolConfig};
use task_cortex::util::ids::Priority;

fn build_dispatcher() -> Arc<ClusterDispatcher> {
    let registry = Arc::new(TaskRegistry::new());
    registry.register(
        "echo",
        Arc::new(FnHandler::new(|payload, _ctx| {
            Box::pin(async move { Ok(TaskResult::Value(payload)) })
        })),
    );
    let mut pool = PriorityWorkerPool::new(WorkerPoolConfig::default(), Arc::new(MockProbe::new(0.0, 0)));
    let results = Arc::new(Mutex::new(HashMap::new()));
    pool = pool.with_end_callback(ClusterDispatcher::result_sink(Arc::clone(&results)));
    let pool = Arc::new(pool);
    pool.start();
    Arc::new(ClusterDispatcher::new(pool, registry, results))
}

#[tokio::test]
async fn local_submission_streams_back_the_handler_result() {
    let dispatcher = build_dispatcher();
    let handle = dispatcher
        .submit_task(
            "echo",
            json!({"hello": "world"}),
            Priority::Normal,
            HashSet::new(),
            Duration::ZERO,
            HashMap::new(),
            None,
        )
        .await
        .unwrap();

    let stream = dispatcher.stream_result(&handle, Duration::from_secs(2)).await.unwrap();
    let token = stream.recv(Duration::from_secs(1)).await.unwrap().unwrap();
    assert!(token.text.contains("world"));
}

#[tokio::test]
async fn routes_to_remote_node_when_labels_match() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/submit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "remote-1"})))
        .mount(&server)
        .await;

    let dispatcher = build_dispatcher();
    dispatcher.add_node(RemoteNode::new(
        "gpu-node",
        server.uri(),
        HashSet::from(["gpu".to_string()]),
        None,
        1,
    ));

    let handle = dispatcher
        .submit_task(
            "llm.deep",
            json!({"prompt": "hi"}),
            Priority::High,
            HashSet::from(["gpu".to_string()]),
            Duration::ZERO,
            HashMap::new(),
            None,
        )
        .await
        .unwrap();

    match handle {
        task_cortex::cluster::DispatchHandle::Remote { remote_task_id, .. } => {
            assert_eq!(remote_task_id, "remote-1");
        }
        task_cortex::cluster::DispatchHandle::Local(_) => panic!("expected remote dispatch"),
    }
}

#[tokio::test]
async fn router_hint_local_bypasses_matching_remote_node() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/submit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "remote-1"})))
        .mount(&server)
        .await;

    let dispatcher = build_dispatcher();
    dispatcher.add_node(RemoteNode::new(
        "gpu-node",
        server.uri(),
        HashSet::from(["echo".to_string()]),
        None,
        1,
    ));

    let handle = dispatcher
        .submit_task(
            "echo",
            json!("value"),
            Priority::Normal,
            HashSet::from(["echo".to_string()]),
            Duration::ZERO,
            HashMap::new(),
            Some("local"),
        )
        .await
        .unwrap();

    assert!(matches!(handle, task_cortex::cluster::DispatchHandle::Local(_)));
}
