//! The wire protocol `ClusterDispatcher` speaks to a [`RemoteNode`](super::node::RemoteNode).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::core::error::SchedulerError;
use crate::external::llm::Token;

/// Body of a `POST {base_url}/submit` request.
#[derive(Debug, Serialize)]
pub struct SubmitRequest {
    /// Registry name to invoke on the remote node.
    pub name: String,
    /// Task payload.
    pub payload: Value,
    /// Opaque observability context.
    pub context: Value,
    /// Priority, encoded 0 (`Critical`) through 4 (`Background`).
    pub priority: u8,
    /// Capability labels.
    pub labels: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    task_id: String,
}

/// POST a submission to a remote node. Returns the remote-assigned task id.
///
/// # Errors
/// Returns [`SchedulerError::RemoteSubmitFailed`] on any transport error or
/// non-2xx response.
pub async fn submit_remote(
    client: &reqwest::Client,
    base_url: &str,
    auth_token: Option<&str>,
    request: &SubmitRequest,
) -> Result<String, SchedulerError> {
    let mut builder = client.post(format!("{base_url}/submit")).json(request);
    if let Some(token) = auth_token {
        builder = builder.bearer_auth(token);
    }
    let response = builder
        .send()
        .await
        .map_err(|e| SchedulerError::RemoteSubmitFailed(e.to_string()))?;
    if !response.status().is_success() {
        return Err(SchedulerError::RemoteSubmitFailed(format!(
            "node returned status {}",
            response.status()
        )));
    }
    let body: SubmitResponse = response
        .json()
        .await
        .map_err(|e| SchedulerError::RemoteSubmitFailed(e.to_string()))?;
    Ok(body.task_id)
}

/// GET a node's NDJSON token stream for `remote_task_id`, forwarding each
/// line as a [`Token`] over the returned channel. The channel is closed
/// when the HTTP body ends or a line fails to parse.
pub fn stream_remote(
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
    remote_task_id: String,
) -> flume::Receiver<Token> {
    let (tx, rx) = flume::unbounded();
    tokio::spawn(async move {
        let mut builder = client.get(format!("{base_url}/stream?task_id={remote_task_id}"));
        if let Some(token) = &auth_token {
            builder = builder.bearer_auth(token);
        }
        let response = match builder.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "remote stream request failed");
                return;
            }
        };

        let mut byte_stream = response.bytes_stream();
        let mut buf = String::new();
        use futures::StreamExt;
        while let Some(chunk) = byte_stream.next().await {
            let Ok(chunk) = chunk else { break };
            buf.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(pos) = buf.find('\n') {
                let line = buf[..pos].to_owned();
                buf.drain(..=pos);
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Token>(&line) {
                    Ok(token) => {
                        if tx.send_async(token).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "malformed NDJSON token line from remote node");
                        return;
                    }
                }
            }
        }
    });
    rx
}

/// Shared wall-clock budget for a single `recv` on a token stream, per
/// `StreamResult(task_id, timeout)`'s contract: elapsing it closes the
/// stream with [`SchedulerError::StreamTimeout`] without cancelling the
/// underlying task.
pub async fn recv_with_timeout(
    rx: &flume::Receiver<Token>,
    timeout: Duration,
) -> Result<Option<Token>, SchedulerError> {
    match tokio::time::timeout(timeout, rx.recv_async()).await {
        Ok(Ok(token)) => Ok(Some(token)),
        Ok(Err(_)) => Ok(None),
        Err(_) => Err(SchedulerError::StreamTimeout),
    }
}
