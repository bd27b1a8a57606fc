//! Drives one query end to end: runs triage and the preamble concurrently,
//! interrupts the preamble the instant triage resolves to an action route,
//! and otherwise lets the preamble finish before continuing up the ramp to
//! a conclusion. Emits a single ordered stream of text chunks.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::warn;

use crate::cluster::ClusterDispatcher;
use crate::core::error::SchedulerError;
use crate::external::focus::FocusManager;
use crate::external::llm::ModelTier;
use crate::external::memory::MemoryStore;

use super::counsel;
use super::producers::{collect_tier_response, run_action, run_preamble, run_triage, tier_task_name};
use super::query::{is_action_aware, Classification, CounselMode, RouterConfig, CONCLUSION_MARKER, EXECUTING_MARKER};
use super::thought::ThoughtWriter;
use crate::util::ids::Priority;

/// Run a single query and return a receiver for its ordered text chunks.
/// The stream ends when the sender side is dropped (orchestration task
/// finished, possibly after pushing an `[error: ...]` chunk).
pub fn run_query(
    dispatcher: Arc<ClusterDispatcher>,
    config: RouterConfig,
    memory: Option<Arc<dyn MemoryStore>>,
    focus: Option<Arc<dyn FocusManager>>,
    session_id: String,
    query: String,
) -> flume::Receiver<String> {
    let (out_tx, out_rx) = flume::unbounded();
    tokio::spawn(async move {
        if let Err(err) = drive(
            &dispatcher,
            &config,
            memory.as_deref(),
            focus.as_deref(),
            &session_id,
            &query,
            &out_tx,
        )
        .await
        {
            warn!(%err, "query failed");
            let _ = out_tx.send(format!("\n\n[error: {err}]\n"));
        }
    });
    out_rx
}

#[allow(clippy::too_many_arguments)]
async fn drive(
    dispatcher: &Arc<ClusterDispatcher>,
    config: &RouterConfig,
    memory: Option<&dyn MemoryStore>,
    focus: Option<&dyn FocusManager>,
    session_id: &str,
    query: &str,
    out: &flume::Sender<String>,
) -> Result<(), SchedulerError> {
    if let Some(memory) = memory {
        memory.add_session_memory(session_id, query, "query", None).await?;
    }

    let stop_preamble = Arc::new(tokio::sync::Notify::new());
    let (preamble_tx, preamble_rx) = flume::unbounded::<String>();
    let action_prefix = is_action_aware(query)
        .then(|| "Acknowledging the request while it is carried out.".to_string());

    let preamble_handle = tokio::spawn({
        let dispatcher = Arc::clone(dispatcher);
        let config = config.clone();
        let query = query.to_string();
        let stop = Arc::clone(&stop_preamble);
        async move {
            run_preamble(&dispatcher, &config, &query, action_prefix.as_deref(), &stop, &preamble_tx).await
        }
    });

    let mut triage_fut = Box::pin(run_triage(dispatcher, config, query));
    let mut classification: Option<Classification> = None;
    loop {
        if classification.is_none() {
            tokio::select! {
                biased;
                triaged = &mut triage_fut => {
                    let c = triaged?;
                    classification = Some(c);
                    // Only action routes cut the preamble short; Focus and
                    // Proactive are side-effect-only but still let the
                    // preamble run to completion per the interruption rule.
                    if c.is_action_route() {
                        stop_preamble.notify_one();
                    }
                }
                chunk = preamble_rx.recv_async() => {
                    match chunk {
                        Ok(text) => { let _ = out.send(text); }
                        Err(_) => break,
                    }
                }
            }
        } else {
            match preamble_rx.recv_async().await {
                Ok(text) => {
                    let _ = out.send(text);
                }
                Err(_) => break,
            }
        }
    }
    let _ = preamble_handle.await;
    let classification = match classification {
        Some(c) => c,
        None => triage_fut.await?,
    };

    if let Some(memory) = memory {
        memory
            .add_session_memory(session_id, &format!("{classification:?}"), "triage", None)
            .await?;
    }

    let mut response_text = String::new();
    match classification {
        Classification::Focus => {
            if let Some(focus) = focus {
                focus.set_focus(query).await?;
            }
            let text = "\n\nFocus updated.\n";
            response_text.push_str(text);
            let _ = out.send(text.to_string());
        }
        Classification::Proactive => {
            if let Some(memory) = memory {
                memory
                    .add_session_memory(session_id, query, "proactive_note", None)
                    .await?;
            }
            let text = "\n\nNoted for later.\n";
            response_text.push_str(text);
            let _ = out.send(text.to_string());
        }
        c if c.is_action_route() => {
            response_text.push_str(EXECUTING_MARKER);
            let _ = out.send(EXECUTING_MARKER.to_string());
            let (tee_tx, tee_rx) = flume::unbounded();
            run_action(dispatcher, config, c, query, &tee_tx).await?;
            drop(tee_tx);
            response_text.push_str(&forward_and_capture(out, &tee_rx));
        }
        Classification::Counsel => {
            let (tee_tx, tee_rx) = flume::unbounded();
            run_counsel(dispatcher, config, query, &tee_tx).await?;
            drop(tee_tx);
            response_text.push_str(&forward_and_capture(out, &tee_rx));
        }
        c => {
            let (tee_tx, tee_rx) = flume::unbounded();
            run_ramp(dispatcher, config, c, query, &tee_tx).await?;
            drop(tee_tx);
            response_text.push_str(&forward_and_capture(out, &tee_rx));
        }
    }

    if let Some(memory) = memory {
        memory.add_session_memory(session_id, &response_text, "response", None).await?;
    }
    Ok(())
}

/// Drain every chunk a producer already pushed into `rx`, forwarding each to
/// `out` and returning the concatenated text, so `drive` can record the full
/// merged response in memory without changing every producer's signature.
fn forward_and_capture(out: &flume::Sender<String>, rx: &flume::Receiver<String>) -> String {
    let mut text = String::new();
    while let Ok(chunk) = rx.try_recv() {
        text.push_str(&chunk);
        let _ = out.send(chunk);
    }
    text
}

async fn run_ramp(
    dispatcher: &Arc<ClusterDispatcher>,
    config: &RouterConfig,
    classification: Classification,
    query: &str,
    out: &flume::Sender<String>,
) -> Result<(), SchedulerError> {
    let ramp = classification.ramp();
    if ramp.is_empty() {
        return Ok(());
    }
    let mut thoughts = ThoughtWriter::new();
    for &tier in ramp {
        let text = collect_tier_response(dispatcher, config, tier, query, Priority::Normal).await?;
        let mut chunk = String::new();
        if classification.polls_thoughts() && tier == ModelTier::Reasoning {
            thoughts.open(&text, &mut chunk);
            thoughts.close_if_open(&mut chunk);
        } else {
            chunk.push_str(&text);
        }
        let _ = out.send(chunk);
    }
    let _ = out.send(CONCLUSION_MARKER.to_string());
    let conclusion = collect_tier_response(dispatcher, config, ModelTier::Fast, query, Priority::Normal).await?;
    let _ = out.send(conclusion);
    Ok(())
}

/// Dispatch `query` to `config.counsel_fanout` intermediate-tier backends
/// concurrently and aggregate with `counsel::race` or `counsel::vote`,
/// per `config.counsel_mode` — spec.md §4.4.2's two required aggregators.
async fn run_counsel(
    dispatcher: &Arc<ClusterDispatcher>,
    config: &RouterConfig,
    query: &str,
    out: &flume::Sender<String>,
) -> Result<(), SchedulerError> {
    let name = tier_task_name(ModelTier::Intermediate);
    let payload = json!({ "prompt": query, "tier": "Intermediate" });
    let mut receivers = Vec::with_capacity(config.counsel_fanout.max(1));
    for _ in 0..config.counsel_fanout.max(1) {
        let handle = dispatcher
            .submit_task(
                name,
                payload.clone(),
                Priority::Normal,
                HashSet::from([name.to_string()]),
                Duration::ZERO,
                HashMap::new(),
                None,
            )
            .await?;
        let stream = dispatcher.stream_result(&handle, config.query_timeout).await?;
        receivers.push(stream.into_receiver());
    }

    match config.counsel_mode {
        CounselMode::Race => {
            let Some(winner) = counsel::race(receivers).await else {
                return Ok(());
            };
            while let Ok(token) = winner.recv_async().await {
                if token.is_final {
                    break;
                }
                let _ = out.send(token.text);
            }
        }
        CounselMode::Vote => {
            if let Some(answer) = counsel::vote(receivers, |a, b| a == b).await {
                let _ = out.send(answer);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_and_side_effect_routes_are_mutually_exclusive_of_ramp() {
        for c in [Classification::Focus, Classification::Proactive, Classification::Toolchain] {
            assert!(c.ramp().is_empty());
        }
    }
}
