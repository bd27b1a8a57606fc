//! The three concurrent producers that feed a single query's response:
//! triage (classifies), preamble (starts answering immediately on a fast
//! model), and action (executes an action route once triage resolves to
//! one). Each submits through [`ClusterDispatcher`] and reads back a token
//! stream, exactly as any other C4 consumer would.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde_json::{json, Value};
use tracing::debug;

use crate::cluster::ClusterDispatcher;
use crate::core::error::SchedulerError;
use crate::external::llm::ModelTier;
use crate::util::ids::Priority;

use super::query::{Classification, RouterConfig};

/// Reserved task name a given model tier is dispatched under, per the
/// registry naming convention fixed in the external-interfaces section.
#[must_use]
pub fn tier_task_name(tier: ModelTier) -> &'static str {
    match tier {
        ModelTier::Fast => "llm.fast",
        ModelTier::Intermediate => "llm.intermediate",
        ModelTier::Deep => "llm.deep",
        ModelTier::Reasoning => "llm.reasoning",
        ModelTier::Tool => "llm.tool",
        ModelTier::Triage => "llm.triage",
    }
}

/// Reserved task name an action-route classification is executed under.
///
/// # Panics
/// Panics if `classification` is not an action route — callers must check
/// [`Classification::is_action_route`] first.
#[must_use]
pub fn action_task_name(classification: Classification) -> &'static str {
    match classification {
        Classification::Toolchain => "toolchain.execute",
        Classification::BashAgent => "bash_agent.execute",
        Classification::PythonAgent => "python_agent.execute",
        Classification::SchedulingAgent => "scheduling_agent.execute",
        Classification::IdeaAgent => "idea_agent.execute",
        Classification::ToolchainExpert => "toolchain_expert.execute",
        other => panic!("{other:?} is not an action route"),
    }
}

fn labels_for(tier_or_task: &str) -> HashSet<String> {
    HashSet::from([tier_or_task.to_string()])
}

/// Submit `query` to the given model tier and collect the full response
/// text (draining the stream to its final token).
///
/// # Errors
/// Propagates dispatch and streaming errors from the underlying
/// [`ClusterDispatcher`] call.
pub async fn collect_tier_response(
    dispatcher: &ClusterDispatcher,
    config: &RouterConfig,
    tier: ModelTier,
    query: &str,
    priority: Priority,
) -> Result<String, SchedulerError> {
    let name = tier_task_name(tier);
    let payload = json!({ "prompt": query, "tier": format!("{tier:?}") });
    let handle = dispatcher
        .submit_task(
            name,
            payload,
            priority,
            labels_for(name),
            Duration::ZERO,
            HashMap::new(),
            None,
        )
        .await?;
    let stream = dispatcher.stream_result(&handle, config.query_timeout).await?;
    let mut text = String::new();
    loop {
        match stream.recv(config.token_timeout).await? {
            Some(token) => {
                if token.is_final {
                    break;
                }
                text.push_str(&token.text);
            }
            None => break,
        }
    }
    Ok(text)
}

/// Run triage, resolving to a classification the instant the accumulated
/// buffer holds a first word, rather than waiting for the stream to finish.
/// This is what lets the interruption rule actually cut the preamble short
/// instead of only ever firing after triage has nothing left to say.
///
/// # Errors
/// Propagates dispatch/streaming errors; an empty or unrecognized triage
/// response resolves to [`Classification::Simple`] rather than an error,
/// matching spec's triage-failure fallback.
pub async fn run_triage(
    dispatcher: &ClusterDispatcher,
    config: &RouterConfig,
    query: &str,
) -> Result<Classification, SchedulerError> {
    let name = tier_task_name(ModelTier::Triage);
    let payload = json!({ "prompt": query, "tier": "Triage" });
    let handle = dispatcher
        .submit_task(
            name,
            payload,
            Priority::High,
            labels_for(name),
            Duration::ZERO,
            HashMap::new(),
            None,
        )
        .await?;
    let stream = dispatcher.stream_result(&handle, config.query_timeout).await?;
    let mut buffer = String::new();
    loop {
        match stream.recv(config.token_timeout).await? {
            Some(token) => {
                if token.is_final {
                    break;
                }
                buffer.push_str(&token.text);
                if !buffer.trim().is_empty() {
                    let classification = Classification::parse_first_word(&buffer);
                    debug!(buffer, ?classification, "triage classified from first word");
                    return Ok(classification);
                }
            }
            None => break,
        }
    }
    debug!(buffer, "triage stream ended with no classifiable word");
    Ok(Classification::parse_first_word(&buffer))
}

/// Begin streaming a preamble answer on the fast tier, forwarding tokens to
/// `out` until the stream ends or `stop` is notified (an action route was
/// selected by triage). Returns normally in either case.
///
/// # Errors
/// Propagates dispatch/streaming errors from the fast-tier call.
pub async fn run_preamble(
    dispatcher: &ClusterDispatcher,
    config: &RouterConfig,
    query: &str,
    action_aware_prefix: Option<&str>,
    stop: &tokio::sync::Notify,
    out: &flume::Sender<String>,
) -> Result<(), SchedulerError> {
    let prompt = match action_aware_prefix {
        Some(prefix) => format!("{prefix}\n{query}"),
        None => query.to_string(),
    };
    let name = tier_task_name(ModelTier::Fast);
    let payload = json!({ "prompt": prompt, "tier": "Fast" });
    let handle = dispatcher
        .submit_task(
            name,
            payload,
            Priority::Normal,
            labels_for(name),
            Duration::ZERO,
            HashMap::new(),
            None,
        )
        .await?;
    let stream = dispatcher.stream_result(&handle, config.query_timeout).await?;
    loop {
        tokio::select! {
            biased;
            () = stop.notified() => return Ok(()),
            received = stream.recv(config.token_timeout) => {
                match received? {
                    Some(token) => {
                        if token.is_final {
                            return Ok(());
                        }
                        if out.send(token.text).is_err() {
                            return Ok(());
                        }
                    }
                    None => return Ok(()),
                }
            }
        }
    }
}

/// Run an action route's task to completion, forwarding streamed tokens
/// (or, for a non-streaming result, its single value) to `out`.
///
/// # Errors
/// Propagates dispatch/streaming errors from the action task.
pub async fn run_action(
    dispatcher: &ClusterDispatcher,
    config: &RouterConfig,
    classification: Classification,
    query: &str,
    out: &flume::Sender<String>,
) -> Result<(), SchedulerError> {
    let name = action_task_name(classification);
    let payload: Value = json!({ "query": query });
    let handle = dispatcher
        .submit_task(
            name,
            payload,
            Priority::High,
            labels_for(name),
            Duration::ZERO,
            HashMap::new(),
            None,
        )
        .await?;
    let stream = dispatcher.stream_result(&handle, config.query_timeout).await?;
    loop {
        match stream.recv(config.token_timeout).await? {
            Some(token) => {
                if token.is_final {
                    break;
                }
                if out.send(token.text).is_err() {
                    break;
                }
            }
            None => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_task_names_are_stable() {
        assert_eq!(tier_task_name(ModelTier::Fast), "llm.fast");
        assert_eq!(tier_task_name(ModelTier::Reasoning), "llm.reasoning");
    }

    #[test]
    fn action_task_names_cover_every_route() {
        for c in [
            Classification::Toolchain,
            Classification::BashAgent,
            Classification::PythonAgent,
            Classification::SchedulingAgent,
            Classification::IdeaAgent,
            Classification::ToolchainExpert,
        ] {
            assert!(!action_task_name(c).is_empty());
        }
    }

    #[test]
    #[should_panic(expected = "not an action route")]
    fn action_task_name_panics_on_non_action_route() {
        let _ = action_task_name(Classification::Simple);
    }
}
