//! `LLMBackend`: the only interface through which this crate touches model
//! inference. No production implementation ships here — inference itself is
//! explicitly out of scope — but the trait and a deterministic test double
//! are first-class so the router can be exercised without a real backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::SchedulerError;

/// Model tier identifier, carried on every `Stream` call so a backend can
/// route to the right underlying model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Low-latency tier used for the preamble and conclusion.
    Fast,
    /// Mid-weight tier used for the `intermediate` ramp stage.
    Intermediate,
    /// Heavier tier used for the `complex` ramp's second stage.
    Deep,
    /// Tier that exposes a chain-of-thought side channel.
    Reasoning,
    /// Tier specialized for tool/toolchain execution prompts.
    Tool,
    /// Triage classification tier.
    Triage,
}

/// Sampling and shaping parameters for a `Stream` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamParams {
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling threshold.
    pub top_p: f32,
    /// Top-k sampling cutoff.
    pub top_k: u32,
    /// Context window size, in tokens.
    pub num_ctx: u32,
    /// Sequences that terminate generation when produced.
    pub stop: Vec<String>,
    /// Which model tier to route this call to.
    pub tier: ModelTier,
}

impl StreamParams {
    /// Reasonable defaults for a given tier; callers override fields as needed.
    #[must_use]
    pub fn for_tier(tier: ModelTier) -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            num_ctx: 4096,
            stop: Vec::new(),
            tier,
        }
    }
}

/// One chunk of a streamed model response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    /// The text carried by this chunk. May be empty for a final sentinel.
    pub text: String,
    /// Whether this is the final chunk of the stream.
    pub is_final: bool,
}

impl Token {
    /// Build a non-final text chunk.
    #[must_use]
    pub fn chunk(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    /// Build the terminal sentinel chunk.
    #[must_use]
    pub fn end() -> Self {
        Self {
            text: String::new(),
            is_final: true,
        }
    }
}

/// Consumed interface to model inference. Implementations are expected to
/// close the returned channel on completion or error, per spec.
#[async_trait]
pub trait LLMBackend: Send + Sync {
    /// Stream a completion for `prompt`, shaped by `params`.
    async fn stream(
        &self,
        prompt: &str,
        params: StreamParams,
    ) -> Result<flume::Receiver<Token>, SchedulerError>;
}

/// Deterministic in-process backend used by the crate's own test suite: it
/// echoes the prompt back split on whitespace, optionally prefixed, with no
/// real inference. Mirrors the teacher's "in-process fake used in tests"
/// design note.
pub struct EchoLLMBackend {
    prefix: Option<String>,
}

impl EchoLLMBackend {
    /// Build a backend that streams `prefix` followed by the prompt's words.
    #[must_use]
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }
}

impl Default for EchoLLMBackend {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl LLMBackend for EchoLLMBackend {
    async fn stream(
        &self,
        prompt: &str,
        _params: StreamParams,
    ) -> Result<flume::Receiver<Token>, SchedulerError> {
        let (tx, rx) = flume::unbounded();
        let mut words: Vec<String> = Vec::new();
        if let Some(prefix) = &self.prefix {
            words.push(prefix.clone());
        }
        words.extend(prompt.split_whitespace().map(str::to_owned));
        tokio::spawn(async move {
            for word in words {
                if tx.send_async(Token::chunk(format!("{word} "))).await.is_err() {
                    return;
                }
            }
            let _ = tx.send_async(Token::end()).await;
        });
        Ok(rx)
    }
}
