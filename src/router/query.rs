//! Classification, the action-route set, and the per-classification ramp
//! table that drives `StreamingQueryRouter`'s continuation logic.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::external::llm::ModelTier;

/// The triage classifier's decision. Its first whitespace-delimited word
/// maps onto one of these twelve values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    /// Short, no-continuation query.
    Simple,
    /// Single intermediate-tier continuation.
    Intermediate,
    /// Intermediate then deep-tier continuation.
    Complex,
    /// Intermediate then reasoning-tier continuation, with thought markers.
    Reasoning,
    /// Generic toolchain action route.
    Toolchain,
    /// Shell-command action route.
    BashAgent,
    /// Python-execution action route.
    PythonAgent,
    /// Calendar/scheduling action route.
    SchedulingAgent,
    /// Idea-generation action route.
    IdeaAgent,
    /// A variant of the toolchain route used by the expert toolchain path.
    ToolchainExpert,
    /// Dispatch to several backends concurrently.
    Counsel,
    /// Side-effect only: set the current focus.
    Focus,
    /// Side-effect only: enqueue a proactive thought.
    Proactive,
}

impl Classification {
    /// Parse the first word of a triage buffer into a `Classification`,
    /// defaulting to `Simple` for anything unrecognized — the same
    /// fallback spec.md mandates for an outright triage failure.
    #[must_use]
    pub fn parse_first_word(buffer: &str) -> Self {
        let first = buffer.split_whitespace().next().unwrap_or("");
        match first.to_lowercase().as_str() {
            "simple" => Self::Simple,
            "intermediate" => Self::Intermediate,
            "complex" => Self::Complex,
            "reasoning" => Self::Reasoning,
            "toolchain" => Self::Toolchain,
            "bash-agent" => Self::BashAgent,
            "python-agent" => Self::PythonAgent,
            "scheduling-agent" => Self::SchedulingAgent,
            "idea-agent" => Self::IdeaAgent,
            "toolchain-expert" => Self::ToolchainExpert,
            "counsel" => Self::Counsel,
            "focus" => Self::Focus,
            "proactive" => Self::Proactive,
            _ => Self::Simple,
        }
    }

    /// Whether this classification interrupts the preamble and hands off
    /// to the action producer.
    #[must_use]
    pub const fn is_action_route(self) -> bool {
        matches!(
            self,
            Self::Toolchain
                | Self::BashAgent
                | Self::PythonAgent
                | Self::SchedulingAgent
                | Self::IdeaAgent
                | Self::ToolchainExpert
        )
    }

    /// One ramp stage per continuation step for non-action, non-side-effect
    /// classifications. Empty for `Simple`, `Focus`, `Proactive`, and any
    /// action route (those are handled separately).
    #[must_use]
    pub fn ramp(self) -> &'static [ModelTier] {
        match self {
            Self::Intermediate => &[ModelTier::Intermediate],
            Self::Complex => &[ModelTier::Intermediate, ModelTier::Deep],
            Self::Reasoning => &[ModelTier::Intermediate, ModelTier::Reasoning],
            _ => &[],
        }
    }

    /// Whether the reasoning side channel (thought tokens) should be
    /// polled during this classification's ramp. Only `Reasoning`'s ramp
    /// ever reaches [`ModelTier::Reasoning`] (`Complex`'s ramp stops at
    /// `Deep`), so this is `Reasoning`-only rather than also naming
    /// `Complex`, which would never actually gate anything.
    #[must_use]
    pub const fn polls_thoughts(self) -> bool {
        matches!(self, Self::Reasoning)
    }
}

/// Lowercased first-word verbs that make the preamble prompt
/// action-aware (an acknowledgement instead of an attempted solution).
pub const ACTION_VERBS: &[&str] = &[
    "get", "find", "search", "look", "check", "show", "create", "make", "write", "generate",
    "build", "run", "execute", "do", "perform", "calculate", "list", "display", "fetch",
    "retrieve", "pull",
];

/// Whether `query`'s first word is an action verb per §4.4.1.
#[must_use]
pub fn is_action_aware(query: &str) -> bool {
    query
        .split_whitespace()
        .next()
        .is_some_and(|w| ACTION_VERBS.contains(&w.to_lowercase().as_str()))
}

/// How counsel mode aggregates its concurrent backend responses. Spec
/// requires only `race` and `vote`; `merge` is optional and not implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CounselMode {
    /// First backend to produce any token wins; the rest are drained and
    /// discarded.
    Race,
    /// Wait for every backend, then pick the majority response.
    Vote,
}

impl Default for CounselMode {
    fn default() -> Self {
        Self::Race
    }
}

/// Tunables for the router: timeouts, the conclusion tier, and the
/// action-verb list (overridable for testing/localization).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Wall-clock budget for a single token read from any producer.
    pub token_timeout: Duration,
    /// Wall-clock budget for a whole query, end to end.
    pub query_timeout: Duration,
    /// Number of backends dispatched concurrently in counsel mode.
    pub counsel_fanout: usize,
    /// Aggregation strategy used by counsel mode.
    pub counsel_mode: CounselMode,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            token_timeout: Duration::from_secs(30),
            query_timeout: Duration::from_secs(120),
            counsel_fanout: 3,
            counsel_mode: CounselMode::Race,
        }
    }
}

/// Literal marker emitted exactly once before the action stream takes over.
pub const EXECUTING_MARKER: &str = "\n\n--- Executing ---\n";
/// Literal marker prepended to the conclusion stage.
pub const CONCLUSION_MARKER: &str = "\n\n--- Conclusion ---\n";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_classifications() {
        assert_eq!(Classification::parse_first_word("toolchain do the thing"), Classification::Toolchain);
        assert_eq!(Classification::parse_first_word("reasoning because"), Classification::Reasoning);
        assert_eq!(Classification::parse_first_word("gibberish"), Classification::Simple);
        assert_eq!(Classification::parse_first_word(""), Classification::Simple);
    }

    #[test]
    fn action_routes_match_spec_set() {
        for c in [
            Classification::Toolchain,
            Classification::BashAgent,
            Classification::PythonAgent,
            Classification::SchedulingAgent,
            Classification::IdeaAgent,
            Classification::ToolchainExpert,
        ] {
            assert!(c.is_action_route());
        }
        for c in [Classification::Simple, Classification::Reasoning, Classification::Counsel] {
            assert!(!c.is_action_route());
        }
    }

    #[test]
    fn action_verb_detection_is_case_insensitive() {
        assert!(is_action_aware("List files in /tmp"));
        assert!(is_action_aware("RUN the tests"));
        assert!(!is_action_aware("why does gravity work"));
    }

    #[test]
    fn ramp_tables_match_spec() {
        assert_eq!(Classification::Simple.ramp(), &[] as &[ModelTier]);
        assert_eq!(Classification::Intermediate.ramp(), &[ModelTier::Intermediate]);
        assert_eq!(
            Classification::Complex.ramp(),
            &[ModelTier::Intermediate, ModelTier::Deep]
        );
        assert_eq!(
            Classification::Reasoning.ramp(),
            &[ModelTier::Intermediate, ModelTier::Reasoning]
        );
    }
}
