// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// The five built-in agent types.  The catalog in [`crate::catalog`] maps
/// each to its system prompt, tool allowlist and read-only flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentKind {
    GeneralPurpose,
    Explore,
    Code,
    Plan,
    Completion,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::GeneralPurpose => "generalPurpose",
            AgentKind::Explore => "explore",
            AgentKind::Code => "code",
            AgentKind::Plan => "plan",
            AgentKind::Completion => "completion",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "generalPurpose" => Some(AgentKind::GeneralPurpose),
            "explore" => Some(AgentKind::Explore),
            "code" => Some(AgentKind::Code),
            "plan" => Some(AgentKind::Plan),
            "completion" => Some(AgentKind::Completion),
            _ => None,
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which model serves a task: the session default, the configured fast
/// provider, or an explicit model identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ModelTier {
    #[default]
    Default,
    Fast,
    Model(String),
}

impl ModelTier {
    pub fn parse(s: &str) -> Self {
        match s {
            "" | "default" => ModelTier::Default,
            "fast" => ModelTier::Fast,
            other => ModelTier::Model(other.to_string()),
        }
    }

    pub fn is_fast(&self) -> bool {
        matches!(self, ModelTier::Fast)
    }

    pub fn explicit_model(&self) -> Option<&str> {
        match self {
            ModelTier::Model(id) => Some(id),
            _ => None,
        }
    }
}

/// One unit of work submitted to the runner.
#[derive(Debug, Clone)]
pub struct AgentTask {
    /// Short human label (3-5 words) used for progress display.
    pub description: String,
    /// The instruction text for the agent.
    pub prompt: String,
    /// Agent type name; unknown names produce an error result, not a panic.
    pub agent_type: String,
    pub model_tier: ModelTier,
    /// When set, this task continues the named existing agent.
    pub resume_agent_id: Option<String>,
    /// May only tighten the agent type's read-only flag, never loosen it.
    pub read_only: bool,
    /// File paths inlined into the first user message.
    pub attachments: Vec<PathBuf>,
}

impl AgentTask {
    pub fn new(
        agent_type: impl Into<String>,
        description: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            description: description.into(),
            prompt: prompt.into(),
            agent_type: agent_type.into(),
            model_tier: ModelTier::Default,
            resume_agent_id: None,
            read_only: false,
            attachments: Vec::new(),
        }
    }

    /// A task that resumes an existing agent with a new instruction.
    pub fn resume(
        agent_id: impl Into<String>,
        description: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            resume_agent_id: Some(agent_id.into()),
            ..Self::new("", description, prompt)
        }
    }
}

/// The outcome of one runner invocation.  Failures are values, not errors:
/// callers always get a result back.
#[derive(Debug, Clone)]
pub struct AgentResult {
    pub agent_id: String,
    /// Final assistant text (last non-empty content of the run).
    pub output: String,
    pub tool_call_count: u64,
    pub elapsed: Duration,
    pub is_error: bool,
    pub error_message: Option<String>,
}

impl AgentResult {
    pub fn ok(
        agent_id: impl Into<String>,
        output: impl Into<String>,
        tool_call_count: u64,
        elapsed: Duration,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            output: output.into(),
            tool_call_count,
            elapsed,
            is_error: false,
            error_message: None,
        }
    }

    pub fn failure(
        agent_id: impl Into<String>,
        message: impl Into<String>,
        tool_call_count: u64,
        elapsed: Duration,
    ) -> Self {
        let message = message.into();
        Self {
            agent_id: agent_id.into(),
            output: message.clone(),
            tool_call_count,
            elapsed,
            is_error: true,
            error_message: Some(message),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_kind_round_trips_through_names() {
        for kind in [
            AgentKind::GeneralPurpose,
            AgentKind::Explore,
            AgentKind::Code,
            AgentKind::Plan,
            AgentKind::Completion,
        ] {
            assert_eq!(AgentKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(AgentKind::parse("no-such-type"), None);
    }

    #[test]
    fn model_tier_parses_keywords_and_ids() {
        assert_eq!(ModelTier::parse("fast"), ModelTier::Fast);
        assert_eq!(ModelTier::parse("default"), ModelTier::Default);
        assert_eq!(ModelTier::parse(""), ModelTier::Default);
        assert_eq!(
            ModelTier::parse("deepseek-reasoner"),
            ModelTier::Model("deepseek-reasoner".into())
        );
    }

    #[test]
    fn resume_task_sets_resume_id() {
        let t = AgentTask::resume("abc123", "follow up", "continue");
        assert_eq!(t.resume_agent_id.as_deref(), Some("abc123"));
        assert_eq!(t.prompt, "continue");
    }

    #[test]
    fn failure_result_mirrors_message_into_output() {
        let r = AgentResult::failure("id", "went wrong", 0, Duration::ZERO);
        assert!(r.is_error);
        assert_eq!(r.output, "went wrong");
        assert_eq!(r.error_message.as_deref(), Some("went wrong"));
    }
}
