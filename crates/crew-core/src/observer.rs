// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

// ─── Event values ─────────────────────────────────────────────────────────────

/// Emitted once per run, before any progress or tool-call event for the
/// same agent id.
#[derive(Debug, Clone)]
pub struct AgentStarted {
    pub agent_id: String,
    pub agent_type: String,
    pub description: String,
    /// True when this run resumes an existing agent.
    pub resumed: bool,
}

/// Emitted once per model round.
#[derive(Debug, Clone)]
pub struct AgentProgress {
    pub agent_id: String,
    pub agent_type: String,
    pub description: String,
    pub step: u32,
    pub elapsed: Duration,
    /// Pre-formatted one-line summary for simple consumers.
    pub message: String,
}

/// The final event for a successful run.  A later resumption emits a fresh
/// started/completed pair under the same id.
#[derive(Debug, Clone)]
pub struct AgentCompleted {
    pub agent_id: String,
    pub output: String,
    pub tool_call_count: u64,
    pub elapsed: Duration,
}

/// The final event for a failed or cancelled run.
#[derive(Debug, Clone)]
pub struct AgentFailed {
    pub agent_id: String,
    pub message: String,
}

/// One mediated tool invocation, emitted in started then completed-or-failed
/// order.  Events for concurrent agents may interleave; consumers correlate
/// by function name and started order when they need pairing.
#[derive(Debug, Clone)]
pub struct ToolCallEvent {
    pub function_name: String,
    pub plugin_name: Option<String>,
    /// One canonical argument for well-known tools, otherwise up to two
    /// truncated key=value pairs.  Never the full argument object.
    pub argument_summary: String,
    pub result: Option<String>,
    pub elapsed: Duration,
    pub success: bool,
}

// ─── Ports ────────────────────────────────────────────────────────────────────

/// Receives agent lifecycle and progress events.
///
/// The core calls these synchronously from whichever task the event occurs
/// on; implementations marshal to their own runtime if required and must
/// not block.  Concurrent producers may call in parallel.
pub trait ProgressReporter: Send + Sync {
    fn on_agent_started(&self, event: &AgentStarted) {
        let _ = event;
    }
    fn on_agent_progress(&self, event: &AgentProgress) {
        let _ = event;
    }
    fn on_agent_completed(&self, event: &AgentCompleted) {
        let _ = event;
    }
    fn on_agent_failed(&self, event: &AgentFailed) {
        let _ = event;
    }
}

/// Receives one event pair per mediated tool call.
pub trait ToolCallObserver: Send + Sync {
    fn on_tool_call_started(&self, event: &ToolCallEvent) {
        let _ = event;
    }
    fn on_tool_call_completed(&self, event: &ToolCallEvent) {
        let _ = event;
    }
    fn on_tool_call_failed(&self, event: &ToolCallEvent) {
        let _ = event;
    }
}

/// Plain advisory output lines (team step headers and the like).
pub trait OutputSink: Send + Sync {
    fn line(&self, text: &str) {
        let _ = text;
    }
}

/// Blocking user interaction.  The one place an adapter may wait for input;
/// the observer callbacks above must never do so.
#[async_trait]
pub trait UserInteraction: Send + Sync {
    async fn ask(&self, question: &str) -> anyhow::Result<String>;
}

/// Ignores everything.  The default observer set.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProgressReporter for NoopObserver {}
impl ToolCallObserver for NoopObserver {}
impl OutputSink for NoopObserver {}

#[async_trait]
impl UserInteraction for NoopObserver {
    async fn ask(&self, _question: &str) -> anyhow::Result<String> {
        Ok(String::new())
    }
}

/// The observer surfaces handed to the runner and coordinator.  Cloning is
/// cheap; all fields are shared handles.
#[derive(Clone)]
pub struct Observers {
    pub progress: Arc<dyn ProgressReporter>,
    pub tool_calls: Arc<dyn ToolCallObserver>,
    pub output: Arc<dyn OutputSink>,
    pub interaction: Arc<dyn UserInteraction>,
}

impl Default for Observers {
    fn default() -> Self {
        let noop = Arc::new(NoopObserver);
        Self {
            progress: noop.clone(),
            tool_calls: noop.clone(),
            output: noop.clone(),
            interaction: noop,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_interaction_answers_empty() {
        let answer = NoopObserver.ask("proceed?").await.unwrap();
        assert_eq!(answer, "");
    }

    #[test]
    fn default_observers_accept_events() {
        let obs = Observers::default();
        obs.progress.on_agent_failed(&AgentFailed {
            agent_id: "x".into(),
            message: "m".into(),
        });
        obs.output.line("advisory");
    }
}
