// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::debug;

use crew_tools::{ToolCall, ToolOutput, ToolRegistry};

use crate::observer::{ToolCallEvent, ToolCallObserver};
use crate::registry::AgentRegistry;

/// Longest value rendered in a key=value argument summary.
const SUMMARY_VALUE_MAX: usize = 40;

/// Mediates every tool invocation for one agent run: emits started and
/// completed-or-failed events with uniform timing, and keeps the per-agent
/// and session-wide counters.
///
/// This is an observability layer, not a security boundary.  Capability
/// enforcement happened when the scoped registry was built; a call that
/// slips past the manifest simply fails lookup here.
pub struct ToolCallInterceptor {
    tools: Arc<ToolRegistry>,
    observer: Arc<dyn ToolCallObserver>,
    registry: Arc<AgentRegistry>,
    agent_id: String,
    session_counter: Arc<AtomicU64>,
}

impl ToolCallInterceptor {
    pub fn new(
        tools: Arc<ToolRegistry>,
        observer: Arc<dyn ToolCallObserver>,
        registry: Arc<AgentRegistry>,
        agent_id: impl Into<String>,
        session_counter: Arc<AtomicU64>,
    ) -> Self {
        Self {
            tools,
            observer,
            registry,
            agent_id: agent_id.into(),
            session_counter,
        }
    }

    /// Run one tool call through the registry, emitting the event pair.
    ///
    /// Tool failures come back as `ToolOutput { is_error: true }` and flow
    /// to the model as ordinary results; only the observer distinguishes
    /// completed from failed.
    pub async fn invoke(&self, call: &ToolCall) -> ToolOutput {
        let mut event = ToolCallEvent {
            function_name: call.name.clone(),
            plugin_name: None,
            argument_summary: summarize_args(&call.name, &call.args),
            result: None,
            elapsed: Default::default(),
            success: false,
        };
        self.observer.on_tool_call_started(&event);

        let started = Instant::now();
        let output = self.tools.execute(call).await;
        event.elapsed = started.elapsed();
        event.result = Some(output.content.clone());
        event.success = !output.is_error;

        if output.is_error {
            debug!(tool = %call.name, agent_id = %self.agent_id, "tool call failed");
            self.observer.on_tool_call_failed(&event);
        } else {
            self.observer.on_tool_call_completed(&event);
            self.registry.increment_tool_calls(&self.agent_id);
            self.session_counter.fetch_add(1, Ordering::Relaxed);
        }
        output
    }
}

/// Produce a short, loggable summary of a tool call's arguments.
///
/// Well-known tools surface their one canonical argument; everything else
/// gets up to two key=value pairs with values truncated.  The full argument
/// object is never logged through this path.
pub(crate) fn summarize_args(function_name: &str, args: &Value) -> String {
    let canonical = match function_name {
        "bash" => Some("command"),
        "read_file" | "write_file" | "edit_file" | "list_directory" => Some("path"),
        "grep" | "glob" => Some("pattern"),
        "web_search" => Some("query"),
        "web_fetch" => Some("url"),
        "Task" => Some("description"),
        _ => None,
    };

    if let Some(key) = canonical {
        if let Some(value) = args.get(key) {
            return truncate(&render_value(value), SUMMARY_VALUE_MAX).to_string();
        }
    }

    let Some(map) = args.as_object() else {
        return String::new();
    };
    map.iter()
        .take(2)
        .map(|(k, v)| format!("{k}={}", truncate(&render_value(v), SUMMARY_VALUE_MAX)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}…")
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
