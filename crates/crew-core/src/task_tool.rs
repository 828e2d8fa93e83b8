use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crew_tools::{Tool, ToolCall, ToolOutput};

use crate::runner::SubAgentRunner;
use crate::task::{AgentTask, ModelTier};

const MAX_DEPTH: usize = 3;

/// The nested agent-spawn tool: lets a model delegate a focused sub-task to
/// a fresh (or resumed) agent and receive its final text output.
///
/// The runner is injected at construction; the tool registry only ever sees
/// this wrapper, which keeps the dependency one-way.
pub struct TaskTool {
    runner: Arc<SubAgentRunner>,
    depth: Arc<AtomicUsize>,
}

impl TaskTool {
    /// `depth` is shared with any sibling spawn tools so that nesting is
    /// bounded across the whole session, not per tool instance.
    pub fn new(runner: Arc<SubAgentRunner>, depth: Arc<AtomicUsize>) -> Self {
        Self { runner, depth }
    }
}

#[async_trait]
impl Tool for TaskTool {
    fn name(&self) -> &str {
        "Task"
    }

    fn description(&self) -> &str {
        "Spawn a sub-agent to complete a focused task and return its final text output. \
         Useful for delegating isolated sub-tasks. Pass resume to continue a suspended \
         agent. Maximum nesting depth is 3."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "description": {
                    "type": "string",
                    "description": "Short label (3-5 words) shown in progress output"
                },
                "prompt": {
                    "type": "string",
                    "description": "The task instruction for the sub-agent"
                },
                "agentType": {
                    "type": "string",
                    "enum": ["generalPurpose", "explore", "code", "plan", "completion"],
                    "description": "Which agent type to spawn"
                },
                "model": {
                    "type": "string",
                    "description": "Model tier: 'fast', 'default', or an explicit model id"
                },
                "resume": {
                    "type": "string",
                    "description": "Agent id to resume instead of spawning a new agent"
                },
                "readOnly": {
                    "type": "boolean",
                    "description": "Restrict the sub-agent to read-only tools"
                },
                "attachments": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "File paths inlined into the first message"
                }
            },
            "required": ["description", "prompt", "agentType"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let description = call
            .args
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or("sub-agent task")
            .to_string();
        let Some(prompt) = call.args.get("prompt").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing 'prompt'");
        };
        let agent_type = call
            .args
            .get("agentType")
            .and_then(|v| v.as_str())
            .unwrap_or("generalPurpose")
            .to_string();

        let current_depth = self.depth.load(Ordering::Relaxed);
        if current_depth >= MAX_DEPTH {
            return ToolOutput::err(
                &call.id,
                format!("maximum sub-agent depth ({MAX_DEPTH}) reached"),
            );
        }

        let mut task = AgentTask::new(agent_type, description, prompt);
        if let Some(model) = call.args.get("model").and_then(|v| v.as_str()) {
            task.model_tier = ModelTier::parse(model);
        }
        if let Some(resume) = call.args.get("resume").and_then(|v| v.as_str()) {
            task.resume_agent_id = Some(resume.to_string());
        }
        if let Some(read_only) = call.args.get("readOnly").and_then(|v| v.as_bool()) {
            task.read_only = read_only;
        }
        if let Some(paths) = call.args.get("attachments").and_then(|v| v.as_array()) {
            task.attachments = paths
                .iter()
                .filter_map(|p| p.as_str())
                .map(PathBuf::from)
                .collect();
        }

        self.depth.fetch_add(1, Ordering::Relaxed);
        debug!(agent_type = %task.agent_type, depth = current_depth + 1, "Task tool: spawning sub-agent");

        let result = self.runner.run(&task, &CancellationToken::new()).await;

        self.depth.fetch_sub(1, Ordering::Relaxed);

        if result.is_error {
            ToolOutput::err(
                &call.id,
                format!(
                    "sub-agent error: {}",
                    result.error_message.unwrap_or(result.output)
                ),
            )
        } else if result.output.is_empty() {
            ToolOutput::ok(&call.id, "(sub-agent produced no text output)")
        } else {
            // Surface the agent id so the caller can resume it later.
            ToolOutput::ok(
                &call.id,
                format!("[agent {}]\n{}", result.agent_id, result.output),
            )
        }
    }
}
