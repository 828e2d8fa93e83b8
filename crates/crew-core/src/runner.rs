// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crew_config::RuntimeConfig;
use crew_model::{
    AgentBinding, ExecutionSettings, Message, ModelPortal, PortalRouter, SessionSpec,
    ToolCallRequest,
};
use crew_tools::{ToolCall, ToolRegistry};

use crate::attachments::compose_user_message;
use crate::catalog::{self, AgentTypeSpec};
use crate::interceptor::ToolCallInterceptor;
use crate::observer::{
    AgentCompleted, AgentFailed, AgentProgress, AgentStarted, Observers,
};
use crate::registry::{AgentInfo, AgentRegistry, AgentStatus};
use crate::task::{AgentKind, AgentResult, AgentTask};

/// Creates or resumes one agent and drives its chat loop to completion,
/// failure, or cancellation.  Failures come back as error-flagged
/// [`AgentResult`]s; nothing escapes as a process error except registry
/// programmer errors.
pub struct SubAgentRunner {
    router: Arc<PortalRouter>,
    tools: Arc<ToolRegistry>,
    registry: Arc<AgentRegistry>,
    observers: Observers,
    config: Arc<RuntimeConfig>,
    /// Session-wide count of successful tool calls across all agents.
    session_tool_counter: Arc<AtomicU64>,
}

/// Identity strings threaded through one invocation.
struct RunContext {
    agent_id: String,
    agent_type: String,
    description: String,
    started: Instant,
}

enum LoopError {
    Cancelled,
    Model(anyhow::Error),
}

impl SubAgentRunner {
    pub fn new(
        router: Arc<PortalRouter>,
        tools: Arc<ToolRegistry>,
        registry: Arc<AgentRegistry>,
        observers: Observers,
        config: Arc<RuntimeConfig>,
    ) -> Self {
        Self {
            router,
            tools,
            registry,
            observers,
            config,
            session_tool_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Successful tool calls across every agent this runner has driven.
    pub fn session_tool_calls(&self) -> u64 {
        self.session_tool_counter.load(Ordering::Relaxed)
    }

    /// Run one task to completion.  Dispatches on `task.resume_agent_id`.
    pub async fn run(&self, task: &AgentTask, cancel: &CancellationToken) -> AgentResult {
        let started = Instant::now();
        if cancel.is_cancelled() {
            let id = task.resume_agent_id.clone().unwrap_or_default();
            return AgentResult::failure(id, "cancelled", 0, started.elapsed());
        }
        match task.resume_agent_id.as_deref() {
            Some(id) => self.run_resume(id, task, cancel, started).await,
            None => self.run_new(task, cancel, started).await,
        }
    }

    // ── New-agent path ────────────────────────────────────────────────────────

    async fn run_new(
        &self,
        task: &AgentTask,
        cancel: &CancellationToken,
        started: Instant,
    ) -> AgentResult {
        let Some(spec) = catalog::lookup(&task.agent_type) else {
            return AgentResult::failure(
                String::new(),
                format!("Unknown agent type: {}", task.agent_type),
                0,
                started.elapsed(),
            );
        };

        let routed = match self.router.route(
            &task.agent_type,
            task.model_tier.is_fast(),
            task.model_tier.explicit_model(),
        ) {
            Ok(r) => r,
            Err(e) => {
                return AgentResult::failure(
                    String::new(),
                    format!("No model provider available: {e}"),
                    0,
                    started.elapsed(),
                )
            }
        };

        let agent_id = self.registry.allocate_id();

        // The capability set is computed once here and advertised to the
        // portal as the session manifest; it is not re-checked per call.
        let effective_read_only = catalog::effective_read_only(spec, task.read_only);
        let allowed =
            catalog::compose_allowed_tools(spec, effective_read_only, &self.tools.names());
        let scoped = self.tools.scoped(&allowed);

        let system_prompt = self.system_prompt(spec, effective_read_only);
        let user_message = compose_user_message(&task.prompt, &task.attachments).await;

        let settings = if spec.kind == AgentKind::Completion {
            ExecutionSettings::completion()
        } else {
            ExecutionSettings::default()
        };

        let session = SessionSpec {
            model_id: routed.model_id.clone(),
            system_prompt: system_prompt.clone(),
            allowed_tools: manifest(&scoped),
            settings,
        };
        let binding = match routed.portal.create_session(session).await {
            Ok(b) => b,
            Err(e) => {
                return AgentResult::failure(
                    agent_id,
                    format!("Failed to create model session: {e}"),
                    0,
                    started.elapsed(),
                )
            }
        };

        let info = AgentInfo::new(
            &agent_id,
            spec.kind,
            &task.description,
            effective_read_only,
            task.model_tier.clone(),
            &routed.provider,
        );
        if let Err(e) = self
            .registry
            .register(info, vec![Message::system(&system_prompt)], binding.clone())
        {
            return AgentResult::failure(agent_id, e.to_string(), 0, started.elapsed());
        }

        debug!(agent_id = %agent_id, agent_type = %task.agent_type, provider = %routed.provider, "spawning sub-agent");
        self.observers.progress.on_agent_started(&AgentStarted {
            agent_id: agent_id.clone(),
            agent_type: task.agent_type.clone(),
            description: task.description.clone(),
            resumed: false,
        });

        let history = vec![Message::system(system_prompt), Message::user(user_message)];
        self.registry.commit_history(&agent_id, history.clone());

        let ctx = RunContext {
            agent_id,
            agent_type: task.agent_type.clone(),
            description: task.description.clone(),
            started,
        };
        self.drive(ctx, routed.portal, &binding, history, cancel).await
    }

    // ── Resume path ───────────────────────────────────────────────────────────

    async fn run_resume(
        &self,
        id: &str,
        task: &AgentTask,
        cancel: &CancellationToken,
        started: Instant,
    ) -> AgentResult {
        let Some(snapshot) = self.registry.try_get(id) else {
            return AgentResult::failure(
                id,
                format!("Unknown agent id: {id}"),
                0,
                started.elapsed(),
            );
        };
        let Some(portal) = self.router.portal(&snapshot.info.provider) else {
            return AgentResult::failure(
                id,
                format!("Provider '{}' is no longer configured", snapshot.info.provider),
                snapshot.info.tool_call_count,
                started.elapsed(),
            );
        };
        if let Err(e) = self.registry.update_status(id, AgentStatus::Running) {
            return AgentResult::failure(
                id,
                e.to_string(),
                snapshot.info.tool_call_count,
                started.elapsed(),
            );
        }

        debug!(agent_id = %id, "resuming sub-agent");
        self.observers.progress.on_agent_started(&AgentStarted {
            agent_id: id.to_string(),
            agent_type: snapshot.info.kind.to_string(),
            description: snapshot.info.description.clone(),
            resumed: true,
        });

        let user_message = compose_user_message(&task.prompt, &task.attachments).await;
        let mut history = snapshot.history;
        history.push(Message::user(user_message));
        self.registry.commit_history(id, history.clone());

        let ctx = RunContext {
            agent_id: id.to_string(),
            agent_type: snapshot.info.kind.to_string(),
            description: snapshot.info.description.clone(),
            started,
        };
        self.drive(ctx, portal, &snapshot.binding, history, cancel).await
    }

    // ── Chat loop ─────────────────────────────────────────────────────────────

    async fn drive(
        &self,
        ctx: RunContext,
        portal: Arc<dyn ModelPortal>,
        binding: &AgentBinding,
        mut history: Vec<Message>,
        cancel: &CancellationToken,
    ) -> AgentResult {
        // Tool lookups go through the binding's manifest, so a model-emitted
        // call outside it fails as unknown-in-session.
        let scoped = Arc::new(self.tools.scoped(&binding.allowed_tool_names()));
        let interceptor = ToolCallInterceptor::new(
            scoped,
            self.observers.tool_calls.clone(),
            self.registry.clone(),
            &ctx.agent_id,
            self.session_tool_counter.clone(),
        );

        let outcome = self
            .chat_loop(&ctx, portal.as_ref(), binding, &mut history, &interceptor, cancel)
            .await;

        self.registry.commit_history(&ctx.agent_id, history);
        let tool_calls = self
            .registry
            .try_get(&ctx.agent_id)
            .map(|s| s.info.tool_call_count)
            .unwrap_or(0);
        let elapsed = ctx.started.elapsed();

        match outcome {
            Ok(output) => {
                if let Err(e) = self.registry.update_status(&ctx.agent_id, AgentStatus::Suspended)
                {
                    warn!(agent_id = %ctx.agent_id, error = %e, "suspend transition failed");
                }
                self.observers.progress.on_agent_completed(&AgentCompleted {
                    agent_id: ctx.agent_id.clone(),
                    output: output.clone(),
                    tool_call_count: tool_calls,
                    elapsed,
                });
                AgentResult::ok(ctx.agent_id, output, tool_calls, elapsed)
            }
            Err(LoopError::Cancelled) => {
                if let Err(e) = self.registry.update_status(&ctx.agent_id, AgentStatus::Cancelled)
                {
                    warn!(agent_id = %ctx.agent_id, error = %e, "cancel transition failed");
                }
                self.observers.progress.on_agent_failed(&AgentFailed {
                    agent_id: ctx.agent_id.clone(),
                    message: "cancelled".into(),
                });
                AgentResult::failure(ctx.agent_id, "cancelled", tool_calls, elapsed)
            }
            Err(LoopError::Model(e)) => {
                if let Err(te) = self.registry.update_status(&ctx.agent_id, AgentStatus::Failed) {
                    warn!(agent_id = %ctx.agent_id, error = %te, "fail transition failed");
                }
                let message = format!("{e:#}");
                self.observers.progress.on_agent_failed(&AgentFailed {
                    agent_id: ctx.agent_id.clone(),
                    message: message.clone(),
                });
                AgentResult::failure(ctx.agent_id, message, tool_calls, elapsed)
            }
        }
    }

    /// Model round-trips until the model produces a final message with no
    /// pending tool calls, the stream ends, or cancellation fires.  Returns
    /// the last non-empty assistant content.
    async fn chat_loop(
        &self,
        ctx: &RunContext,
        portal: &dyn ModelPortal,
        binding: &AgentBinding,
        history: &mut Vec<Message>,
        interceptor: &ToolCallInterceptor,
        cancel: &CancellationToken,
    ) -> Result<String, LoopError> {
        let mut step: u32 = 0;
        let mut final_output = String::new();

        loop {
            // Cancellation is checked before every model round-trip and
            // propagated into the stream read below.
            if cancel.is_cancelled() {
                return Err(LoopError::Cancelled);
            }

            let mut stream = portal
                .invoke(binding, history, cancel)
                .await
                .map_err(LoopError::Model)?;
            step += 1;

            let mut round_calls: Vec<ToolCallRequest> = Vec::new();
            loop {
                let frame = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(LoopError::Cancelled),
                    frame = stream.next() => frame,
                };
                let Some(frame) = frame else { break };
                let frame = frame.map_err(LoopError::Model)?;

                // The last non-empty content wins as the tentative final
                // output; earlier partials stay in history regardless.
                if let Some(text) = frame.content.filter(|t| !t.is_empty()) {
                    final_output = text.clone();
                    history.push(Message::assistant(text));
                }
                round_calls.extend(frame.tool_calls);
            }

            let elapsed = ctx.started.elapsed();
            self.observers.progress.on_agent_progress(&AgentProgress {
                agent_id: ctx.agent_id.clone(),
                agent_type: ctx.agent_type.clone(),
                description: ctx.description.clone(),
                step,
                elapsed,
                message: format!(
                    "{} … {} steps, {}s",
                    ctx.description,
                    step,
                    elapsed.as_secs()
                ),
            });

            if round_calls.is_empty() {
                // Final message (or end-of-stream with nothing pending).
                return Ok(final_output);
            }

            // All tool-call messages precede any tool-result message so the
            // serialized history satisfies the parallel-tool-call contract.
            for request in &round_calls {
                history.push(Message::tool_call(
                    &request.id,
                    &request.name,
                    request.arguments.to_string(),
                ));
            }
            for request in round_calls {
                let call = ToolCall {
                    id: request.id.clone(),
                    name: request.name,
                    args: request.arguments,
                };
                let output = interceptor.invoke(&call).await;
                history.push(Message::tool_result(request.id, output.content));
            }
        }
    }

    /// Assemble the system prompt: role line, the type's prompt, an explicit
    /// read-only warning when applicable, and the closing instruction.
    fn system_prompt(&self, spec: &AgentTypeSpec, read_only: bool) -> String {
        let mut prompt = format!(
            "You are a {} subagent at {}.\n\n{}",
            spec.kind,
            self.config.work_dir.display(),
            spec.system_prompt
        );
        if read_only {
            prompt.push_str(
                "\n\nYou are in read-only mode: inspect freely, but do not modify files \
                 or system state.",
            );
        }
        prompt.push_str("\n\nComplete the task and return a clear, concise summary.");
        prompt
    }
}

/// Translate a scoped registry's schemas into the portal manifest type.
fn manifest(scoped: &ToolRegistry) -> Vec<crew_model::ToolSchema> {
    scoped
        .schemas()
        .into_iter()
        .map(|s| crew_model::ToolSchema {
            name: s.name,
            description: s.description,
            parameters: s.parameters,
        })
        .collect()
}
