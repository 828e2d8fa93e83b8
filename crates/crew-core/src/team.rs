// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::observer::OutputSink;
use crate::parallel::{ParallelExecutor, DEFAULT_MAX_CONCURRENCY};
use crate::runner::SubAgentRunner;
use crate::task::{AgentResult, AgentTask, ModelTier};

/// How a team's roles are composed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamPattern {
    /// Roles run in declaration order; each sees its predecessor's output.
    Sequential,
    /// All roles run in parallel; outputs merge in declaration order.
    FanOutFanIn,
    /// Roles 1..N run as parallel workers; role 0 synthesises their output.
    Supervisor,
}

impl fmt::Display for TeamPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TeamPattern::Sequential => "sequential",
            TeamPattern::FanOutFanIn => "fan-out/fan-in",
            TeamPattern::Supervisor => "supervisor",
        };
        f.write_str(s)
    }
}

/// One member of a team.
#[derive(Debug, Clone)]
pub struct TeamRole {
    pub name: String,
    pub agent_type: String,
    pub model_tier: ModelTier,
    pub read_only: bool,
    /// Prompt with `{input}` and `{previous}` placeholders.
    pub prompt_template: String,
}

impl TeamRole {
    pub fn new(
        name: impl Into<String>,
        agent_type: impl Into<String>,
        prompt_template: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            agent_type: agent_type.into(),
            model_tier: ModelTier::Default,
            read_only: false,
            prompt_template: prompt_template.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TeamDefinition {
    pub name: String,
    pub pattern: TeamPattern,
    pub roles: Vec<TeamRole>,
}

/// Composes sub-agents into the three team patterns.  A pure orchestrator
/// over the runner: every role is an ordinary runner invocation, and
/// cancellation cascades through child tokens.
pub struct TeamCoordinator {
    runner: Arc<SubAgentRunner>,
    output: Arc<dyn OutputSink>,
}

impl TeamCoordinator {
    pub fn new(runner: Arc<SubAgentRunner>, output: Arc<dyn OutputSink>) -> Self {
        Self { runner, output }
    }

    pub async fn run_team(
        &self,
        team: &TeamDefinition,
        input: &str,
        cancel: &CancellationToken,
    ) -> AgentResult {
        if team.roles.is_empty() {
            return AgentResult::failure(
                format!("team_{}", team.name),
                format!("Team '{}' has no roles", team.name),
                0,
                Duration::ZERO,
            );
        }
        self.output.line(&format!(
            "Team '{}' starting ({}, {} roles)",
            team.name,
            team.pattern,
            team.roles.len()
        ));
        debug!(team = %team.name, pattern = %team.pattern, roles = team.roles.len(), "running team");

        match team.pattern {
            TeamPattern::Sequential => self.run_sequential(team, input, cancel).await,
            TeamPattern::FanOutFanIn => self.run_fan_out(team, input, cancel).await,
            TeamPattern::Supervisor => self.run_supervisor(team, input, cancel).await,
        }
    }

    // ── Sequential ────────────────────────────────────────────────────────────

    /// Roles run in declaration order; role N sees role N-1's output as
    /// `{previous}`.  The first error result aborts the chain and is
    /// returned unchanged.
    async fn run_sequential(
        &self,
        team: &TeamDefinition,
        input: &str,
        cancel: &CancellationToken,
    ) -> AgentResult {
        let mut previous = String::new();
        let mut last: Option<AgentResult> = None;

        for (i, role) in team.roles.iter().enumerate() {
            self.output.line(&format!(
                "Step {}/{}: {} ({})",
                i + 1,
                team.roles.len(),
                role.name,
                role.agent_type
            ));
            let task = role_task(role, input, &previous);
            let result = self.runner.run(&task, &cancel.child_token()).await;
            if result.is_error {
                return result;
            }
            previous = result.output.clone();
            last = Some(result);
        }

        // Roles are non-empty, so a successful chain always has a last result.
        last.unwrap_or_else(|| {
            AgentResult::failure(
                format!("team_{}", team.name),
                "sequential team produced no result",
                0,
                Duration::ZERO,
            )
        })
    }

    // ── Fan-out / fan-in ──────────────────────────────────────────────────────

    /// All roles run in parallel; the merged result concatenates their
    /// outputs in declaration order regardless of completion order.
    async fn run_fan_out(
        &self,
        team: &TeamDefinition,
        input: &str,
        cancel: &CancellationToken,
    ) -> AgentResult {
        let tasks: Vec<AgentTask> = team
            .roles
            .iter()
            .map(|role| role_task(role, input, ""))
            .collect();

        let executor = ParallelExecutor::new(Arc::clone(&self.runner));
        let results = executor
            .run_parallel(tasks, DEFAULT_MAX_CONCURRENCY, cancel)
            .await;

        self.output
            .line(&format!("Fan-in merged {} results", results.len()));
        merge_results(&team.name, &team.roles, &results)
    }

    // ── Supervisor ────────────────────────────────────────────────────────────

    /// Roles 1..N run as parallel workers exactly as in fan-out; role 0 then
    /// synthesises with `{previous}` set to the concatenated worker outputs.
    async fn run_supervisor(
        &self,
        team: &TeamDefinition,
        input: &str,
        cancel: &CancellationToken,
    ) -> AgentResult {
        if team.roles.len() < 2 {
            return AgentResult::failure(
                format!("team_{}", team.name),
                format!(
                    "Supervisor team '{}' needs at least 2 roles, got {}",
                    team.name,
                    team.roles.len()
                ),
                0,
                Duration::ZERO,
            );
        }
        let supervisor = &team.roles[0];
        let workers = &team.roles[1..];

        let tasks: Vec<AgentTask> = workers
            .iter()
            .map(|role| role_task(role, input, ""))
            .collect();
        let executor = ParallelExecutor::new(Arc::clone(&self.runner));
        let results = executor
            .run_parallel(tasks, DEFAULT_MAX_CONCURRENCY, cancel)
            .await;

        let previous = section_lines(workers, &results);
        self.output.line("Supervisor synthesising");

        let task = role_task(supervisor, input, &previous);
        self.runner.run(&task, &cancel.child_token()).await
    }
}

/// Instantiate a role's prompt template into a runnable task.
fn role_task(role: &TeamRole, input: &str, previous: &str) -> AgentTask {
    let prompt = role
        .prompt_template
        .replace("{input}", input)
        .replace("{previous}", previous);
    AgentTask {
        description: role.name.clone(),
        prompt,
        agent_type: role.agent_type.clone(),
        model_tier: role.model_tier.clone(),
        resume_agent_id: None,
        read_only: role.read_only,
        attachments: Vec::new(),
    }
}

/// One `--- {role} ({type}) ---` section per role, in declaration order.
/// Error entries surface their message inline rather than being dropped.
fn section_lines(roles: &[TeamRole], results: &[AgentResult]) -> String {
    let mut merged = String::new();
    for (role, result) in roles.iter().zip(results) {
        let body = if result.is_error {
            format!("(error: {})", result.output)
        } else {
            result.output.clone()
        };
        merged.push_str(&format!(
            "--- {} ({}) ---\n{}\n",
            role.name, role.agent_type, body
        ));
    }
    merged
}

/// The fan-in aggregate: header plus ordered sections, tool calls summed,
/// elapsed as the slowest role, id synthesised from the team name.
fn merge_results(team_name: &str, roles: &[TeamRole], results: &[AgentResult]) -> AgentResult {
    let merged = format!(
        "=== Merged Team Results ===\n{}",
        section_lines(roles, results)
    );
    AgentResult {
        agent_id: format!("team_{team_name}"),
        output: merged,
        tool_call_count: results.iter().map(|r| r.tool_call_count).sum(),
        elapsed: results
            .iter()
            .map(|r| r.elapsed)
            .max()
            .unwrap_or(Duration::ZERO),
        is_error: false,
        error_message: None,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn role(name: &str) -> TeamRole {
        TeamRole::new(name, "explore", "role {input} after {previous}")
    }

    fn result(output: &str, tool_calls: u64, elapsed_ms: u64) -> AgentResult {
        AgentResult::ok("id", output, tool_calls, Duration::from_millis(elapsed_ms))
    }

    #[test]
    fn role_task_substitutes_both_placeholders() {
        let task = role_task(&role("scanner"), "the input", "earlier output");
        assert_eq!(task.prompt, "role the input after earlier output");
        assert_eq!(task.description, "scanner");
        assert_eq!(task.agent_type, "explore");
    }

    #[test]
    fn merge_preserves_declaration_order_and_header() {
        let roles = vec![role("A"), role("B"), role("C")];
        let results = vec![result("one", 1, 10), result("two", 2, 30), result("three", 0, 20)];
        let merged = merge_results("demo", &roles, &results);

        assert!(merged.output.starts_with("=== Merged Team Results ===\n"));
        let a = merged.output.find("--- A (explore) ---").unwrap();
        let b = merged.output.find("--- B (explore) ---").unwrap();
        let c = merged.output.find("--- C (explore) ---").unwrap();
        assert!(a < b && b < c);

        assert_eq!(merged.agent_id, "team_demo");
        assert_eq!(merged.tool_call_count, 3);
        assert_eq!(merged.elapsed, Duration::from_millis(30));
        assert!(!merged.is_error);
    }

    #[test]
    fn merge_inlines_role_errors() {
        let roles = vec![role("A"), role("B")];
        let results = vec![
            result("fine", 0, 1),
            AgentResult::failure("id", "broke", 0, Duration::ZERO),
        ];
        let merged = merge_results("demo", &roles, &results);
        assert!(merged.output.contains("(error: broke)"));
        assert!(!merged.is_error);
    }
}
