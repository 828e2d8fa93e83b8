// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use crate::task::AgentKind;

/// Wildcard entry meaning "every tool available in the session".
pub const WILDCARD: &str = "*";

/// Tools permitted when read-only mode is in effect.  Shell access stays
/// available for inspection commands; mutation tools are excluded.
pub const READ_ONLY_TOOLS: &[&str] = &["bash", "read_file", "grep", "glob", "list_directory"];

/// Static description of one agent type.  The catalog replaces per-type
/// subclasses: the runner branches on this record only where behaviour
/// truly differs (tool filtering, execution settings, prompt assembly).
#[derive(Debug, Clone, Copy)]
pub struct AgentTypeSpec {
    pub kind: AgentKind,
    pub description: &'static str,
    pub system_prompt: &'static str,
    /// Tool allowlist; `["*"]` means every session tool, empty means none.
    pub tool_allowlist: &'static [&'static str],
    /// When true, tasks cannot loosen read-only mode for this type.
    pub read_only: bool,
}

/// The fixed agent type catalog.  Exactly these five types exist.
pub static AGENT_TYPES: &[AgentTypeSpec] = &[
    AgentTypeSpec {
        kind: AgentKind::GeneralPurpose,
        description: "General multi-step research and task execution",
        system_prompt: "You handle multi-step tasks end to end: research the codebase, \
             make the required changes, and verify your work before summarising.",
        tool_allowlist: &[WILDCARD],
        read_only: false,
    },
    AgentTypeSpec {
        kind: AgentKind::Explore,
        description: "Search and analyze the codebase; never modify",
        system_prompt: "You explore and analyze. Locate relevant files, read them, and \
             report findings with file paths and line references. You never modify anything.",
        tool_allowlist: &["bash", "read_file", "grep", "glob", "list_directory"],
        read_only: true,
    },
    AgentTypeSpec {
        kind: AgentKind::Code,
        description: "Implement features and fix bugs",
        system_prompt: "You implement features and fix bugs. Read the surrounding code \
             first, keep changes minimal and consistent with the existing style, and state \
             exactly which files you changed.",
        tool_allowlist: &[WILDCARD],
        read_only: false,
    },
    AgentTypeSpec {
        kind: AgentKind::Plan,
        description: "Design implementation strategies without making changes",
        system_prompt: "You design implementation plans. Study the code, weigh the \
             alternatives, and produce a concrete step-by-step plan. You never modify anything.",
        tool_allowlist: &["bash", "read_file", "grep", "glob", "list_directory"],
        read_only: true,
    },
    AgentTypeSpec {
        kind: AgentKind::Completion,
        description: "Inline completion at low latency",
        system_prompt: "Complete the given text. Respond with the completion only, no \
             commentary.",
        tool_allowlist: &[],
        read_only: true,
    },
];

/// Look up a type spec by its catalog name.
pub fn lookup(name: &str) -> Option<&'static AgentTypeSpec> {
    let kind = AgentKind::parse(name)?;
    AGENT_TYPES.iter().find(|s| s.kind == kind)
}

/// Read-only is sticky: a task may tighten it but never loosen what the
/// type prescribes.
pub fn effective_read_only(spec: &AgentTypeSpec, task_read_only: bool) -> bool {
    task_read_only || spec.read_only
}

/// Compose the allowed-tool set for one agent, computed once at
/// construction time and passed to the portal as the session manifest.
///
/// - `completion` agents get no tools at all.
/// - A wildcard allowlist grants every session tool, filtered down to
///   [`READ_ONLY_TOOLS`] when read-only is in effect.
/// - An explicit allowlist is intersected with the session tools, and with
///   [`READ_ONLY_TOOLS`] when read-only is in effect.
pub fn compose_allowed_tools(
    spec: &AgentTypeSpec,
    effective_read_only: bool,
    session_tools: &[String],
) -> Vec<String> {
    if spec.kind == AgentKind::Completion {
        return Vec::new();
    }
    let wildcard = spec.tool_allowlist.contains(&WILDCARD);
    session_tools
        .iter()
        .filter(|name| wildcard || spec.tool_allowlist.contains(&name.as_str()))
        .filter(|name| !effective_read_only || READ_ONLY_TOOLS.contains(&name.as_str()))
        .cloned()
        .collect()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
