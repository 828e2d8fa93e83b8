// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::{Tool, ToolCall, ToolOutput};

/// A tool schema as advertised to the model.  Mirrors the model crate's
/// schema type but keeps the tools crate independent from it.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Central registry holding all tools available in a session.
///
/// Per-agent capability restriction is expressed with [`ToolRegistry::scoped`]:
/// the runner computes an allowlist once at agent construction and executes
/// every call through the scoped view, so a model-emitted call to a tool
/// outside its manifest fails as unknown-in-session.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Produce schemas for all registered tools, sorted by name.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Sorted names of all registered tools.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// A filtered view containing only the named tools, sharing the same
    /// tool instances.  Names that are not registered are skipped.
    pub fn scoped(&self, allowlist: &[String]) -> ToolRegistry {
        let tools = allowlist
            .iter()
            .filter_map(|name| {
                self.tools
                    .get(name)
                    .map(|t| (name.clone(), Arc::clone(t)))
            })
            .collect();
        ToolRegistry { tools }
    }

    pub async fn execute(&self, call: &ToolCall) -> ToolOutput {
        debug!(tool = %call.name, call_id = %call.id, "dispatching tool call");
        match self.tools.get(&call.name) {
            Some(tool) => tool.execute(call).await,
            None => ToolOutput::err(&call.id, format!("unknown tool: {}", call.name)),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
