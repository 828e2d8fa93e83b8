// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use tokio_util::sync::CancellationToken;

use crate::{ExecutionSettings, Frame, Message, ToolSchema};

pub type FrameStream = Pin<Box<dyn Stream<Item = anyhow::Result<Frame>> + Send>>;

/// Everything a portal needs to bind a session for one agent.
#[derive(Debug, Clone)]
pub struct SessionSpec {
    pub model_id: String,
    pub system_prompt: String,
    /// The tool manifest advertised to the model.  The portal honours this
    /// manifest; capability enforcement happens once at session creation,
    /// not per call.
    pub allowed_tools: Vec<ToolSchema>,
    pub settings: ExecutionSettings,
}

/// The bound state a portal associates with one agent: model id, system
/// prompt and tool manifest.  Opaque to the orchestration core, which only
/// stores it in the agent registry and hands it back on every invocation
/// (including resumptions).
#[derive(Debug, Clone)]
pub struct AgentBinding {
    pub model_id: String,
    pub system_prompt: String,
    pub allowed_tools: Vec<ToolSchema>,
    pub settings: ExecutionSettings,
}

impl AgentBinding {
    /// Names of the tools in this binding's manifest, in manifest order.
    pub fn allowed_tool_names(&self) -> Vec<String> {
        self.allowed_tools.iter().map(|t| t.name.clone()).collect()
    }
}

/// Port to a chat-completion backend.
///
/// Implementations send a message list and stream back frames carrying
/// assistant content and tool-call requests.  Cancellation is cooperative:
/// `invoke` must observe the token both before sending and while the
/// response is in flight.
#[async_trait]
pub trait ModelPortal: Send + Sync {
    /// Stable provider name for status display and routing.
    fn name(&self) -> &str;

    /// Bind a session for one agent.
    async fn create_session(&self, spec: SessionSpec) -> anyhow::Result<AgentBinding>;

    /// Send the history and stream back response frames.
    async fn invoke(
        &self,
        binding: &AgentBinding,
        history: &[Message],
        cancel: &CancellationToken,
    ) -> anyhow::Result<FrameStream>;
}
