// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
use tokio_util::sync::CancellationToken;

use crate::portal::{AgentBinding, FrameStream, ModelPortal, SessionSpec};
use crate::{FinishReason, Frame, Message, Role};

/// Deterministic mock portal for tests.  Echoes the last user message back
/// as the assistant response.
#[derive(Default)]
pub struct MockPortal;

#[async_trait]
impl ModelPortal for MockPortal {
    fn name(&self) -> &str {
        "mock"
    }

    async fn create_session(&self, spec: SessionSpec) -> anyhow::Result<AgentBinding> {
        Ok(AgentBinding {
            model_id: spec.model_id,
            system_prompt: spec.system_prompt,
            allowed_tools: spec.allowed_tools,
            settings: spec.settings,
        })
    }

    async fn invoke(
        &self,
        _binding: &AgentBinding,
        history: &[Message],
        _cancel: &CancellationToken,
    ) -> anyhow::Result<FrameStream> {
        let reply = history
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .and_then(|m| m.as_text())
            .unwrap_or("[no input]")
            .to_string();

        let frames: Vec<anyhow::Result<Frame>> = vec![
            Ok(Frame::text(format!("MOCK: {reply}"))),
            Ok(Frame::finished(FinishReason::Stop)),
        ];
        Ok(Box::pin(stream::iter(frames)))
    }
}

/// A pre-scripted mock portal.  Each call to `invoke` pops the next frame
/// script from the front of the queue and records the history it was sent.
/// This lets tests specify exact frame sequences, including tool calls,
/// without network access.
pub struct ScriptedPortal {
    scripts: Mutex<Vec<Vec<Frame>>>,
    /// Every history snapshot seen by this portal, in call order.
    histories: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedPortal {
    /// Build a portal from a list of frame scripts.  The outer `Vec` is the
    /// ordered list of calls; the inner `Vec` is the frame sequence emitted
    /// for that call.
    pub fn new(scripts: Vec<Vec<Frame>>) -> Self {
        Self {
            scripts: Mutex::new(scripts),
            histories: Mutex::new(Vec::new()),
        }
    }

    /// Convenience: portal that always returns a single text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        let r = reply.into();
        Self::new(vec![vec![
            Frame::text(r),
            Frame::finished(FinishReason::Stop),
        ]])
    }

    /// Convenience: portal that returns the given replies in call order.
    pub fn text_sequence(replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let scripts = replies
            .into_iter()
            .map(|r| vec![Frame::text(r), Frame::finished(FinishReason::Stop)])
            .collect();
        Self::new(scripts)
    }

    /// Convenience: portal that returns a tool call followed by a text reply.
    pub fn tool_then_text(
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: serde_json::Value,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            // Round 1 – model emits a tool call
            vec![
                Frame::tool_call(tool_id, tool_name, args),
                Frame::finished(FinishReason::ToolCalls),
            ],
            // Round 2 – model responds after the tool result
            vec![
                Frame::text(final_text),
                Frame::finished(FinishReason::Stop),
            ],
        ])
    }

    /// Shared handle, typed for injection into a router.
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// All history snapshots seen so far, in call order.
    pub fn histories(&self) -> Vec<Vec<Message>> {
        self.histories.lock().unwrap().clone()
    }

    /// The most recent history snapshot.
    pub fn last_history(&self) -> Option<Vec<Message>> {
        self.histories.lock().unwrap().last().cloned()
    }

    /// Number of invocations served.
    pub fn call_count(&self) -> usize {
        self.histories.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelPortal for ScriptedPortal {
    fn name(&self) -> &str {
        "scripted-mock"
    }

    async fn create_session(&self, spec: SessionSpec) -> anyhow::Result<AgentBinding> {
        Ok(AgentBinding {
            model_id: spec.model_id,
            system_prompt: spec.system_prompt,
            allowed_tools: spec.allowed_tools,
            settings: spec.settings,
        })
    }

    async fn invoke(
        &self,
        _binding: &AgentBinding,
        history: &[Message],
        _cancel: &CancellationToken,
    ) -> anyhow::Result<FrameStream> {
        self.histories.lock().unwrap().push(history.to_vec());
        let frames = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                // Default fallback when all scripts are consumed
                vec![
                    Frame::text("[no more scripts]"),
                    Frame::finished(FinishReason::Stop),
                ]
            } else {
                scripts.remove(0)
            }
        };
        let wrapped: Vec<anyhow::Result<Frame>> = frames.into_iter().map(Ok).collect();
        Ok(Box::pin(stream::iter(wrapped)))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::ExecutionSettings;

    fn binding() -> AgentBinding {
        AgentBinding {
            model_id: "mock-model".into(),
            system_prompt: String::new(),
            allowed_tools: vec![],
            settings: ExecutionSettings::default(),
        }
    }

    async fn drain(mut s: FrameStream) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(f) = s.next().await {
            frames.push(f.unwrap());
        }
        frames
    }

    #[tokio::test]
    async fn mock_echoes_last_user_message() {
        let p = MockPortal;
        let cancel = CancellationToken::new();
        let frames = drain(
            p.invoke(&binding(), &[Message::user("hi")], &cancel)
                .await
                .unwrap(),
        )
        .await;
        assert!(frames[0].content.as_deref().unwrap().contains("MOCK: hi"));
        assert_eq!(frames.last().unwrap().finish, Some(FinishReason::Stop));
    }

    #[tokio::test]
    async fn scripted_single_text_reply() {
        let p = ScriptedPortal::always_text("hello world");
        let cancel = CancellationToken::new();
        let frames = drain(
            p.invoke(&binding(), &[Message::user("x")], &cancel)
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(frames[0].content.as_deref(), Some("hello world"));
    }

    #[tokio::test]
    async fn scripted_tool_then_text_two_rounds() {
        let p = ScriptedPortal::tool_then_text(
            "call-1",
            "bash",
            serde_json::json!({"command": "ls"}),
            "done",
        );
        let cancel = CancellationToken::new();

        let frames = drain(
            p.invoke(&binding(), &[Message::user("go")], &cancel)
                .await
                .unwrap(),
        )
        .await;
        assert!(frames.iter().any(|f| f
            .tool_calls
            .iter()
            .any(|tc| tc.name == "bash")));

        let frames2 = drain(
            p.invoke(&binding(), &[Message::user("go")], &cancel)
                .await
                .unwrap(),
        )
        .await;
        assert!(frames2
            .iter()
            .any(|f| f.content.as_deref() == Some("done")));
    }

    #[tokio::test]
    async fn scripted_records_history_snapshots() {
        let p = ScriptedPortal::text_sequence(["a", "b"]);
        let cancel = CancellationToken::new();
        let _ = p.invoke(&binding(), &[Message::user("one")], &cancel).await;
        let _ = p
            .invoke(
                &binding(),
                &[Message::user("one"), Message::user("two")],
                &cancel,
            )
            .await;
        assert_eq!(p.call_count(), 2);
        assert_eq!(p.last_history().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn scripted_fallback_when_scripts_exhausted() {
        let p = ScriptedPortal::new(vec![]);
        let cancel = CancellationToken::new();
        let frames = drain(
            p.invoke(&binding(), &[Message::user("x")], &cancel)
                .await
                .unwrap(),
        )
        .await;
        assert!(frames[0]
            .content
            .as_deref()
            .unwrap()
            .contains("no more scripts"));
    }
}
