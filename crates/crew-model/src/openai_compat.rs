// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Shared adapter for OpenAI-compatible chat completion APIs.
//!
//! Every configured provider (DeepSeek, Zhipu, and any custom gateway)
//! speaks the same `/chat/completions` wire format with
//! `Authorization: Bearer <key>` auth, so a single portal type covers them
//! all.  The adapter issues aggregated (non-streaming) requests and yields
//! the response as a single [`Frame`]; the port surface is a stream, so a
//! delta-streaming adapter can replace this one without touching the core.

use anyhow::{bail, Context};
use async_trait::async_trait;
use futures::stream;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crew_config::ProviderConfig;

use crate::portal::{AgentBinding, FrameStream, ModelPortal, SessionSpec};
use crate::{FinishReason, Frame, Message, MessageContent, Role, ToolCallRequest};

/// OpenAI-compatible chat completion portal.
pub struct OpenAiCompatPortal {
    /// Provider id returned by `ModelPortal::name()`.
    provider_name: String,
    /// Full chat completions URL, e.g. `https://api.deepseek.com/v1/chat/completions`.
    chat_url: String,
    /// API key (pre-resolved from config or env).
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatPortal {
    /// Construct from an API base that ends before `/chat/completions`.
    pub fn new(
        provider_name: impl Into<String>,
        base_url: &str,
        api_key: Option<String>,
    ) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            provider_name: provider_name.into(),
            chat_url: format!("{base}/chat/completions"),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    /// Construct from a named provider config, applying the built-in
    /// endpoint defaults for known provider names.
    pub fn from_config(name: &str, cfg: &ProviderConfig) -> anyhow::Result<Self> {
        let base_url = cfg
            .resolved_base_url(name)
            .with_context(|| format!("provider '{name}' has no base_url and no built-in default"))?;
        Ok(Self::new(name, &base_url, cfg.resolve_api_key()))
    }
}

#[async_trait]
impl ModelPortal for OpenAiCompatPortal {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn create_session(&self, spec: SessionSpec) -> anyhow::Result<AgentBinding> {
        if spec.model_id.is_empty() {
            bail!("provider '{}': empty model id", self.provider_name);
        }
        Ok(AgentBinding {
            model_id: spec.model_id,
            system_prompt: spec.system_prompt,
            allowed_tools: spec.allowed_tools,
            settings: spec.settings,
        })
    }

    async fn invoke(
        &self,
        binding: &AgentBinding,
        history: &[Message],
        cancel: &CancellationToken,
    ) -> anyhow::Result<FrameStream> {
        let messages = build_wire_messages(history);
        let message_count = messages.len();

        let mut body = json!({
            "model": binding.model_id,
            "messages": messages,
        });
        if let Some(t) = binding.settings.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(p) = binding.settings.top_p {
            body["top_p"] = json!(p);
        }
        if let Some(m) = binding.settings.max_tokens {
            body["max_tokens"] = json!(m);
        }
        if binding.settings.tools_enabled && !binding.allowed_tools.is_empty() {
            let tools: Vec<Value> = binding
                .allowed_tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = json!(tools);
            body["tool_choice"] = json!("auto");
        }

        debug!(
            provider = %self.provider_name,
            model = %binding.model_id,
            message_count,
            tool_count = binding.allowed_tools.len(),
            "sending completion request"
        );

        let key = self
            .api_key
            .as_deref()
            .context("API key not set; provide api_key or api_key_env in config")?;
        let request = self.client.post(&self.chat_url).json(&body).bearer_auth(key);

        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => bail!("cancelled"),
            resp = request.send() => {
                resp.with_context(|| format!("{} request failed", self.provider_name))?
            }
        };

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("{} error {status}: {text}", self.provider_name);
        }

        let payload: Value = tokio::select! {
            biased;
            _ = cancel.cancelled() => bail!("cancelled"),
            body = resp.json() => {
                body.with_context(|| format!("{} response body", self.provider_name))?
            }
        };

        let frames: Vec<anyhow::Result<Frame>> = vec![Ok(parse_completion(&payload)?)];
        Ok(Box::pin(stream::iter(frames)))
    }
}

/// Serialize history into the OpenAI wire format.  Consecutive assistant
/// tool-call messages are merged into one wire message so the request
/// satisfies the parallel-tool-call contract.
fn build_wire_messages(messages: &[Message]) -> Vec<Value> {
    fn tool_call_to_json(tool_call_id: &str, function: &crate::FunctionCall) -> Value {
        json!({
            "id": tool_call_id,
            "type": "function",
            "function": {
                "name": function.name,
                "arguments": function.arguments,
            }
        })
    }

    let mut result: Vec<Value> = Vec::with_capacity(messages.len());
    let mut i = 0;

    while i < messages.len() {
        let m = &messages[i];

        if let MessageContent::ToolCall {
            tool_call_id,
            function,
        } = &m.content
        {
            let mut calls = vec![tool_call_to_json(tool_call_id, function)];
            i += 1;
            while i < messages.len() {
                if let MessageContent::ToolCall {
                    tool_call_id,
                    function,
                } = &messages[i].content
                {
                    calls.push(tool_call_to_json(tool_call_id, function));
                    i += 1;
                } else {
                    break;
                }
            }
            result.push(json!({ "role": "assistant", "tool_calls": calls }));
            continue;
        }

        let v = match &m.content {
            MessageContent::Text(t) => json!({
                "role": role_str(&m.role),
                "content": t,
            }),
            MessageContent::ToolResult {
                tool_call_id,
                content,
            } => json!({
                "role": "tool",
                "tool_call_id": tool_call_id,
                "content": content,
            }),
            MessageContent::ToolCall { .. } => unreachable!("handled above"),
        };
        result.push(v);
        i += 1;
    }

    result
}

fn role_str(r: &Role) -> &'static str {
    match r {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

/// Parse a non-streaming chat completion response into a single frame.
fn parse_completion(v: &Value) -> anyhow::Result<Frame> {
    let choice = &v["choices"][0];
    if choice.is_null() {
        bail!("completion response carried no choices: {v}");
    }
    let message = &choice["message"];

    let content = message["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let mut tool_calls = Vec::new();
    if let Some(calls) = message["tool_calls"].as_array() {
        for tc in calls {
            let name = tc["function"]["name"].as_str().unwrap_or("").to_string();
            if name.is_empty() {
                // Cannot dispatch a nameless call; dropping it keeps the
                // conversation history consistent for the next round.
                debug!("dropping tool call with empty name from model");
                continue;
            }
            let id = tc["id"].as_str().unwrap_or("").to_string();
            let raw_args = tc["function"]["arguments"].as_str().unwrap_or("{}");
            let arguments: Value = serde_json::from_str(raw_args)
                .unwrap_or_else(|_| Value::Object(Default::default()));
            tool_calls.push(ToolCallRequest {
                id,
                name,
                arguments,
            });
        }
    }

    let finish = match choice["finish_reason"].as_str() {
        Some("tool_calls") => Some(FinishReason::ToolCalls),
        Some("length") => Some(FinishReason::Length),
        Some(_) => Some(FinishReason::Stop),
        None => None,
    };

    Ok(Frame {
        content,
        tool_calls,
        finish,
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Wire serialization ────────────────────────────────────────────────────

    #[test]
    fn text_messages_serialise_with_roles() {
        let msgs = vec![Message::system("sys"), Message::user("hi")];
        let wire = build_wire_messages(&msgs);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[0]["content"], "sys");
        assert_eq!(wire[1]["role"], "user");
    }

    #[test]
    fn consecutive_tool_calls_merge_into_one_assistant_message() {
        let msgs = vec![
            Message::tool_call("a", "grep", "{}"),
            Message::tool_call("b", "glob", "{}"),
            Message::tool_result("a", "out-a"),
        ];
        let wire = build_wire_messages(&msgs);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0]["role"], "assistant");
        assert_eq!(wire[0]["tool_calls"].as_array().unwrap().len(), 2);
        assert_eq!(wire[1]["role"], "tool");
        assert_eq!(wire[1]["tool_call_id"], "a");
    }

    // ── Response parsing ──────────────────────────────────────────────────────

    #[test]
    fn parse_text_completion() {
        let v = json!({
            "choices": [{
                "message": { "content": "hello" },
                "finish_reason": "stop"
            }]
        });
        let f = parse_completion(&v).unwrap();
        assert_eq!(f.content.as_deref(), Some("hello"));
        assert!(f.tool_calls.is_empty());
        assert_eq!(f.finish, Some(FinishReason::Stop));
    }

    #[test]
    fn parse_tool_call_completion() {
        let v = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "tc-1",
                        "type": "function",
                        "function": { "name": "bash", "arguments": "{\"command\":\"ls\"}" }
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        });
        let f = parse_completion(&v).unwrap();
        assert!(f.content.is_none());
        assert_eq!(f.tool_calls.len(), 1);
        assert_eq!(f.tool_calls[0].name, "bash");
        assert_eq!(f.tool_calls[0].arguments["command"], "ls");
        assert_eq!(f.finish, Some(FinishReason::ToolCalls));
    }

    #[test]
    fn parse_drops_nameless_tool_calls() {
        let v = json!({
            "choices": [{
                "message": {
                    "tool_calls": [{ "id": "x", "function": { "arguments": "{}" } }]
                },
                "finish_reason": "tool_calls"
            }]
        });
        let f = parse_completion(&v).unwrap();
        assert!(f.tool_calls.is_empty());
    }

    #[test]
    fn parse_invalid_arguments_substitute_empty_object() {
        let v = json!({
            "choices": [{
                "message": {
                    "tool_calls": [{
                        "id": "x",
                        "function": { "name": "grep", "arguments": "{not json" }
                    }]
                }
            }]
        });
        let f = parse_completion(&v).unwrap();
        assert!(f.tool_calls[0].arguments.is_object());
    }

    #[test]
    fn parse_rejects_choiceless_response() {
        assert!(parse_completion(&json!({"choices": []})).is_err());
    }

    // ── Construction ──────────────────────────────────────────────────────────

    #[test]
    fn from_config_uses_builtin_defaults_for_known_names() {
        let portal =
            OpenAiCompatPortal::from_config("deepseek", &ProviderConfig::default()).unwrap();
        assert_eq!(
            portal.chat_url,
            "https://api.deepseek.com/v1/chat/completions"
        );
    }

    #[test]
    fn from_config_requires_base_url_for_unknown_names() {
        assert!(OpenAiCompatPortal::from_config("custom", &ProviderConfig::default()).is_err());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let portal = OpenAiCompatPortal::new("x", "http://localhost:1234/v1/", None);
        assert_eq!(portal.chat_url, "http://localhost:1234/v1/chat/completions");
    }
}
