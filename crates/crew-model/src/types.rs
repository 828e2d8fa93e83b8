use serde::{Deserialize, Serialize};

// ─── Message types ────────────────────────────────────────────────────────────

/// A single message in an agent's conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::ToolCall {
                tool_call_id: id.into(),
                function: FunctionCall {
                    name: name.into(),
                    arguments: arguments.into(),
                },
            },
        }
    }

    pub fn tool_result(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::ToolResult {
                tool_call_id: id.into(),
                content: content.into(),
            },
        }
    }

    /// Return the plain text of this message, if it is a text message.
    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(t) => Some(t),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// The content of a message.
///
/// - `Text` – simple string (most messages)
/// - `ToolCall` – the assistant requests a tool invocation
/// - `ToolResult` – the result of a tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    ToolCall {
        tool_call_id: String,
        function: FunctionCall,
    },
    ToolResult {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object
    pub arguments: String,
}

/// A tool schema provided to the model as part of a session's manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object
    pub parameters: serde_json::Value,
}

// ─── Response frames ──────────────────────────────────────────────────────────

/// One tool invocation requested by the model within a frame.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments
    pub arguments: serde_json::Value,
}

/// Why the model stopped producing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// Normal end of message
    Stop,
    /// The model wants its tool calls executed before continuing
    ToolCalls,
    /// Output-token limit reached
    Length,
}

/// A single frame streamed back from a model invocation.
///
/// Frames may carry assistant text, tool-call requests, a finish reason, or
/// any combination.  Aggregating adapters emit one frame per response;
/// streaming adapters may emit many.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
    pub finish: Option<FinishReason>,
}

impl Frame {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            tool_calls: vec![ToolCallRequest {
                id: id.into(),
                name: name.into(),
                arguments,
            }],
            ..Default::default()
        }
    }

    pub fn finished(reason: FinishReason) -> Self {
        Self {
            finish: Some(reason),
            ..Default::default()
        }
    }
}

// ─── Execution settings ───────────────────────────────────────────────────────

/// Sampling and tool-choice settings bound to one agent session.
#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    /// When false, no tool manifest is sent and tool choice is forced off.
    pub tools_enabled: bool,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            temperature: None,
            top_p: None,
            max_tokens: None,
            tools_enabled: true,
        }
    }
}

impl ExecutionSettings {
    /// Low-latency, deterministic-ish settings for inline completion agents.
    pub fn completion() -> Self {
        Self {
            temperature: Some(0.0),
            top_p: Some(0.95),
            max_tokens: Some(200),
            tools_enabled: false,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors_set_roles() {
        assert_eq!(Message::system("s").role, Role::System);
        assert_eq!(Message::user("u").role, Role::User);
        assert_eq!(Message::assistant("a").role, Role::Assistant);
        assert_eq!(Message::tool_result("id", "r").role, Role::Tool);
    }

    #[test]
    fn as_text_returns_text_content_only() {
        assert_eq!(Message::user("hello").as_text(), Some("hello"));
        assert!(Message::tool_result("id", "out").as_text().is_none());
        assert!(Message::tool_call("id", "f", "{}").as_text().is_none());
    }

    #[test]
    fn tool_call_message_carries_function() {
        let m = Message::tool_call("tc-1", "grep", r#"{"pattern":"x"}"#);
        match &m.content {
            MessageContent::ToolCall {
                tool_call_id,
                function,
            } => {
                assert_eq!(tool_call_id, "tc-1");
                assert_eq!(function.name, "grep");
            }
            _ => panic!("wrong content variant"),
        }
    }

    #[test]
    fn message_serialises_and_deserialises() {
        let original = Message::user("test payload");
        let json = serde_json::to_string(&original).unwrap();
        let decoded: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.role, Role::User);
        assert_eq!(decoded.as_text(), Some("test payload"));
    }

    #[test]
    fn frame_text_helper() {
        let f = Frame::text("hi");
        assert_eq!(f.content.as_deref(), Some("hi"));
        assert!(f.tool_calls.is_empty());
        assert!(f.finish.is_none());
    }

    #[test]
    fn frame_tool_call_helper() {
        let f = Frame::tool_call("id", "bash", serde_json::json!({"command": "ls"}));
        assert_eq!(f.tool_calls.len(), 1);
        assert_eq!(f.tool_calls[0].name, "bash");
    }

    #[test]
    fn completion_settings_disable_tools() {
        let s = ExecutionSettings::completion();
        assert_eq!(s.temperature, Some(0.0));
        assert_eq!(s.top_p, Some(0.95));
        assert_eq!(s.max_tokens, Some(200));
        assert!(!s.tools_enabled);
    }

    #[test]
    fn default_settings_enable_tools() {
        assert!(ExecutionSettings::default().tools_enabled);
    }
}
