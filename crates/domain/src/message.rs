use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool invocation requested by the model.
///
/// The `id` is minted by the provider (or synthesized by adapters whose
/// vendor does not supply one) and is stable within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Open-shape argument map as produced by the model.
    pub arguments: Value,
}

/// The answer to a [`ToolCall`], serialized as JSON text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub content: String,
}

impl ToolResult {
    pub fn new(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { tool_call_id: tool_call_id.into(), content: content.into() }
    }

    /// Wrap this result into the tool-role message appended to history.
    pub fn into_message(self) -> Message {
        Message {
            role: Role::Tool,
            content: self.content,
            tool_calls: Vec::new(),
            tool_call_id: Some(self.tool_call_id),
            timestamp: Utc::now(),
        }
    }
}

/// Tool definition surfaced to the model. Registered once at startup;
/// `parameters` is a JSON-Schema-shaped descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A message in the conversation (provider-agnostic). Immutable once
/// appended to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    /// Textual content. May be empty for assistant turns that only
    /// request tools.
    #[serde(default)]
    pub content: String,
    /// Present only on assistant messages, in the order the model
    /// emitted them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Present only on tool messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

// ── Convenience constructors ───────────────────────────────────────

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self::plain(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::plain(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, text)
    }

    pub fn assistant_with_tools(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            tool_calls,
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    fn plain(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: text.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Whether this assistant message requests tool execution.
    pub fn requests_tools(&self) -> bool {
        self.role == Role::Assistant && !self.tool_calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_roles() {
        assert_eq!(Message::system("s").role, Role::System);
        assert_eq!(Message::user("u").role, Role::User);
        assert_eq!(Message::assistant("a").role, Role::Assistant);

        let tool_msg = ToolResult::new("call_1", "{\"ok\":true}").into_message();
        assert_eq!(tool_msg.role, Role::Tool);
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn requests_tools_only_for_assistant_with_calls() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "get_current_time".into(),
            arguments: serde_json::json!({}),
        };
        assert!(Message::assistant_with_tools("", vec![call]).requests_tools());
        assert!(!Message::assistant("plain answer").requests_tools());
        assert!(!Message::user("hello").requests_tools());
    }

    #[test]
    fn message_serializes_compactly() {
        let msg = Message::user("hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        // Empty collections are omitted from the wire shape.
        assert!(json.get("tool_calls").is_none());
        assert!(json.get("tool_call_id").is_none());
    }

    #[test]
    fn message_roundtrips() {
        let call = ToolCall {
            id: "c1".into(),
            name: "get_current_time".into(),
            arguments: serde_json::json!({"timezone": "UTC"}),
        };
        let msg = Message::assistant_with_tools("thinking", vec![call]);
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tool_calls.len(), 1);
        assert_eq!(back.tool_calls[0].name, "get_current_time");
    }
}
