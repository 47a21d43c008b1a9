//! Per-call session state and conversation history.

use serde::{Deserialize, Serialize};

use crate::now_millis;
use crate::protocol::CallEvent;

/// Role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model, in OpenAI wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlation id the tool-result turn must echo back.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ToolCallFunction,
}

/// Function name and raw JSON arguments of a tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    /// Arguments as a JSON-encoded string, exactly as the model produced them.
    pub arguments: String,
}

/// One message in conversation history.
///
/// Serializes in the chat-completions message shape, so the history can be
/// sent to the model verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Turn {
    /// A plain text turn with no tool data.
    #[must_use]
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// An assistant turn carrying tool invocations.
    #[must_use]
    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    /// A tool-result turn correlated to one invocation.
    #[must_use]
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// Call metadata, populated incrementally as events arrive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallInfo {
    pub call_sid: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub direction: Option<String>,
    /// Gateway's own stream/session identifier.
    pub provider_session_id: Option<String>,
    /// Unix millis at which the call connection was accepted.
    pub started_at: u64,
}

/// Mutable state for one active call connection.
///
/// Created when a call connection is accepted, mutated only by the engine
/// processing that connection's events, and dropped when it closes. Nothing
/// here survives the call.
#[derive(Debug)]
pub struct SessionState {
    pub token: String,
    /// Append-only; insertion order is the literal prompt context.
    pub history: Vec<Turn>,
    pub call: CallInfo,
    /// The credential actually used, resolved once and cached.
    pub resolved_api_key: Option<String>,
}

impl SessionState {
    /// Create state for a freshly accepted call connection.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            history: Vec::new(),
            call: CallInfo {
                started_at: now_millis(),
                ..CallInfo::default()
            },
            resolved_api_key: None,
        }
    }

    /// Record metadata from a `setup` event. Fields are only ever added.
    pub fn record_setup(&mut self, event: &CallEvent) {
        if let CallEvent::Setup {
            session_id,
            call_sid,
            from,
            to,
            direction,
        } = event
        {
            self.call.provider_session_id = session_id.clone();
            self.call.call_sid = call_sid.clone();
            self.call.from = from.clone();
            self.call.to = to.clone();
            self.call.direction = direction.clone();
        }
    }

    /// Milliseconds elapsed since the call connection was accepted.
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        now_millis().saturating_sub(self.call.started_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_setup_populates_metadata() {
        let mut state = SessionState::new("abc123");
        let event: CallEvent = serde_json::from_str(
            r#"{"type":"setup","sessionId":"VX1","callSid":"CA1","from":"+1555","to":"+1666","direction":"inbound"}"#,
        )
        .unwrap();
        state.record_setup(&event);
        assert_eq!(state.call.call_sid.as_deref(), Some("CA1"));
        assert_eq!(state.call.provider_session_id.as_deref(), Some("VX1"));
        assert_eq!(state.call.direction.as_deref(), Some("inbound"));
    }

    #[test]
    fn test_non_setup_event_leaves_metadata_alone() {
        let mut state = SessionState::new("abc123");
        state.record_setup(&CallEvent::Dtmf {
            digit: "1".to_string(),
        });
        assert!(state.call.call_sid.is_none());
    }

    #[test]
    fn test_turn_serializes_like_chat_message() {
        let turn = Turn::text(Role::User, "hello");
        let value = serde_json::to_value(&turn).unwrap();
        assert_eq!(value["role"], "user");
        assert_eq!(value["content"], "hello");
        assert!(value.get("tool_calls").is_none());
    }

    #[test]
    fn test_tool_result_turn_carries_correlation_id() {
        let turn = Turn::tool_result("call_1", "{\"ok\":true}");
        let value = serde_json::to_value(&turn).unwrap();
        assert_eq!(value["role"], "tool");
        assert_eq!(value["tool_call_id"], "call_1");
    }
}
