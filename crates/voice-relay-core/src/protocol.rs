//! Wire protocols for the call channel and the tunnel (observer) channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::now_millis;

/// Event received on a call connection from the telephony gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallEvent {
    /// Call metadata, sent once when the gateway opens the stream.
    #[serde(rename_all = "camelCase")]
    Setup {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        call_sid: Option<String>,
        #[serde(default)]
        from: Option<String>,
        #[serde(default)]
        to: Option<String>,
        #[serde(default)]
        direction: Option<String>,
    },
    /// A caller utterance, transcribed to text.
    #[serde(rename_all = "camelCase")]
    Prompt { voice_prompt: String },
    /// A keypad digit.
    Dtmf { digit: String },
    /// The caller spoke over the assistant's reply.
    #[serde(rename_all = "camelCase")]
    Interrupt { utterance_until_interrupt: String },
    /// Anything the gateway sends that this server does not handle.
    #[serde(other)]
    Unknown,
}

/// Frame sent back on a call connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallReply {
    /// Assistant text for the gateway to speak.
    Text { token: String, last: bool },
}

impl CallReply {
    /// A complete (non-streamed) text reply.
    #[must_use]
    pub fn text(token: impl Into<String>) -> Self {
        Self::Text {
            token: token.into(),
            last: true,
        }
    }
}

/// Event mirrored to a tunnel connection.
///
/// Every variant is serialized as `{type, timestamp, ...fields}`; the
/// timestamp is injected by [`TunnelEvent::to_frame`] at send time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TunnelEvent {
    /// Acknowledges a freshly registered tunnel.
    TunnelConnected,
    /// Call metadata captured from the `setup` event.
    CallSetup {
        call_sid: Option<String>,
        from: Option<String>,
        to: Option<String>,
        direction: Option<String>,
    },
    /// The caller said something.
    UserSpoke { text: String },
    /// Token accounting for one model invocation.
    TokenUsage {
        prompt_tokens: u32,
        completion_tokens: u32,
        total_tokens: u32,
        estimated_cost: f64,
    },
    /// The model requested a tool invocation.
    ToolCallStart {
        name: String,
        arguments: Value,
        call_id: String,
    },
    /// A tool invocation finished.
    ToolCallResult {
        name: String,
        result: Value,
        call_id: String,
    },
    /// Final assistant answer for the current turn.
    AiResponse { text: String, after_tool_calls: bool },
    /// A keypad digit was pressed.
    DtmfPressed { digit: String },
    /// The caller interrupted the assistant.
    Interrupted { utterance: String },
    /// The call connection closed.
    CallEnded {
        duration_ms: u64,
        call_sid: Option<String>,
        from: Option<String>,
        to: Option<String>,
    },
    /// Request for the tunnel to supply the tenant's secret.
    CredentialRequest {
        #[serde(rename = "requestId")]
        request_id: String,
    },
    /// Something went wrong; the call keeps going.
    Error { message: String },
}

impl TunnelEvent {
    /// Serialize to a wire frame with the timestamp injected.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let Some(obj) = value.as_object_mut() {
            obj.insert("timestamp".to_string(), now_millis().into());
        }
        serde_json::to_string(&value)
    }
}

/// Message received on a tunnel connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TunnelInbound {
    /// Answer to a pending [`TunnelEvent::CredentialRequest`].
    CredentialResponse {
        #[serde(rename = "requestId")]
        request_id: String,
        secret: String,
    },
    /// Acknowledgements and other chatter the relay ignores.
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_event_parses_camel_case() {
        let raw = r#"{"type":"setup","sessionId":"VX1","callSid":"CA1","from":"+15550100","to":"+15550200","direction":"inbound"}"#;
        let event: CallEvent = serde_json::from_str(raw).unwrap();
        match event {
            CallEvent::Setup {
                session_id,
                call_sid,
                from,
                ..
            } => {
                assert_eq!(session_id.as_deref(), Some("VX1"));
                assert_eq!(call_sid.as_deref(), Some("CA1"));
                assert_eq!(from.as_deref(), Some("+15550100"));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_prompt_event_parses() {
        let raw = r#"{"type":"prompt","voicePrompt":"What's the weather?"}"#;
        let event: CallEvent = serde_json::from_str(raw).unwrap();
        match event {
            CallEvent::Prompt { voice_prompt } => {
                assert_eq!(voice_prompt, "What's the weather?");
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_event_type_tolerated() {
        let raw = r#"{"type":"ping"}"#;
        let event: CallEvent = serde_json::from_str(raw).unwrap();
        assert!(matches!(event, CallEvent::Unknown));
    }

    #[test]
    fn test_text_reply_wire_shape() {
        let json = serde_json::to_string(&CallReply::text("Hello there")).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "text");
        assert_eq!(value["token"], "Hello there");
        assert_eq!(value["last"], true);
    }

    #[test]
    fn test_tunnel_frame_has_type_and_timestamp() {
        let frame = TunnelEvent::UserSpoke {
            text: "hi".to_string(),
        }
        .to_frame()
        .unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "user_spoke");
        assert_eq!(value["text"], "hi");
        assert!(value["timestamp"].as_u64().unwrap() > 0);
    }

    #[test]
    fn test_credential_request_uses_camel_case_id() {
        let frame = TunnelEvent::CredentialRequest {
            request_id: "172-abc".to_string(),
        }
        .to_frame()
        .unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "credential_request");
        assert_eq!(value["requestId"], "172-abc");
    }

    #[test]
    fn test_credential_response_parses() {
        let raw = r#"{"type":"credential_response","requestId":"172-abc","secret":"sk-test"}"#;
        let msg: TunnelInbound = serde_json::from_str(raw).unwrap();
        match msg {
            TunnelInbound::CredentialResponse { request_id, secret } => {
                assert_eq!(request_id, "172-abc");
                assert_eq!(secret, "sk-test");
            }
            TunnelInbound::Unknown => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_tunnel_ack_is_unknown() {
        let raw = r#"{"type":"ack"}"#;
        let msg: TunnelInbound = serde_json::from_str(raw).unwrap();
        assert!(matches!(msg, TunnelInbound::Unknown));
    }
}
