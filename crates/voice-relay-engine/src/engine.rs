//! The per-call conversation relay state machine.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use voice_relay_core::{CallEvent, CallReply, Role, SessionState, TenantConfig, TunnelEvent, Turn};
use voice_relay_tunnel::TunnelRegistry;

use crate::model::{ChatModel, ChatRequest, ModelError, TokenUsage};
use crate::tools::{ToolError, ToolExecutor};

/// Instruction used when the tenant has not set one. Spoken output wants
/// short prose, not enumerations.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful voice assistant on a phone call. \
    Keep your answers short and conversational, one or two sentences. \
    Never use lists, bullet points, or markdown; speak in plain sentences.";

/// Fixed reply when the model or a tool fails; the call never drops.
pub const MODEL_FAILURE_REPLY: &str =
    "I'm sorry, I'm having a little trouble right now. Could you say that again?";

#[derive(Debug, Error)]
enum TurnError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Event-driven engine for one call connection.
///
/// Owns the call's [`SessionState`]; the connection task feeds it events one
/// at a time, so each event is fully processed before the next begins.
pub struct ConversationRelay {
    session: SessionState,
    config: TenantConfig,
    registry: Arc<TunnelRegistry>,
    model: Arc<dyn ChatModel>,
    tools: Arc<dyn ToolExecutor>,
    default_api_key: String,
}

impl ConversationRelay {
    /// Create an engine for a freshly accepted call connection.
    #[must_use]
    pub fn new(
        token: impl Into<String>,
        config: TenantConfig,
        registry: Arc<TunnelRegistry>,
        model: Arc<dyn ChatModel>,
        tools: Arc<dyn ToolExecutor>,
        default_api_key: impl Into<String>,
    ) -> Self {
        Self {
            session: SessionState::new(token),
            config,
            registry,
            model,
            tools,
            default_api_key: default_api_key.into(),
        }
    }

    /// The call's session state (read-only outside the engine).
    #[must_use]
    pub const fn session(&self) -> &SessionState {
        &self.session
    }

    /// Process one inbound call event, returning the frame to send back on
    /// the call connection, if any.
    pub async fn handle_event(&mut self, event: CallEvent) -> Option<CallReply> {
        match event {
            CallEvent::Setup { .. } => {
                self.session.record_setup(&event);
                self.mirror(TunnelEvent::CallSetup {
                    call_sid: self.session.call.call_sid.clone(),
                    from: self.session.call.from.clone(),
                    to: self.session.call.to.clone(),
                    direction: self.session.call.direction.clone(),
                });
                None
            }
            CallEvent::Prompt { voice_prompt } => Some(self.handle_prompt(voice_prompt).await),
            CallEvent::Dtmf { digit } => {
                // Digit-triggered tool dispatch would hook in here.
                self.mirror(TunnelEvent::DtmfPressed { digit });
                None
            }
            CallEvent::Interrupt {
                utterance_until_interrupt,
            } => {
                // The truncated utterance never enters history: the model's
                // context must reflect deliverable text.
                self.mirror(TunnelEvent::Interrupted {
                    utterance: utterance_until_interrupt,
                });
                None
            }
            CallEvent::Unknown => {
                tracing::warn!(
                    "Ignoring unrecognized event type on call {}",
                    self.session.token
                );
                None
            }
        }
    }

    /// The call connection closed; mirror the summary and let state drop.
    pub fn handle_close(&self) {
        self.mirror(TunnelEvent::CallEnded {
            duration_ms: self.session.duration_ms(),
            call_sid: self.session.call.call_sid.clone(),
            from: self.session.call.from.clone(),
            to: self.session.call.to.clone(),
        });
    }

    /// The call connection errored; close handling still fires afterward.
    pub fn handle_transport_error(&self, message: &str) {
        self.mirror(TunnelEvent::Error {
            message: message.to_string(),
        });
    }

    async fn handle_prompt(&mut self, voice_prompt: String) -> CallReply {
        self.session
            .history
            .push(Turn::text(Role::User, voice_prompt.clone()));
        self.mirror(TunnelEvent::UserSpoke { text: voice_prompt });

        let text = match self.resolve_turn().await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("Turn failed for call {}: {e}", self.session.token);
                self.mirror(TunnelEvent::Error {
                    message: e.to_string(),
                });
                MODEL_FAILURE_REPLY.to_string()
            }
        };

        self.session
            .history
            .push(Turn::text(Role::Assistant, text.clone()));
        CallReply::text(text)
    }

    /// One conversational turn: model call, optional one-level-deep tool
    /// round trip, final answer.
    async fn resolve_turn(&mut self) -> Result<String, TurnError> {
        let api_key = self.resolve_api_key().await;

        let response = self
            .model
            .complete(ChatRequest {
                api_key: api_key.clone(),
                messages: self.build_messages(),
                tools: self.config.tools.clone(),
            })
            .await?;
        self.mirror_usage(response.usage);

        if response.tool_calls.is_empty() {
            let text = response.content.unwrap_or_default();
            self.mirror(TunnelEvent::AiResponse {
                text: text.clone(),
                after_tool_calls: false,
            });
            return Ok(text);
        }

        // The model's own tool-invocation turn precedes the results.
        self.session.history.push(Turn::assistant_tool_calls(
            response.content,
            response.tool_calls.clone(),
        ));

        for call in &response.tool_calls {
            let arguments: Value =
                serde_json::from_str(&call.function.arguments).unwrap_or(Value::Null);
            self.mirror(TunnelEvent::ToolCallStart {
                name: call.function.name.clone(),
                arguments: arguments.clone(),
                call_id: call.id.clone(),
            });

            let result = self.tools.execute(&call.function.name, arguments).await?;
            self.mirror(TunnelEvent::ToolCallResult {
                name: call.function.name.clone(),
                result: result.clone(),
                call_id: call.id.clone(),
            });
            self.session
                .history
                .push(Turn::tool_result(&call.id, result.to_string()));
        }

        // Exactly one follow-up invocation; tool calling is one level deep.
        let response = self
            .model
            .complete(ChatRequest {
                api_key,
                messages: self.build_messages(),
                tools: self.config.tools.clone(),
            })
            .await?;
        self.mirror_usage(response.usage);

        let text = response.content.unwrap_or_default();
        self.mirror(TunnelEvent::AiResponse {
            text: text.clone(),
            after_tool_calls: true,
        });
        Ok(text)
    }

    /// Pick the credential for this call: stored key, then the tunnel's
    /// credential exchange, then the server-wide default. Decided once and
    /// cached; never re-resolved within the call.
    async fn resolve_api_key(&mut self) -> String {
        if let Some(key) = &self.session.resolved_api_key {
            return key.clone();
        }

        let key = if let Some(stored) = self.config.api_key.clone() {
            stored
        } else {
            match self.registry.request_credential(&self.session.token).await {
                Ok(secret) => secret,
                Err(e) => {
                    tracing::debug!(
                        "Credential exchange for call {} failed ({e}), using default key",
                        self.session.token
                    );
                    self.default_api_key.clone()
                }
            }
        };

        self.session.resolved_api_key = Some(key.clone());
        key
    }

    fn build_messages(&self) -> Vec<Turn> {
        let instructions = self
            .config
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        let mut messages = Vec::with_capacity(self.session.history.len() + 1);
        messages.push(Turn::text(Role::System, instructions));
        messages.extend(self.session.history.iter().cloned());
        messages
    }

    fn mirror_usage(&self, usage: TokenUsage) {
        self.mirror(TunnelEvent::TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            estimated_cost: usage.estimated_cost(),
        });
    }

    fn mirror(&self, event: TunnelEvent) {
        self.registry.send(&self.session.token, &event);
    }
}
