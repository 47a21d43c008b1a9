//! Chat model abstraction and the OpenAI chat-completions client.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

use voice_relay_core::{ToolCall, ToolDefinition, Turn};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Response-length cap, sized for spoken replies.
const MAX_RESPONSE_TOKENS: u32 = 300;
const TEMPERATURE: f64 = 0.7;

/// gpt-4o-mini list prices, USD per token.
const INPUT_COST_PER_TOKEN: f64 = 0.15 / 1_000_000.0;
const OUTPUT_COST_PER_TOKEN: f64 = 0.60 / 1_000_000.0;

/// Model error.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// One model invocation.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// The resolved per-call credential.
    pub api_key: String,
    /// System turn plus full history, in prompt order.
    pub messages: Vec<Turn>,
    /// Tenant's declared tools; empty means no tool calling.
    pub tools: Vec<ToolDefinition>,
}

/// Token accounting for one invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Dollar estimate at the configured model's list prices.
    #[must_use]
    pub fn estimated_cost(&self) -> f64 {
        f64::from(self.prompt_tokens) * INPUT_COST_PER_TOKEN
            + f64::from(self.completion_tokens) * OUTPUT_COST_PER_TOKEN
    }
}

/// What the model answered.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
}

/// Trait for chat model backends.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Run one completion.
    ///
    /// # Errors
    /// Returns error on transport failure, non-2xx status, or an
    /// undecodable body.
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ModelError>;
}

/// OpenAI chat-completions client.
pub struct OpenAiChatModel {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OpenAiChatModel {
    /// Create a client for the default OpenAI endpoint.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Override the base URL (for proxies or compatible endpoints).
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Override the model name.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn build_body(&self, request: &ChatRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
            "max_tokens": MAX_RESPONSE_TOKENS,
            "temperature": TEMPERATURE,
        });
        if !request.tools.is_empty() {
            body["tools"] = build_tools(&request.tools);
            body["tool_choice"] = json!("auto");
        }
        body
    }
}

impl Default for OpenAiChatModel {
    fn default() -> Self {
        Self::new()
    }
}

/// Map tool definitions into the chat-completions `tools` array.
fn build_tools(tools: &[ToolDefinition]) -> Value {
    Value::Array(
        tools
            .iter()
            .map(|t| {
                let mut function = json!({ "name": t.name });
                if let Some(description) = &t.description {
                    function["description"] = json!(description);
                }
                if let Some(parameters) = &t.parameters {
                    function["parameters"] = parameters.clone();
                }
                json!({ "type": "function", "function": function })
            })
            .collect(),
    )
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Deserialize)]
struct ApiMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Deserialize, Default)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ModelError> {
        let body = self.build_body(&request);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&request.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ModelError::Api { status, message });
        }

        let decoded: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Malformed(e.to_string()))?;

        let usage = decoded.usage.unwrap_or_default();
        let choice = decoded
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::Malformed("no choices in response".to_string()))?;

        Ok(ChatResponse {
            content: choice.message.content,
            tool_calls: choice.message.tool_calls.unwrap_or_default(),
            usage: TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_relay_core::{Role, Turn};

    #[test]
    fn test_cost_estimate_arithmetic() {
        let usage = TokenUsage {
            prompt_tokens: 1_000_000,
            completion_tokens: 1_000_000,
            total_tokens: 2_000_000,
        };
        let cost = usage.estimated_cost();
        assert!((cost - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_body_omits_tools_when_none_declared() {
        let model = OpenAiChatModel::new();
        let body = model.build_body(&ChatRequest {
            api_key: "sk-test".to_string(),
            messages: vec![Turn::text(Role::User, "hi")],
            tools: vec![],
        });
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
        assert_eq!(body["max_tokens"], 300);
    }

    #[test]
    fn test_body_attaches_tool_choice_auto_with_tools() {
        let model = OpenAiChatModel::new();
        let body = model.build_body(&ChatRequest {
            api_key: "sk-test".to_string(),
            messages: vec![],
            tools: vec![ToolDefinition {
                name: "lookup_order".to_string(),
                description: Some("Look up an order".to_string()),
                parameters: Some(json!({"type": "object", "properties": {}})),
            }],
        });
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "lookup_order");
    }

    #[test]
    fn test_response_with_tool_calls_decodes() {
        let raw = r#"{
            "choices": [{"message": {
                "content": null,
                "tool_calls": [{"id": "call_1", "type": "function",
                    "function": {"name": "lookup_order", "arguments": "{\"id\":7}"}}]
            }}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16}
        }"#;
        let decoded: ApiResponse = serde_json::from_str(raw).unwrap();
        let message = &decoded.choices[0].message;
        assert!(message.content.is_none());
        let calls = message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "lookup_order");
        assert_eq!(decoded.usage.unwrap().total_tokens, 16);
    }
}
