//! HTTP client for the sibling settings service.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use voice_relay_core::{TenantConfig, ToolDefinition};

/// Settings fetch error.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Network error: {0}")]
    Network(String),
}

/// Client for `GET {base}/api/settings/{token}`.
pub struct SettingsClient {
    client: reqwest::Client,
    base_url: String,
}

impl SettingsClient {
    /// Create a client for the given base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Fetch the tenant configuration for a session token.
    ///
    /// Non-success statuses, `success: false` payloads, and undecodable
    /// bodies all come back as `Ok(None)` — "no configuration found".
    ///
    /// # Errors
    /// Returns error only on transport failure.
    pub async fn fetch(&self, token: &str) -> Result<Option<TenantConfig>, SettingsError> {
        let response = self
            .client
            .get(format!("{}/api/settings/{token}", self.base_url))
            .send()
            .await
            .map_err(|e| SettingsError::Network(e.to_string()))?;

        if !response.status().is_success() {
            tracing::warn!(
                "Settings service returned {} for session {token}",
                response.status()
            );
            return Ok(None);
        }

        let body = response
            .text()
            .await
            .map_err(|e| SettingsError::Network(e.to_string()))?;
        Ok(parse_settings(&body))
    }
}

#[derive(Deserialize)]
struct SettingsResponse {
    #[serde(default)]
    success: bool,
    settings: Option<StudentSettings>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudentSettings {
    #[serde(default)]
    student_name: String,
    openai_api_key: Option<String>,
    system_prompt: Option<String>,
    #[serde(default)]
    tools: Vec<ToolDefinition>,
    voice: Option<Value>,
    greeting: Option<String>,
}

impl StudentSettings {
    fn into_config(self) -> TenantConfig {
        TenantConfig {
            display_name: self.student_name,
            api_key: self.openai_api_key,
            system_prompt: self.system_prompt,
            tools: self.tools,
            voice: self.voice,
            greeting: self.greeting,
        }
    }
}

/// Decode a settings payload; malformed or unsuccessful bodies yield `None`.
fn parse_settings(body: &str) -> Option<TenantConfig> {
    let decoded: SettingsResponse = match serde_json::from_str(body) {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!("Malformed settings response: {e}");
            return None;
        }
    };
    if !decoded.success {
        return None;
    }
    decoded.settings.map(StudentSettings::into_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_payload_maps_to_config() {
        let body = r#"{
            "success": true,
            "settings": {
                "studentName": "Alice",
                "openaiApiKey": "sk-live-1",
                "systemPrompt": "Be brief.",
                "tools": [{"name": "lookup_order"}],
                "voice": {"name": "en-US-Neural"},
                "greeting": "Hi Alice!"
            }
        }"#;
        let config = parse_settings(body).unwrap();
        assert_eq!(config.display_name, "Alice");
        assert_eq!(config.api_key.as_deref(), Some("sk-live-1"));
        assert_eq!(config.system_prompt.as_deref(), Some("Be brief."));
        assert_eq!(config.tools.len(), 1);
        assert_eq!(config.greeting.as_deref(), Some("Hi Alice!"));
    }

    #[test]
    fn test_unsuccessful_payload_is_none() {
        assert!(parse_settings(r#"{"success": false}"#).is_none());
    }

    #[test]
    fn test_malformed_payload_is_none() {
        assert!(parse_settings("not json").is_none());
        assert!(parse_settings(r#"{"success": true}"#).is_none());
    }

    #[test]
    fn test_missing_optionals_default() {
        let body = r#"{"success": true, "settings": {"studentName": "Bob"}}"#;
        let config = parse_settings(body).unwrap();
        assert_eq!(config.display_name, "Bob");
        assert!(config.api_key.is_none());
        assert!(config.tools.is_empty());
    }
}
