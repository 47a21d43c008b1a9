//! Environment-driven server configuration.

use std::net::SocketAddr;

use anyhow::Context as _;

const DEFAULT_ADDR: &str = "0.0.0.0:8080";

/// Configuration read once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Base URL of the sibling settings service, if configured.
    pub settings_base_url: Option<String>,
    /// Server-wide fallback OpenAI key; may be empty.
    pub default_api_key: String,
    pub openai_base_url: Option<String>,
    pub openai_model: Option<String>,
}

impl ServerConfig {
    /// Read configuration from the environment.
    ///
    /// # Errors
    /// Returns error if `VOICE_RELAY_ADDR` is set but unparseable.
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr = std::env::var("VOICE_RELAY_ADDR")
            .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
            .parse()
            .context("invalid VOICE_RELAY_ADDR")?;

        Ok(Self {
            bind_addr,
            settings_base_url: env_opt("SETTINGS_BASE_URL"),
            default_api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            openai_base_url: env_opt("OPENAI_BASE_URL"),
            openai_model: env_opt("OPENAI_MODEL"),
        })
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
