//! Tenant configuration snapshots and the config-store trait.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A callable tool the tenant has declared for its calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON-schema parameters object, passed through to the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// Immutable-for-the-call configuration snapshot for one tenant.
///
/// Captured once before the engine starts; the core never writes to it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantConfig {
    pub display_name: String,
    /// Stored secret credential, if the tenant saved one.
    pub api_key: Option<String>,
    /// System instruction text; `None` falls back to the built-in default.
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    /// Voice display settings, opaque to the relay.
    pub voice: Option<Value>,
    pub greeting: Option<String>,
}

/// Config store error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Trait for configuration storage backends, keyed by session token.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Look up the configuration for a session token.
    async fn get(&self, token: &str) -> Result<Option<TenantConfig>, ConfigError>;

    /// Insert or replace the configuration for a session token.
    async fn put(&self, token: &str, config: TenantConfig) -> Result<(), ConfigError>;
}

/// In-memory store implementation.
///
/// Useful for development and single-process deployments.
/// Data is lost on restart.
pub struct MemoryConfigStore {
    entries: RwLock<HashMap<String, TenantConfig>>,
}

impl MemoryConfigStore {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self, token: &str) -> Result<Option<TenantConfig>, ConfigError> {
        Ok(self
            .entries
            .read()
            .map_err(|e| ConfigError::Internal(e.to_string()))?
            .get(token)
            .cloned())
    }

    async fn put(&self, token: &str, config: TenantConfig) -> Result<(), ConfigError> {
        self.entries
            .write()
            .map_err(|e| ConfigError::Internal(e.to_string()))?
            .insert(token.to_string(), config);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryConfigStore::new();
        assert!(store.get("abc123").await.unwrap().is_none());

        let config = TenantConfig {
            display_name: "Alice".to_string(),
            api_key: Some("sk-live-1".to_string()),
            ..TenantConfig::default()
        };
        store.put("abc123", config).await.unwrap();

        let found = store.get("abc123").await.unwrap().unwrap();
        assert_eq!(found.display_name, "Alice");
        assert_eq!(found.api_key.as_deref(), Some("sk-live-1"));
    }

    #[tokio::test]
    async fn test_put_replaces_existing() {
        let store = MemoryConfigStore::new();
        store
            .put(
                "abc123",
                TenantConfig {
                    display_name: "Old".to_string(),
                    ..TenantConfig::default()
                },
            )
            .await
            .unwrap();
        store
            .put(
                "abc123",
                TenantConfig {
                    display_name: "New".to_string(),
                    ..TenantConfig::default()
                },
            )
            .await
            .unwrap();
        let found = store.get("abc123").await.unwrap().unwrap();
        assert_eq!(found.display_name, "New");
    }

    #[test]
    fn test_tool_definition_optional_fields() {
        let tool: ToolDefinition = serde_json::from_str(r#"{"name":"lookup_order"}"#).unwrap();
        assert_eq!(tool.name, "lookup_order");
        assert!(tool.description.is_none());
        assert!(tool.parameters.is_none());
    }
}
