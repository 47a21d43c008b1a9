//! Shared application state.

use std::sync::Arc;

use voice_relay_core::ConfigStore;
use voice_relay_engine::{ChatModel, ToolExecutor};
use voice_relay_tunnel::TunnelRegistry;

use crate::settings::SettingsClient;

/// State handed to every connection handler.
///
/// All registries are explicit here rather than process globals, so tests
/// can build isolated instances.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TunnelRegistry>,
    pub store: Arc<dyn ConfigStore>,
    /// Sibling settings service; `None` disables the HTTP fallback.
    pub settings: Option<Arc<SettingsClient>>,
    pub model: Arc<dyn ChatModel>,
    pub tools: Arc<dyn ToolExecutor>,
    /// Server-wide fallback credential.
    pub default_api_key: String,
}
