//! Voice relay server.
//!
//! Accepts call connections from the telephony gateway and tunnel
//! connections from tenant browsers, both as WebSockets distinguished by
//! path prefix, and relays each call through the conversation engine.

mod config;
mod router;
mod settings;
mod state;
mod ws;

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voice_relay_core::MemoryConfigStore;
use voice_relay_engine::{NullToolExecutor, OpenAiChatModel};
use voice_relay_tunnel::TunnelRegistry;

use crate::config::ServerConfig;
use crate::settings::SettingsClient;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let mut model = OpenAiChatModel::new();
    if let Some(url) = &config.openai_base_url {
        model = model.base_url(url.clone());
    }
    if let Some(name) = &config.openai_model {
        model = model.model(name.clone());
    }

    let state = AppState {
        registry: Arc::new(TunnelRegistry::new()),
        store: Arc::new(MemoryConfigStore::new()),
        settings: config
            .settings_base_url
            .clone()
            .map(|url| Arc::new(SettingsClient::new(url))),
        model: Arc::new(model),
        tools: Arc::new(NullToolExecutor),
        default_api_key: config.default_api_key.clone(),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/{*path}", get(router::ws_entry))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    tracing::info!("Voice relay listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "active_tunnels": state.registry.active_count(),
    }))
}
