//! WebSocket handlers for call and tunnel connections.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::{SinkExt, StreamExt};

use voice_relay_core::{CallEvent, TenantConfig, TunnelEvent, TunnelInbound};
use voice_relay_engine::ConversationRelay;
use voice_relay_tunnel::TunnelHandle;

use crate::state::AppState;

/// Close a socket with a policy-violation status and a readable reason.
pub async fn close_policy_violation(mut socket: WebSocket, reason: &str) {
    let frame = CloseFrame {
        code: close_code::POLICY,
        reason: reason.to_string().into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

/// Drive one call connection through the conversation engine.
///
/// Events are processed strictly in arrival order; one event finishes
/// before the next is read off the socket.
pub async fn handle_call_socket(socket: WebSocket, token: String, state: AppState) {
    let Some(config) = load_tenant_config(&state, &token).await else {
        tracing::warn!("No configuration found for session {token}");
        close_policy_violation(socket, "no configuration found for session").await;
        return;
    };
    tracing::info!("Call connected for session {token} ({})", config.display_name);

    let mut engine = ConversationRelay::new(
        &token,
        config,
        Arc::clone(&state.registry),
        Arc::clone(&state.model),
        Arc::clone(&state.tools),
        state.default_api_key.clone(),
    );

    let (mut sender, mut receiver) = socket.split();

    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(Message::Text(t)) => t,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!("Call socket error for session {token}: {e}");
                engine.handle_transport_error(&e.to_string());
                break;
            }
        };

        let event: CallEvent = match serde_json::from_str(&text) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Invalid call event for session {token}: {e}");
                continue;
            }
        };

        if let Some(reply) = engine.handle_event(event).await {
            match serde_json::to_string(&reply) {
                Ok(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::error!("Failed to serialize call reply: {e}"),
            }
        }
    }

    engine.handle_close();
    tracing::info!("Call disconnected for session {token}");
}

/// Drive one tunnel connection: register it, forward mirrored frames out,
/// and feed credential responses back to the registry.
pub async fn handle_tunnel_socket(socket: WebSocket, token: String, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let (handle, mut rx) = TunnelHandle::new();
    let handle_id = handle.id();
    state.registry.register(&token, handle);
    state.registry.send(&token, &TunnelEvent::TunnelConnected);

    // Forward mirrored frames to the socket until the handle is dropped.
    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(Message::Text(t)) => t,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!("Tunnel socket error for session {token}: {e}");
                break;
            }
        };

        match serde_json::from_str::<TunnelInbound>(&text) {
            Ok(TunnelInbound::CredentialResponse { request_id, secret }) => {
                state.registry.resolve_credential(&token, &request_id, secret);
            }
            Ok(TunnelInbound::Unknown) => {}
            Err(e) => tracing::warn!("Invalid tunnel message for session {token}: {e}"),
        }
    }

    send_task.abort();
    state.registry.unregister(&token, handle_id);
    tracing::info!("Tunnel disconnected for session {token}");
}

/// Capture the tenant's configuration snapshot: local store first, then the
/// settings service, caching a successful fetch back into the store.
async fn load_tenant_config(state: &AppState, token: &str) -> Option<TenantConfig> {
    match state.store.get(token).await {
        Ok(Some(config)) => return Some(config),
        Ok(None) => {}
        Err(e) => tracing::warn!("Config store lookup failed for session {token}: {e}"),
    }

    let settings = state.settings.as_ref()?;
    match settings.fetch(token).await {
        Ok(Some(config)) => {
            if let Err(e) = state.store.put(token, config.clone()).await {
                tracing::warn!("Failed to cache settings for session {token}: {e}");
            }
            Some(config)
        }
        Ok(None) => None,
        Err(e) => {
            tracing::warn!("Settings fetch failed for session {token}: {e}");
            None
        }
    }
}
