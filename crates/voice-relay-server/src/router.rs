//! Connection router: classifies inbound WebSocket paths.

use axum::{
    extract::{State, WebSocketUpgrade, ws::WebSocket},
    http::Uri,
    response::IntoResponse,
};

use crate::state::AppState;
use crate::ws;

/// Path prefix for call connections.
const CALL_PREFIX: &str = "ws";
/// Path prefix for tunnel (observer) connections.
const TUNNEL_PREFIX: &str = "tunnel";

/// How an inbound connection was classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionKind {
    Call { token: String },
    Tunnel { token: String },
    Invalid { reason: &'static str },
}

/// Classify a request path into a connection kind.
///
/// Purely syntactic: the trailing segment (query string stripped) is the
/// session token, and nothing here checks that the token names a real
/// session.
pub fn classify(path: &str) -> ConnectionKind {
    let path = path.split('?').next().unwrap_or(path);
    let trimmed = path.trim_start_matches('/');
    let (prefix, rest) = trimmed.split_once('/').unwrap_or((trimmed, ""));

    let token = rest
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("")
        .to_string();
    if token.is_empty() || token == CALL_PREFIX || token == TUNNEL_PREFIX {
        return ConnectionKind::Invalid {
            reason: "missing session token",
        };
    }

    match prefix {
        CALL_PREFIX => ConnectionKind::Call { token },
        TUNNEL_PREFIX => ConnectionKind::Tunnel { token },
        _ => ConnectionKind::Invalid {
            reason: "unknown connection path",
        },
    }
}

/// Single WebSocket entry point; dispatches on the classified path.
pub async fn ws_entry(
    websocket: WebSocketUpgrade,
    uri: Uri,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let kind = classify(uri.path());
    websocket.on_upgrade(move |socket| dispatch(socket, kind, state))
}

async fn dispatch(socket: WebSocket, kind: ConnectionKind, state: AppState) {
    match kind {
        ConnectionKind::Call { token } => ws::handle_call_socket(socket, token, state).await,
        ConnectionKind::Tunnel { token } => ws::handle_tunnel_socket(socket, token, state).await,
        ConnectionKind::Invalid { reason } => {
            tracing::warn!("Rejecting connection: {reason}");
            ws::close_policy_violation(socket, reason).await;
        }
    }
}
