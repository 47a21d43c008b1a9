//! Process-wide registry of live tunnel connections, keyed by session token.

use std::{collections::HashMap, sync::RwLock};

use tokio::sync::mpsc;
use uuid::Uuid;

use voice_relay_core::TunnelEvent;

use crate::credential::PendingCredentials;

/// Handle to one tunnel connection.
///
/// Holds the sending half of the connection's outbound frame channel; the
/// connection task owns the receiving half and forwards frames to the socket.
#[derive(Debug, Clone)]
pub struct TunnelHandle {
    id: Uuid,
    tx: mpsc::UnboundedSender<String>,
}

impl TunnelHandle {
    /// Create a handle and the receiver its connection task should drain.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id: Uuid::new_v4(), tx }, rx)
    }

    /// Identity of this handle, used to guard against stale unregisters.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Whether the connection task is still draining frames.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Registry mapping session token to the single active tunnel for that token.
///
/// Entries are partitioned by token; register/unregister/lookup on one token
/// are atomic under the map lock, and a later registration for the same token
/// replaces the earlier one (last-writer-wins).
pub struct TunnelRegistry {
    tunnels: RwLock<HashMap<String, TunnelHandle>>,
    pub(crate) pending: PendingCredentials,
}

impl Default for TunnelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TunnelRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tunnels: RwLock::new(HashMap::new()),
            pending: PendingCredentials::new(),
        }
    }

    /// Insert or replace the tunnel for `token`.
    ///
    /// A replaced handle is dropped here, not force-closed; its connection
    /// winds down on its own.
    pub fn register(&self, token: &str, handle: TunnelHandle) {
        let previous = self
            .tunnels
            .write()
            .unwrap()
            .insert(token.to_string(), handle);
        if previous.is_some() {
            tracing::info!("Replaced tunnel for session {token}");
        } else {
            tracing::info!("Registered tunnel for session {token}");
        }
    }

    /// Remove the entry for `token` only if `handle_id` still owns it.
    ///
    /// Guards against a stale close racing a newer registration.
    pub fn unregister(&self, token: &str, handle_id: Uuid) {
        let mut tunnels = self.tunnels.write().unwrap();
        if tunnels.get(token).is_some_and(|h| h.id() == handle_id) {
            tunnels.remove(token);
            tracing::info!("Unregistered tunnel for session {token}");
        }
    }

    /// The live handle for `token`, if one is registered and still open.
    #[must_use]
    pub fn lookup(&self, token: &str) -> Option<TunnelHandle> {
        self.tunnels
            .read()
            .unwrap()
            .get(token)
            .filter(|h| h.is_open())
            .cloned()
    }

    /// Mirror an event to the tunnel for `token`, best-effort.
    ///
    /// Absent tunnels, serialization failures, and send failures are logged
    /// and swallowed; mirroring never affects call handling.
    pub fn send(&self, token: &str, event: &TunnelEvent) {
        let Some(handle) = self.lookup(token) else {
            return;
        };
        match event.to_frame() {
            Ok(frame) => {
                if handle.tx.send(frame).is_err() {
                    tracing::debug!("Tunnel for session {token} closed mid-send");
                }
            }
            Err(e) => tracing::warn!("Failed to serialize tunnel event: {e}"),
        }
    }

    /// Number of currently registered tunnels.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.tunnels.read().unwrap().len()
    }
}
