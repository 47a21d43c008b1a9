//! Credential exchange over a tunnel connection.
//!
//! When a call has no stored secret, the engine asks the session's tunnel
//! for one: it sends `credential_request` with a fresh request id and waits,
//! bounded by a timeout, for a `credential_response` echoing that id back.

use std::{collections::HashMap, sync::Mutex, time::Duration};

use thiserror::Error;
use tokio::sync::oneshot;
use uuid::Uuid;

use voice_relay_core::{TunnelEvent, now_millis};

use crate::registry::TunnelRegistry;

/// How long to wait for a `credential_response` before giving up.
pub const CREDENTIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Credential exchange error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("No open tunnel for this session")]
    Unavailable,
    #[error("Credential request timed out; browser may be closed")]
    Timeout,
}

struct PendingRequest {
    token: String,
    tx: oneshot::Sender<String>,
}

/// Outstanding credential requests, keyed by request id.
///
/// Exactly one resolution per request id: resolving removes the entry, and
/// the timeout path removes it too, so a late response finds nothing.
pub(crate) struct PendingCredentials {
    requests: Mutex<HashMap<String, PendingRequest>>,
}

impl PendingCredentials {
    pub(crate) fn new() -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
        }
    }

    fn insert(&self, request_id: String, token: String, tx: oneshot::Sender<String>) {
        self.requests
            .lock()
            .unwrap()
            .insert(request_id, PendingRequest { token, tx });
    }

    fn remove(&self, request_id: &str) {
        self.requests.lock().unwrap().remove(request_id);
    }

    fn take_matching(&self, token: &str, request_id: &str) -> Option<oneshot::Sender<String>> {
        let mut requests = self.requests.lock().unwrap();
        if requests.get(request_id).is_some_and(|p| p.token == token) {
            requests.remove(request_id).map(|p| p.tx)
        } else {
            None
        }
    }
}

fn fresh_request_id() -> String {
    format!("{}-{}", now_millis(), Uuid::new_v4().simple())
}

impl TunnelRegistry {
    /// Ask the tunnel for `token` to supply the tenant secret.
    ///
    /// Resolves with the secret from a matching `credential_response`, or
    /// fails: [`CredentialError::Unavailable`] immediately when no open
    /// tunnel exists (nothing is sent), [`CredentialError::Timeout`] when
    /// the tunnel never answers within [`CREDENTIAL_TIMEOUT`].
    ///
    /// # Errors
    /// Returns error if the exchange cannot complete; the caller falls back
    /// to the server-wide default secret.
    pub async fn request_credential(&self, token: &str) -> Result<String, CredentialError> {
        self.request_credential_with_timeout(token, CREDENTIAL_TIMEOUT)
            .await
    }

    /// Same as [`Self::request_credential`] with an explicit timeout.
    ///
    /// # Errors
    /// See [`Self::request_credential`].
    pub async fn request_credential_with_timeout(
        &self,
        token: &str,
        timeout: Duration,
    ) -> Result<String, CredentialError> {
        if self.lookup(token).is_none() {
            return Err(CredentialError::Unavailable);
        }

        let request_id = fresh_request_id();
        let (tx, rx) = oneshot::channel();
        self.pending
            .insert(request_id.clone(), token.to_string(), tx);

        tracing::debug!("Requesting credential for session {token} (request {request_id})");
        self.send(
            token,
            &TunnelEvent::CredentialRequest {
                request_id: request_id.clone(),
            },
        );

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(secret)) => Ok(secret),
            // Sender dropped without resolving; only happens if the pending
            // entry was discarded, so treat it like a timeout.
            Ok(Err(_)) => Err(CredentialError::Timeout),
            Err(_) => {
                self.pending.remove(&request_id);
                tracing::warn!("Credential request {request_id} for session {token} timed out");
                Err(CredentialError::Timeout)
            }
        }
    }

    /// Resolve a pending credential request with a secret from the tunnel.
    ///
    /// Returns `true` if a request with this id was pending for this token.
    /// Unknown or mismatched ids (including responses arriving after the
    /// timeout already fired) are ignored and return `false`.
    pub fn resolve_credential(&self, token: &str, request_id: &str, secret: String) -> bool {
        match self.pending.take_matching(token, request_id) {
            Some(tx) => tx.send(secret).is_ok(),
            None => {
                tracing::debug!(
                    "Ignoring credential response with unknown request id {request_id}"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TunnelHandle;

    const SHORT: Duration = Duration::from_millis(50);

    fn request_id_from(frame: &str) -> String {
        let value: serde_json::Value = serde_json::from_str(frame).unwrap();
        assert_eq!(value["type"], "credential_request");
        value["requestId"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_no_tunnel_resolves_unavailable_without_sending() {
        let registry = TunnelRegistry::new();
        let result = registry
            .request_credential_with_timeout("xyz789", SHORT)
            .await;
        assert_eq!(result, Err(CredentialError::Unavailable));
    }

    #[tokio::test]
    async fn test_matching_response_resolves_with_secret() {
        let registry = std::sync::Arc::new(TunnelRegistry::new());
        let (handle, mut rx) = TunnelHandle::new();
        registry.register("abc123", handle);

        let responder = {
            let registry = std::sync::Arc::clone(&registry);
            tokio::spawn(async move {
                let frame = rx.recv().await.unwrap();
                let request_id = request_id_from(&frame);
                assert!(registry.resolve_credential("abc123", &request_id, "sk-from-tunnel".into()));
            })
        };

        let secret = registry
            .request_credential_with_timeout("abc123", Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(secret, "sk-from-tunnel");
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_silent_tunnel_times_out_and_late_response_is_ignored() {
        let registry = TunnelRegistry::new();
        let (handle, mut rx) = TunnelHandle::new();
        registry.register("abc123", handle);

        let result = registry
            .request_credential_with_timeout("abc123", SHORT)
            .await;
        assert_eq!(result, Err(CredentialError::Timeout));

        // The request frame did go out; answering it now changes nothing.
        let frame = rx.recv().await.unwrap();
        let request_id = request_id_from(&frame);
        assert!(!registry.resolve_credential("abc123", &request_id, "too-late".into()));
    }

    #[tokio::test]
    async fn test_mismatched_request_id_does_not_resolve() {
        let registry = std::sync::Arc::new(TunnelRegistry::new());
        let (handle, mut rx) = TunnelHandle::new();
        registry.register("abc123", handle);

        let responder = {
            let registry = std::sync::Arc::clone(&registry);
            tokio::spawn(async move {
                let _frame = rx.recv().await.unwrap();
                assert!(!registry.resolve_credential("abc123", "some-other-id", "wrong".into()));
            })
        };

        let result = registry
            .request_credential_with_timeout("abc123", SHORT)
            .await;
        assert_eq!(result, Err(CredentialError::Timeout));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_response_for_other_token_does_not_resolve() {
        let registry = std::sync::Arc::new(TunnelRegistry::new());
        let (handle, mut rx) = TunnelHandle::new();
        registry.register("abc123", handle);

        let responder = {
            let registry = std::sync::Arc::clone(&registry);
            tokio::spawn(async move {
                let frame = rx.recv().await.unwrap();
                let request_id = request_id_from(&frame);
                assert!(!registry.resolve_credential("other", &request_id, "stolen".into()));
            })
        };

        let result = registry
            .request_credential_with_timeout("abc123", SHORT)
            .await;
        assert_eq!(result, Err(CredentialError::Timeout));
        responder.await.unwrap();
    }
}
