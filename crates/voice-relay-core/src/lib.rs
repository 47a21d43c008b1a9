//! Core abstractions for the voice relay server.
//!
//! This crate provides the fundamental building blocks:
//! - Call-channel and tunnel-channel wire protocols
//! - `SessionState` - Per-call conversation state
//! - `TenantConfig` - Immutable per-call configuration snapshot
//! - `ConfigStore` trait with an in-memory implementation

pub mod config;
pub mod protocol;
pub mod session;

pub use config::{ConfigError, ConfigStore, MemoryConfigStore, TenantConfig, ToolDefinition};
pub use protocol::{CallEvent, CallReply, TunnelEvent, TunnelInbound};
pub use session::{CallInfo, Role, SessionState, ToolCall, Turn};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix time in milliseconds.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
