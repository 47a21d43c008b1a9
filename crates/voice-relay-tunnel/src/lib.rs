//! Tunnel connections: registry and credential exchange.
//!
//! A tunnel is the optional observer channel for one session token. The
//! registry maps tokens to live tunnel handles; the credential module runs
//! the request/response exchange used to fetch a tenant secret on demand.

pub mod credential;
pub mod registry;

pub use credential::CredentialError;
pub use registry::{TunnelHandle, TunnelRegistry};
