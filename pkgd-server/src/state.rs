//! Shared application state.

use pkgd_core::Registry;
use serde::Serialize;
use std::sync::Arc;

/// State handed to every handler, wrapped in an `Arc`.
#[derive(Debug)]
pub struct AppState {
    pub registry: Registry,
    /// Bind address, for log and greeting output
    pub server_addr: String,
}

impl AppState {
    pub fn new(registry: Registry, server_addr: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            server_addr: server_addr.into(),
        })
    }
}

/// Standardized success response for API consistency.
///
/// Serializes to: `{"ok": true, "message": "..."}`
#[derive(Serialize, Debug)]
pub struct SuccessResponse {
    pub ok: bool,
    pub message: String,
}

impl SuccessResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }
}
