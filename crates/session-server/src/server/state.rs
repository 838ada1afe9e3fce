//! Shared application state injected into every Axum handler.

use std::sync::Arc;

/// Application state shared across all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Cipher name the session layer was configured with, reported by `/health`.
    pub cipher: Arc<str>,
}

impl AppState {
    pub fn new(cipher: impl Into<Arc<str>>) -> Self {
        Self {
            cipher: cipher.into(),
        }
    }
}
