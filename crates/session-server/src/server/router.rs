//! Axum router construction.

use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use encrypted_session::EncryptedCookieLayer;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use super::{handlers, state::AppState};

/// Default per-request timeout applied to all routes.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the application [`Router`].
///
/// Only the session routes run behind `sessions`; `/health` and the fallback
/// never read or write the cookie.
pub fn build(state: AppState, sessions: EncryptedCookieLayer) -> Router {
    Router::new()
        .route("/visits", get(handlers::visits))
        .route("/session", get(handlers::show))
        .route("/session/clear", post(handlers::clear))
        .route("/deferred", get(handlers::deferred))
        .route_layer(sessions)
        .route("/health", get(handlers::health))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .with_state(state)
}
