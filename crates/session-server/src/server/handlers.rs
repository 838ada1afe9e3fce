//! Axum request handlers for all service endpoints.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::protocol::{ErrorResponse, HealthResponse};
use encrypted_session::Session;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::warn;

use super::state::AppState;

/// Body of `GET /visits`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visits {
    pub visits: u64,
}

/// `GET /visits` — count requests made with this session.
pub async fn visits(session: Session) -> Response {
    let visits = session.get::<u64>("visits").unwrap_or(0) + 1;
    if let Err(e) = session.insert("visits", visits) {
        return internal_error(e);
    }
    Json(Visits { visits }).into_response()
}

/// `GET /session` — the current session record.
pub async fn show(session: Session) -> impl IntoResponse {
    Json(session.snapshot())
}

/// `POST /session/clear` — empty the session.
///
/// An empty session is not written back, so the response carries no cookie.
pub async fn clear(session: Session) -> StatusCode {
    session.clear();
    StatusCode::NO_CONTENT
}

/// `GET /deferred` — finish the request from a spawned task.
///
/// The session is updated after the handler has returned control to the
/// runtime; the cookie still reflects the update.
pub async fn deferred(session: Session) -> Response {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let runs = session.get::<u64>("deferred").unwrap_or(0) + 1;
        let result = session
            .insert("deferred", runs)
            .map(|()| session.snapshot());
        let _ = tx.send(result);
    });

    match rx.await {
        Ok(Ok(record)) => Json(record).into_response(),
        Ok(Err(e)) => internal_error(e),
        Err(_) => {
            warn!("deferred worker dropped its response");
            let err = ErrorResponse::new("internal_error", "deferred work did not complete");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(err)).into_response()
        }
    }
}

/// `GET /health` — liveness check.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".into(),
        cipher: state.cipher.to_string(),
    })
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ErrorResponse::new("not_found", "the requested resource does not exist");
    (StatusCode::NOT_FOUND, Json(err))
}

fn internal_error(e: serde_json::Error) -> Response {
    warn!(error = %e, "session value could not be stored");
    let err = ErrorResponse::new("internal_error", "session update failed");
    (StatusCode::INTERNAL_SERVER_ERROR, Json(err)).into_response()
}
