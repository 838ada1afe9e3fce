//! Session carriers: move the envelope between client and server.
//!
//! # Responsibilities
//! - [`cookie`]: decode the session cookie before the inner service runs and
//!   attach a fresh one after it completes.
//! - [`field`]: keep the session encrypted inside a single field of a session
//!   object owned by another layer.
//!
//! Both carriers hand handlers a [`Session`]: a per-request handle created
//! fresh for every request and never shared between requests.

pub mod cookie;
pub mod field;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use common::SessionRecord;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

pub use cookie::{EncryptedCookieLayer, EncryptedCookieService};
pub use field::{FieldCarrier, FieldSessionLayer, FieldSessionService};

/// Handle to the current request's session record.
///
/// Stored in request extensions by the session layers. Clones share the same
/// record, so changes made by the handler are visible to the layer when it
/// encodes the response.
#[derive(Debug, Clone, Default)]
pub struct Session {
    record: Arc<Mutex<SessionRecord>>,
}

impl Session {
    pub fn new(record: SessionRecord) -> Self {
        Self {
            record: Arc::new(Mutex::new(record)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionRecord> {
        // A panicking handler cannot leave the map half-written.
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    /// Look up `key` and deserialise it into `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.lock().get_as(key)
    }

    /// Store `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be represented as JSON.
    pub fn insert<T: Serialize>(
        &self,
        key: impl Into<String>,
        value: T,
    ) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.lock().insert(key, value);
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.lock().remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the current record.
    pub fn snapshot(&self) -> SessionRecord {
        self.lock().clone()
    }

    /// Run `f` with exclusive access to the record.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut SessionRecord) -> R) -> R {
        f(&mut self.lock())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Session>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "session layer is not installed",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, routing::get, Router};
    use serde_json::json;
    use tower::ServiceExt;

    #[test]
    fn clones_share_the_record() {
        let session = Session::default();
        let clone = session.clone();
        clone.insert("user", "alice").unwrap();
        assert_eq!(session.get::<String>("user").as_deref(), Some("alice"));
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn map_operations() {
        let session = Session::new(SessionRecord::new());
        assert!(session.is_empty());
        session.insert("visits", 2).unwrap();
        assert!(session.contains_key("visits"));
        assert_eq!(session.get_value("visits"), Some(json!(2)));
        assert_eq!(session.get::<String>("visits"), None);
        session.with_mut(|rec| {
            rec.insert("extra", true);
        });
        assert_eq!(session.snapshot().len(), 2);
        assert_eq!(session.remove("visits"), Some(json!(2)));
        session.clear();
        assert!(session.is_empty());
    }

    #[tokio::test]
    async fn extractor_rejects_without_layer() {
        let app = Router::new().route("/", get(|_session: Session| async { "ok" }));
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
