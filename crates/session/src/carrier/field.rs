//! Field carrier: keeps the session encrypted inside one field of a session
//! record that some other layer already transports.

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::http::Request;
use common::SessionRecord;
use serde_json::Value;
use tower::{Layer, Service};
use tracing::debug;

use super::Session;
use crate::config::{CodecConfig, FieldOptions, SessionSettings};
use crate::crypto::CipherSpec;
use crate::session::{codec::cipher_failed, Padding, SessionCodec};

/// Encrypts a whole record into `data_key` and back.
///
/// The cipher is resolved once. If it is not supported, one warning is logged
/// and the carrier stays disabled: records pass through untouched.
#[derive(Debug, Clone)]
pub struct FieldCarrier {
    codec: SessionCodec,
    options: FieldOptions,
    enabled: bool,
}

impl FieldCarrier {
    pub fn new(config: CodecConfig, options: FieldOptions) -> Self {
        let enabled = match CipherSpec::from_name(config.cipher()) {
            Ok(_) => true,
            Err(e) => {
                cipher_failed(&e);
                false
            }
        };
        Self {
            codec: SessionCodec::new(config),
            options,
            enabled,
        }
    }

    /// # Errors
    ///
    /// Returns an error if the codec configuration is invalid.
    pub fn from_settings(settings: &SessionSettings) -> anyhow::Result<Self> {
        Ok(Self::new(settings.codec_config()?, settings.field_options()))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Replace the record with the contents of its encrypted field.
    ///
    /// The envelope field is always consumed. If it does not decrypt, the
    /// remaining fields are left as they were.
    pub fn load(&self, record: &mut SessionRecord) {
        if !self.enabled || record.is_empty() {
            return;
        }
        let envelope = record.remove(&self.options.data_key);
        let decrypted = self
            .codec
            .decode(envelope.as_ref().and_then(Value::as_str));
        if decrypted.is_empty() {
            return;
        }
        record.clear();
        record.update(decrypted);
    }

    /// Encrypt the record into its envelope field.
    ///
    /// Afterwards the record holds only the envelope and, if it was set, the
    /// id field. On failure the record is left in plaintext.
    pub fn store(&self, record: &mut SessionRecord) {
        if !self.enabled || record.is_empty() {
            return;
        }
        let Some(envelope) = self.codec.encode(record, Padding::Keep) else {
            return;
        };
        let id = record.remove(&self.options.id_key);
        record.clear();
        record.insert(self.options.data_key.clone(), envelope);
        if let Some(id) = id {
            record.insert(self.options.id_key.clone(), id);
        }
    }

    /// Run `f` on the decrypted record and encrypt it again afterwards.
    pub fn around<R>(
        &self,
        record: &mut SessionRecord,
        f: impl FnOnce(&mut SessionRecord) -> R,
    ) -> R {
        self.load(record);
        let out = f(record);
        self.store(record);
        out
    }
}

/// [`Layer`] applying a [`FieldCarrier`] to the request's [`Session`].
///
/// Must sit inside the layer that provides the session.
#[derive(Debug, Clone)]
pub struct FieldSessionLayer {
    carrier: Arc<FieldCarrier>,
}

impl FieldSessionLayer {
    pub fn new(carrier: FieldCarrier) -> Self {
        Self {
            carrier: Arc::new(carrier),
        }
    }
}

impl<S> Layer<S> for FieldSessionLayer {
    type Service = FieldSessionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        FieldSessionService {
            inner,
            carrier: self.carrier.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldSessionService<S> {
    inner: S,
    carrier: Arc<FieldCarrier>,
}

impl<S, ReqBody> Service<Request<ReqBody>> for FieldSessionService<S>
where
    S: Service<Request<ReqBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let session = req.extensions().get::<Session>().cloned();
        let carrier = self.carrier.clone();
        if let Some(session) = &session {
            session.with_mut(|record| carrier.load(record));
        } else {
            debug!("no session on request, field carrier skipped");
        }

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let response = inner.call(req).await?;
            if let Some(session) = session {
                session.with_mut(|record| carrier.store(record));
            }
            Ok(response)
        })
    }
}
