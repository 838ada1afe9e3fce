//! Encrypted sessions for axum/tower services.
//!
//! A session record is serialised to JSON, encrypted with AES (CBC, GCM or
//! CCM) under a PBKDF2-derived key, and carried as a single base64 envelope,
//! either in a cookie ([`EncryptedCookieLayer`]) or inside one field of a
//! session owned by another layer ([`FieldCarrier`], [`FieldSessionLayer`]).
//!
//! Cryptographic failures never reach the handler: they are logged as
//! security warnings and the request continues with an empty session.
//!
//! ```no_run
//! use axum::{routing::get, Router};
//! use encrypted_session::{CodecConfig, EncryptedCookieLayer, Session};
//!
//! async fn visits(session: Session) -> String {
//!     let n = session.get::<u64>("visits").unwrap_or(0) + 1;
//!     let _ = session.insert("visits", n);
//!     n.to_string()
//! }
//!
//! # fn build() -> Result<Router, common::SessionError> {
//! let config = CodecConfig::new("change me")?.with_cipher("aes-256-gcm");
//! let app: Router = Router::new()
//!     .route("/", get(visits))
//!     .layer(EncryptedCookieLayer::new(config));
//! # Ok(app)
//! # }
//! ```

pub mod carrier;
pub mod config;
pub mod crypto;
pub mod session;

#[cfg(test)]
mod test_support;

pub use carrier::{EncryptedCookieLayer, FieldCarrier, FieldSessionLayer, Session};
pub use common::{SessionError, SessionRecord};
pub use config::{CodecConfig, CookieOptions, FieldOptions, SessionSettings};
pub use session::{Padding, SessionCodec};
