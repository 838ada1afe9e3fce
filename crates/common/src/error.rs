//! Common error types shared across crates.

use thiserror::Error;

/// Errors produced while encoding or decoding a session envelope.
///
/// Only [`SessionError::InvalidConfig`] is fatal. Every other variant is caught
/// at the codec boundary and turned into "no session data":
/// - decode side → an empty record
/// - encode side → no envelope emitted
#[derive(Debug, Error)]
pub enum SessionError {
    /// The configured cipher name is not one the codec can drive.
    #[error("unsupported cipher: {0}")]
    UnsupportedCipher(String),

    /// The cipher transform failed: bad padding, tag mismatch, truncated input.
    #[error("{0}")]
    CipherFailure(String),

    /// The decrypted bytes do not parse as a session record.
    #[error("malformed session data: {0}")]
    Deserialization(String),

    /// The codec was configured with missing or invalid options.
    #[error("invalid session configuration: {0}")]
    InvalidConfig(String),
}

impl SessionError {
    /// Shorthand for a decrypt-side [`SessionError::CipherFailure`].
    ///
    /// Every decrypt failure message starts with `bad decrypt` so operators can
    /// grep for one pattern regardless of the cipher mode in use.
    pub fn bad_decrypt(detail: impl std::fmt::Display) -> Self {
        SessionError::CipherFailure(format!("bad decrypt: {detail}"))
    }

    /// Returns `true` for the per-request kinds that degrade to "no session".
    pub fn is_crypto(&self) -> bool {
        !matches!(self, SessionError::InvalidConfig(_))
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::Deserialization(e.to_string())
    }
}
