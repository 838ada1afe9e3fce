//! [`SessionCodec`]: session record ⇄ transportable envelope.

use std::sync::Arc;

use base64::{
    alphabet,
    engine::{
        general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD, STANDARD_NO_PAD},
        DecodePaddingMode,
    },
    Engine as _,
};
use common::{SessionError, SessionRecord};
use tracing::{debug, warn};

use crate::config::CodecConfig;
use crate::crypto::{cipher, derive_key, interleave, CipherSpec};

/// Accepts envelopes with or without trailing `=` padding.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Base64 padding of an encoded envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    /// Trailing `=` removed. Used for cookie values.
    Strip,
    /// Standard padded base64. Used when the envelope lives in a session field.
    Keep,
}

/// Encrypts session records into envelopes and back.
///
/// Cheap to clone; the configuration is shared and never mutated. The cipher
/// key is derived again on every call.
#[derive(Debug, Clone)]
pub struct SessionCodec {
    config: Arc<CodecConfig>,
}

impl SessionCodec {
    pub fn new(config: CodecConfig) -> Self {
        Self::from_shared(Arc::new(config))
    }

    pub fn from_shared(config: Arc<CodecConfig>) -> Self {
        Self { config }
    }

    /// Encode `record`, or return `None` when there is nothing to emit.
    ///
    /// An empty record yields `None` silently. Serialisation or cipher failures
    /// yield `None` after a security warning; plaintext is never returned.
    pub fn encode(&self, record: &SessionRecord, padding: Padding) -> Option<String> {
        if record.is_empty() {
            debug!("session record empty, nothing to encode");
            return None;
        }
        let sealed = serde_json::to_vec(record)
            .map_err(SessionError::from)
            .and_then(|plaintext| self.seal(&plaintext, padding));
        match sealed {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                cipher_failed(&e);
                None
            }
        }
    }

    /// Decode an envelope into a record.
    ///
    /// A missing or blank envelope is an empty record. Any decryption or
    /// deserialisation failure is logged and also yields an empty record.
    pub fn decode(&self, envelope: Option<&str>) -> SessionRecord {
        let Some(envelope) = envelope.filter(|e| !e.trim().is_empty()) else {
            return SessionRecord::new();
        };
        let record = self.open(envelope).and_then(|plaintext| {
            serde_json::from_slice::<SessionRecord>(&plaintext).map_err(SessionError::from)
        });
        match record {
            Ok(record) => record,
            Err(e) => {
                cipher_failed(&e);
                SessionRecord::new()
            }
        }
    }

    /// Encrypt raw bytes into a base64 envelope.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnsupportedCipher`] or
    /// [`SessionError::CipherFailure`].
    pub fn seal(&self, plaintext: &[u8], padding: Padding) -> Result<String, SessionError> {
        let spec = CipherSpec::from_name(self.config.cipher())?;
        let key = self.key_for(&spec);
        let sealed = cipher::encrypt(&spec, key.as_bytes(), plaintext, self.config.tag_len())?;
        let raw = interleave::pack(&sealed);
        Ok(match padding {
            Padding::Strip => STANDARD_NO_PAD.encode(raw),
            Padding::Keep => STANDARD.encode(raw),
        })
    }

    /// Decrypt a base64 envelope back into raw bytes.
    ///
    /// ASCII whitespace in the envelope is ignored, so line-wrapped base64 is
    /// accepted.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnsupportedCipher`] or a `bad decrypt`
    /// [`SessionError::CipherFailure`].
    pub fn open(&self, envelope: &str) -> Result<Vec<u8>, SessionError> {
        let spec = CipherSpec::from_name(self.config.cipher())?;
        let compact: String = envelope
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let raw = LENIENT
            .decode(compact)
            .map_err(|_| SessionError::bad_decrypt("envelope is not valid base64"))?;

        let tag_len = if spec.is_authenticated() {
            self.config.tag_len()
        } else {
            0
        };
        let sealed = interleave::unpack(&raw, spec.iv_len(), tag_len)?;
        let key = self.key_for(&spec);
        cipher::decrypt(
            &spec,
            key.as_bytes(),
            &sealed.ciphertext,
            &sealed.iv,
            sealed.tag.as_deref(),
        )
    }

    fn key_for(&self, spec: &CipherSpec) -> crate::crypto::DerivedKey {
        derive_key(
            self.config.secret().as_bytes(),
            self.config.salt(),
            self.config.rounds(),
            spec.key_len(),
        )
    }
}

/// Emit the single security warning for a failed session cipher operation.
pub(crate) fn cipher_failed(err: &SessionError) {
    warn!("SECURITY WARNING: session cipher failed: {err}");
}
