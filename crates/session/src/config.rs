//! Session codec and carrier configuration.
//!
//! [`SessionSettings`] is the raw, deserialisable form read from `SESSION_*`
//! environment variables. It converts into the validated, immutable
//! [`CodecConfig`], [`CookieOptions`] and [`FieldOptions`] that the codec and
//! carriers share across requests.
//!
//! There is no default secret or salt: a missing secret is a startup error.

use std::time::Duration;

use anyhow::{Context, Result};
use common::SessionError;
use serde::Deserialize;

use crate::crypto::cipher::{CipherSpec, DEFAULT_TAG_LEN};

/// Cipher used when none is configured.
pub const DEFAULT_CIPHER: &str = "aes-256-cbc";

/// PBKDF2 iteration count used when none is configured.
pub const DEFAULT_ROUNDS: u32 = 2000;

// ---------------------------------------------------------------------------
// Secret
// ---------------------------------------------------------------------------

/// Shared secret material.
///
/// The bytes are overwritten with zeroes on drop and never printed.
#[derive(Clone)]
pub struct Secret(Vec<u8>);

impl Secret {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

// ---------------------------------------------------------------------------
// Codec configuration
// ---------------------------------------------------------------------------

/// Immutable configuration of the session codec.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    cipher: String,
    secret: Secret,
    salt: Option<Vec<u8>>,
    rounds: u32,
    tag_len: usize,
}

impl CodecConfig {
    /// Create a configuration with the default cipher, rounds and tag length
    /// and no salt.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConfig`] if `secret` is empty.
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self, SessionError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(SessionError::InvalidConfig(
                "a session secret is required".into(),
            ));
        }
        Ok(Self {
            cipher: DEFAULT_CIPHER.into(),
            secret: Secret(secret),
            salt: None,
            rounds: DEFAULT_ROUNDS,
            tag_len: DEFAULT_TAG_LEN,
        })
    }

    /// Set the cipher name. Unknown names are reported per call, not here.
    pub fn with_cipher(mut self, cipher: impl Into<String>) -> Self {
        self.cipher = cipher.into();
        self
    }

    /// Enable PBKDF2 key derivation with `salt`.
    pub fn with_salt(mut self, salt: impl Into<Vec<u8>>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.rounds = rounds;
        self
    }

    pub fn with_tag_len(mut self, tag_len: usize) -> Self {
        self.tag_len = tag_len;
        self
    }

    pub fn cipher(&self) -> &str {
        &self.cipher
    }

    pub fn secret(&self) -> &Secret {
        &self.secret
    }

    pub fn salt(&self) -> Option<&[u8]> {
        self.salt.as_deref()
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn tag_len(&self) -> usize {
        self.tag_len
    }

    /// Check the option combination.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConfig`] for zero rounds with a salt, a
    /// zero tag length, or a tag length the configured mode cannot produce.
    /// An unrecognised cipher name is not checked here.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.salt.is_some() && self.rounds == 0 {
            return Err(SessionError::InvalidConfig(
                "PBKDF2 rounds must be > 0".into(),
            ));
        }
        if self.tag_len == 0 {
            return Err(SessionError::InvalidConfig(
                "tag length must be > 0".into(),
            ));
        }
        if let Ok(spec) = CipherSpec::from_name(&self.cipher) {
            if !spec.supports_tag_len(self.tag_len) {
                return Err(SessionError::InvalidConfig(format!(
                    "tag length {} is not supported by {spec}",
                    self.tag_len
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Carrier options
// ---------------------------------------------------------------------------

/// Attributes of the session cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub name: String,
    /// Cookie domain. When unset the request host is used if it is a name.
    pub domain: Option<String>,
    pub path: String,
    pub http_only: bool,
    /// Lifetime from now; `None` makes it a browser-session cookie.
    pub expires: Option<Duration>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            name: default_cookie_name(),
            domain: None,
            path: "/".into(),
            http_only: false,
            expires: Some(Duration::from_secs(default_expires_secs())),
        }
    }
}

/// Keys used by the field carrier inside an existing session object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOptions {
    /// Field holding the encrypted envelope.
    pub data_key: String,
    /// Field preserved in plaintext alongside the envelope.
    pub id_key: String,
}

impl Default for FieldOptions {
    fn default() -> Self {
        Self {
            data_key: default_data_key(),
            id_key: "session_id".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Settings (environment)
// ---------------------------------------------------------------------------

/// Session settings as read from the environment.
///
/// Each field maps to `SESSION_<FIELD>`, e.g. `SESSION_SECRET`.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    /// Shared secret. **Required.**
    #[serde(default)]
    pub secret: String,

    /// PBKDF2 salt; without it the secret is used as the key directly.
    #[serde(default)]
    pub salt: Option<String>,

    #[serde(default = "default_rounds")]
    pub rounds: u32,

    #[serde(default = "default_cipher")]
    pub cipher: String,

    /// Authentication tag length for GCM/CCM ciphers.
    #[serde(default = "default_tag_len")]
    pub tag_len: usize,

    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    #[serde(default)]
    pub domain: Option<String>,

    #[serde(default)]
    pub http_only: bool,

    /// Cookie lifetime in seconds; `0` means a browser-session cookie.
    #[serde(default = "default_expires_secs")]
    pub expires_secs: u64,

    /// Field name used by the field carrier.
    #[serde(default = "default_data_key")]
    pub data_key: String,
}

fn default_rounds() -> u32 {
    DEFAULT_ROUNDS
}
fn default_cipher() -> String {
    DEFAULT_CIPHER.into()
}
fn default_tag_len() -> usize {
    DEFAULT_TAG_LEN
}
fn default_cookie_name() -> String {
    "session".into()
}
fn default_expires_secs() -> u64 {
    15 * 60
}
fn default_data_key() -> String {
    "edat".into()
}

impl SessionSettings {
    /// Load settings from `SESSION_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or the result is invalid.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::with_prefix("SESSION"))
            .build()
            .context("failed to build session configuration from environment")?;
        Self::from_config(cfg)
    }

    /// Deserialise and validate settings from an already built source.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialisation or validation fails.
    pub fn from_config(cfg: config::Config) -> Result<Self> {
        let s: SessionSettings = cfg
            .try_deserialize()
            .context("failed to deserialise session configuration")?;
        s.validate()?;
        Ok(s)
    }

    fn validate(&self) -> Result<()> {
        if self.secret.trim().is_empty() {
            anyhow::bail!("SESSION_SECRET is required and must not be empty");
        }
        if self.cookie_name.trim().is_empty() {
            anyhow::bail!("SESSION_COOKIE_NAME must not be empty");
        }
        if self.data_key.trim().is_empty() {
            anyhow::bail!("SESSION_DATA_KEY must not be empty");
        }
        self.codec_config()?;
        Ok(())
    }

    /// Build the codec configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret is empty or the rounds/tag length are invalid.
    pub fn codec_config(&self) -> Result<CodecConfig> {
        let mut codec = CodecConfig::new(self.secret.as_bytes())?
            .with_cipher(self.cipher.clone())
            .with_rounds(self.rounds)
            .with_tag_len(self.tag_len);
        if let Some(salt) = &self.salt {
            codec = codec.with_salt(salt.as_bytes());
        }
        codec.validate()?;
        Ok(codec)
    }

    pub fn cookie_options(&self) -> CookieOptions {
        CookieOptions {
            name: self.cookie_name.clone(),
            domain: self.domain.clone().filter(|d| !d.trim().is_empty()),
            path: "/".into(),
            http_only: self.http_only,
            expires: (self.expires_secs > 0).then(|| Duration::from_secs(self.expires_secs)),
        }
    }

    pub fn field_options(&self) -> FieldOptions {
        FieldOptions {
            data_key: self.data_key.clone(),
            ..FieldOptions::default()
        }
    }
}
