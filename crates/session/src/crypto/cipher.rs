//! AES encryption and decryption of serialised session records.
//!
//! Supported ciphers are named the OpenSSL way, `aes-<bits>-<mode>`:
//!
//! | mode | IV | tag |
//! |------|----|-----|
//! | `cbc` | 16 bytes | none (PKCS#7 padding) |
//! | `gcm` | 12 bytes | 12..=16 bytes |
//! | `ccm` | 12 bytes | even, 4..=16 bytes |
//!
//! Authenticated modes run with empty associated data and keep the tag
//! detached so the envelope layer can place it in front of the payload.

use std::fmt;

use aes::{Aes128, Aes192, Aes256};
use aes_gcm::{
    aead::{
        consts::{U10, U12, U13, U14, U15, U16, U4, U6, U8},
        generic_array::{typenum::Unsigned, GenericArray},
        rand_core::RngCore,
        AeadInPlace, KeyInit, OsRng,
    },
    AesGcm,
};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use ccm::Ccm;
use common::SessionError;

/// Default authentication tag length for GCM/CCM modes.
pub const DEFAULT_TAG_LEN: usize = 16;

/// AES key size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyBits {
    Aes128,
    Aes192,
    Aes256,
}

/// Block cipher mode of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Cbc,
    Gcm,
    Ccm,
}

/// A resolved cipher name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherSpec {
    bits: KeyBits,
    mode: Mode,
}

impl CipherSpec {
    /// Resolve an OpenSSL-style cipher name such as `aes-256-cbc`.
    ///
    /// Matching is case-insensitive.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnsupportedCipher`] for any other name.
    pub fn from_name(name: &str) -> Result<Self, SessionError> {
        let unsupported = || SessionError::UnsupportedCipher(name.to_owned());
        let lower = name.trim().to_ascii_lowercase();
        let mut parts = lower.split('-');

        let (Some("aes"), Some(bits), Some(mode), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(unsupported());
        };

        let bits = match bits {
            "128" => KeyBits::Aes128,
            "192" => KeyBits::Aes192,
            "256" => KeyBits::Aes256,
            _ => return Err(unsupported()),
        };
        let mode = match mode {
            "cbc" => Mode::Cbc,
            "gcm" => Mode::Gcm,
            "ccm" => Mode::Ccm,
            _ => return Err(unsupported()),
        };
        Ok(Self { bits, mode })
    }

    /// Key length in bytes.
    pub fn key_len(&self) -> usize {
        match self.bits {
            KeyBits::Aes128 => 16,
            KeyBits::Aes192 => 24,
            KeyBits::Aes256 => 32,
        }
    }

    /// Native IV (nonce) length in bytes.
    pub fn iv_len(&self) -> usize {
        match self.mode {
            Mode::Cbc => 16,
            Mode::Gcm | Mode::Ccm => 12,
        }
    }

    /// `true` for modes that produce an authentication tag.
    pub fn is_authenticated(&self) -> bool {
        matches!(self.mode, Mode::Gcm | Mode::Ccm)
    }

    /// Whether the mode can produce a `tag_len`-byte tag. Always `true` for CBC,
    /// which ignores the tag length.
    pub fn supports_tag_len(&self, tag_len: usize) -> bool {
        match self.mode {
            Mode::Cbc => true,
            Mode::Gcm => (12..=16).contains(&tag_len),
            Mode::Ccm => (4..=16).contains(&tag_len) && tag_len % 2 == 0,
        }
    }
}

impl fmt::Display for CipherSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits = match self.bits {
            KeyBits::Aes128 => 128,
            KeyBits::Aes192 => 192,
            KeyBits::Aes256 => 256,
        };
        let mode = match self.mode {
            Mode::Cbc => "cbc",
            Mode::Gcm => "gcm",
            Mode::Ccm => "ccm",
        };
        write!(f, "aes-{bits}-{mode}")
    }
}

// ---------------------------------------------------------------------------
// Tag-length dispatch
// ---------------------------------------------------------------------------

// The aead crates fix the tag size at the type level, so a runtime tag length
// picks one concrete cipher type per supported size.

macro_rules! gcm_by_tag {
    ($aes:ty, $tag_len:expr, $f:ident($($arg:expr),*)) => {
        match $tag_len {
            12 => $f::<AesGcm<$aes, U12, U12>>($($arg),*),
            13 => $f::<AesGcm<$aes, U12, U13>>($($arg),*),
            14 => $f::<AesGcm<$aes, U12, U14>>($($arg),*),
            15 => $f::<AesGcm<$aes, U12, U15>>($($arg),*),
            16 => $f::<AesGcm<$aes, U12, U16>>($($arg),*),
            n => Err(unsupported_tag_len("gcm", n)),
        }
    };
}

macro_rules! ccm_by_tag {
    ($aes:ty, $tag_len:expr, $f:ident($($arg:expr),*)) => {
        match $tag_len {
            4 => $f::<Ccm<$aes, U4, U12>>($($arg),*),
            6 => $f::<Ccm<$aes, U6, U12>>($($arg),*),
            8 => $f::<Ccm<$aes, U8, U12>>($($arg),*),
            10 => $f::<Ccm<$aes, U10, U12>>($($arg),*),
            12 => $f::<Ccm<$aes, U12, U12>>($($arg),*),
            14 => $f::<Ccm<$aes, U14, U12>>($($arg),*),
            16 => $f::<Ccm<$aes, U16, U12>>($($arg),*),
            n => Err(unsupported_tag_len("ccm", n)),
        }
    };
}

fn unsupported_tag_len(mode: &str, tag_len: usize) -> SessionError {
    SessionError::CipherFailure(format!("unsupported {mode} tag length {tag_len}"))
}

/// Output of [`encrypt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub iv: Vec<u8>,
    /// Present for authenticated modes only.
    pub tag: Option<Vec<u8>>,
}

/// Encrypt `plaintext` under `key` with a fresh random IV.
///
/// `tag_len` is ignored for CBC.
///
/// # Errors
///
/// Returns [`SessionError::CipherFailure`] if the key has the wrong length, the
/// tag length is not supported by the mode, or the AEAD transform fails.
pub fn encrypt(
    spec: &CipherSpec,
    key: &[u8],
    plaintext: &[u8],
    tag_len: usize,
) -> Result<Sealed, SessionError> {
    let mut iv = vec![0u8; spec.iv_len()];
    OsRng.fill_bytes(&mut iv);

    let (ciphertext, tag) = match spec.mode {
        Mode::Cbc => {
            let ciphertext = match spec.bits {
                KeyBits::Aes128 => cbc_seal::<cbc::Encryptor<Aes128>>(key, &iv, plaintext)?,
                KeyBits::Aes192 => cbc_seal::<cbc::Encryptor<Aes192>>(key, &iv, plaintext)?,
                KeyBits::Aes256 => cbc_seal::<cbc::Encryptor<Aes256>>(key, &iv, plaintext)?,
            };
            (ciphertext, None)
        }
        Mode::Gcm => {
            let (ciphertext, tag) = match spec.bits {
                KeyBits::Aes128 => gcm_by_tag!(Aes128, tag_len, aead_seal(key, &iv, plaintext))?,
                KeyBits::Aes192 => gcm_by_tag!(Aes192, tag_len, aead_seal(key, &iv, plaintext))?,
                KeyBits::Aes256 => gcm_by_tag!(Aes256, tag_len, aead_seal(key, &iv, plaintext))?,
            };
            (ciphertext, Some(tag))
        }
        Mode::Ccm => {
            let (ciphertext, tag) = match spec.bits {
                KeyBits::Aes128 => ccm_by_tag!(Aes128, tag_len, aead_seal(key, &iv, plaintext))?,
                KeyBits::Aes192 => ccm_by_tag!(Aes192, tag_len, aead_seal(key, &iv, plaintext))?,
                KeyBits::Aes256 => ccm_by_tag!(Aes256, tag_len, aead_seal(key, &iv, plaintext))?,
            };
            (ciphertext, Some(tag))
        }
    };

    Ok(Sealed {
        ciphertext,
        iv,
        tag,
    })
}

/// Decrypt `ciphertext` produced by [`encrypt`].
///
/// For authenticated modes `tag` must be the tag produced at encryption time;
/// its length selects the expected tag size.
///
/// # Errors
///
/// Returns [`SessionError::CipherFailure`] (message prefixed `bad decrypt`) on
/// wrong key or IV length, bad padding, a missing tag or a tag mismatch.
pub fn decrypt(
    spec: &CipherSpec,
    key: &[u8],
    ciphertext: &[u8],
    iv: &[u8],
    tag: Option<&[u8]>,
) -> Result<Vec<u8>, SessionError> {
    match spec.mode {
        Mode::Cbc => match spec.bits {
            KeyBits::Aes128 => cbc_open::<cbc::Decryptor<Aes128>>(key, iv, ciphertext),
            KeyBits::Aes192 => cbc_open::<cbc::Decryptor<Aes192>>(key, iv, ciphertext),
            KeyBits::Aes256 => cbc_open::<cbc::Decryptor<Aes256>>(key, iv, ciphertext),
        },
        Mode::Gcm => {
            let tag = required_tag(spec, tag)?;
            match spec.bits {
                KeyBits::Aes128 => {
                    gcm_by_tag!(Aes128, tag.len(), aead_open(key, iv, ciphertext, tag))
                }
                KeyBits::Aes192 => {
                    gcm_by_tag!(Aes192, tag.len(), aead_open(key, iv, ciphertext, tag))
                }
                KeyBits::Aes256 => {
                    gcm_by_tag!(Aes256, tag.len(), aead_open(key, iv, ciphertext, tag))
                }
            }
        }
        Mode::Ccm => {
            let tag = required_tag(spec, tag)?;
            match spec.bits {
                KeyBits::Aes128 => {
                    ccm_by_tag!(Aes128, tag.len(), aead_open(key, iv, ciphertext, tag))
                }
                KeyBits::Aes192 => {
                    ccm_by_tag!(Aes192, tag.len(), aead_open(key, iv, ciphertext, tag))
                }
                KeyBits::Aes256 => {
                    ccm_by_tag!(Aes256, tag.len(), aead_open(key, iv, ciphertext, tag))
                }
            }
        }
    }
}

/// The tag of an authenticated envelope, checked against the mode.
fn required_tag<'a>(spec: &CipherSpec, tag: Option<&'a [u8]>) -> Result<&'a [u8], SessionError> {
    let tag = tag.ok_or_else(|| SessionError::bad_decrypt("missing authentication tag"))?;
    if !spec.supports_tag_len(tag.len()) {
        return Err(SessionError::bad_decrypt(format!(
            "unsupported tag length {}",
            tag.len()
        )));
    }
    Ok(tag)
}

// ---------------------------------------------------------------------------
// Cipher drivers
// ---------------------------------------------------------------------------

fn cbc_seal<E>(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, SessionError>
where
    E: KeyIvInit + BlockEncryptMut,
{
    let encryptor = E::new_from_slices(key, iv)
        .map_err(|_| SessionError::CipherFailure("invalid key or iv length".into()))?;
    Ok(encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

fn cbc_open<D>(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, SessionError>
where
    D: KeyIvInit + BlockDecryptMut,
{
    let decryptor = D::new_from_slices(key, iv)
        .map_err(|_| SessionError::bad_decrypt("invalid key or iv length"))?;
    decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| SessionError::bad_decrypt("invalid padding"))
}

fn aead_seal<A>(
    key: &[u8],
    iv: &[u8],
    plaintext: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), SessionError>
where
    A: KeyInit + AeadInPlace,
{
    let cipher = A::new_from_slice(key)
        .map_err(|_| SessionError::CipherFailure("invalid key length".into()))?;
    if iv.len() != <A::NonceSize as Unsigned>::USIZE {
        return Err(SessionError::CipherFailure("invalid iv length".into()));
    }

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(iv), b"", &mut buffer)
        .map_err(|_| SessionError::CipherFailure("aead encryption failed".into()))?;
    Ok((buffer, tag.to_vec()))
}

fn aead_open<A>(
    key: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> Result<Vec<u8>, SessionError>
where
    A: KeyInit + AeadInPlace,
{
    let cipher =
        A::new_from_slice(key).map_err(|_| SessionError::bad_decrypt("invalid key length"))?;
    if iv.len() != <A::NonceSize as Unsigned>::USIZE {
        return Err(SessionError::bad_decrypt("invalid iv length"));
    }
    if tag.len() != <A::TagSize as Unsigned>::USIZE {
        return Err(SessionError::bad_decrypt("invalid tag length"));
    }

    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(iv),
            b"",
            &mut buffer,
            GenericArray::from_slice(tag),
        )
        .map_err(|_| SessionError::bad_decrypt("authentication tag mismatch"))?;
    Ok(buffer)
}
