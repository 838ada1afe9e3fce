//! Key derivation: PBKDF2-HMAC-SHA1 over the shared secret.

use sha1::Sha1;

/// Cipher key derived for a single encrypt or decrypt call.
///
/// Never cached; the memory is overwritten with zeroes on drop.
#[derive(Clone)]
pub struct DerivedKey(Vec<u8>);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey([REDACTED])")
    }
}

/// Derive a `key_len`-byte cipher key from `secret`.
///
/// With a salt, runs PBKDF2 with an HMAC-SHA1 PRF for `rounds` iterations.
/// Without one, the secret is the key: zero-padded or truncated to `key_len`.
pub fn derive_key(secret: &[u8], salt: Option<&[u8]>, rounds: u32, key_len: usize) -> DerivedKey {
    let mut key = vec![0u8; key_len];
    match salt {
        Some(salt) => pbkdf2::pbkdf2_hmac::<Sha1>(secret, salt, rounds, &mut key),
        None => {
            let n = secret.len().min(key_len);
            key[..n].copy_from_slice(&secret[..n]);
        }
    }
    DerivedKey(key)
}
