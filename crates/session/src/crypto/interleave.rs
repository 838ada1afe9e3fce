//! IV interleaving and tag framing for the raw (pre-base64) envelope.
//!
//! The IV is not stored as a separate field. Its bytes alternate with the
//! leading ciphertext bytes instead:
//!
//! ```text
//! ciphertext  c0 c1 c2 ... c(n-1) c(n) ...
//! iv          v0 v1 v2 ... v(n-1)
//! region      c0 v0 c1 v1 c2 v2 ... c(n-1) v(n-1) c(n) ...
//! ```
//!
//! Existing sessions only decode if this layout is reproduced byte for byte.
//!
//! When the ciphertext is shorter than the IV (tiny records under GCM/CCM) the
//! pairs stop with the ciphertext and the remaining IV bytes follow. The pair
//! count on decode is then `min(n, len - n)`, which reduces to `n` in the
//! common case.

use common::SessionError;

use super::cipher::Sealed;

/// Merge `iv` into the front of `ciphertext`.
pub fn interleave(ciphertext: &[u8], iv: &[u8]) -> Vec<u8> {
    let pairs = ciphertext.len().min(iv.len());
    let mut out = Vec::with_capacity(ciphertext.len() + iv.len());
    for (c, v) in ciphertext.iter().zip(iv).take(pairs) {
        out.push(*c);
        out.push(*v);
    }
    out.extend_from_slice(&ciphertext[pairs..]);
    out.extend_from_slice(&iv[pairs..]);
    out
}

/// Split an interleaved region back into `(ciphertext, iv)`.
///
/// # Errors
///
/// Returns a `bad decrypt` [`SessionError::CipherFailure`] if `region` is too
/// short to hold an `iv_len`-byte IV.
pub fn deinterleave(region: &[u8], iv_len: usize) -> Result<(Vec<u8>, Vec<u8>), SessionError> {
    if region.len() < iv_len {
        return Err(SessionError::bad_decrypt("envelope shorter than the iv"));
    }
    let pairs = iv_len.min(region.len() - iv_len);
    let (head, tail) = region.split_at(pairs * 2);

    let mut ciphertext = Vec::with_capacity(region.len() - iv_len);
    let mut iv = Vec::with_capacity(iv_len);
    for pair in head.chunks_exact(2) {
        ciphertext.push(pair[0]);
        iv.push(pair[1]);
    }
    if pairs == iv_len {
        ciphertext.extend_from_slice(tail);
    } else {
        iv.extend_from_slice(tail);
    }
    Ok((ciphertext, iv))
}

/// Lay out a sealed record as `[tag][interleaved region]`.
pub fn pack(sealed: &Sealed) -> Vec<u8> {
    let region = interleave(&sealed.ciphertext, &sealed.iv);
    match &sealed.tag {
        Some(tag) => {
            let mut out = Vec::with_capacity(tag.len() + region.len());
            out.extend_from_slice(tag);
            out.extend_from_slice(&region);
            out
        }
        None => region,
    }
}

/// Reverse of [`pack`]. Pass `tag_len = 0` for unauthenticated modes.
///
/// # Errors
///
/// Returns a `bad decrypt` [`SessionError::CipherFailure`] if `raw` is too
/// short for the tag and IV.
pub fn unpack(raw: &[u8], iv_len: usize, tag_len: usize) -> Result<Sealed, SessionError> {
    if raw.len() < tag_len {
        return Err(SessionError::bad_decrypt("envelope shorter than the tag"));
    }
    let (tag, region) = raw.split_at(tag_len);
    let (ciphertext, iv) = deinterleave(region, iv_len)?;
    Ok(Sealed {
        ciphertext,
        iv,
        tag: (tag_len > 0).then(|| tag.to_vec()),
    })
}
