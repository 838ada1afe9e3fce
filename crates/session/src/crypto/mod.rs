//! Session envelope cryptography.
//!
//! This module is intentionally free of HTTP dependencies. It provides key
//! derivation, the AES cipher drivers, and the IV interleave framing used by
//! the session codec.
//!
//! # Envelope format
//!
//! ```text
//! base64( [tag] [c0 v0 c1 v1 ... c(n-1) v(n-1)] [c(n) ... c(len-1)] )
//! ```
//!
//! `v` is the IV (`n` = the cipher's native IV length), `c` the ciphertext and
//! `tag` the authentication tag of GCM/CCM modes. There are no length fields:
//! the IV and tag lengths follow from the configured cipher.

pub mod cipher;
pub mod interleave;
pub mod kdf;

pub use cipher::{CipherSpec, Sealed};
pub use kdf::{derive_key, DerivedKey};
