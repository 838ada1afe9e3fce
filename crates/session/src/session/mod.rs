//! Session codec: serialise, encrypt and frame a [`SessionRecord`] into a
//! single transportable string, and reverse it on the next request.
//!
//! All cryptographic and deserialisation failures stop here. They are logged
//! as security warnings and surface to callers as "no session data".
//!
//! [`SessionRecord`]: common::SessionRecord

pub mod codec;

pub use codec::{Padding, SessionCodec};
