//! Common types, protocol definitions, and errors shared across the encrypted
//! session crates.

pub mod error;
pub mod protocol;

pub use error::SessionError;
pub use protocol::SessionRecord;
