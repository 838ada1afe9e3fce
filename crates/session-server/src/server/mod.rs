//! HTTP surface of the session server.

pub mod handlers;
pub mod router;
pub mod state;
