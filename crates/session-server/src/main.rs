//! `session-server` — demonstration binary for encrypted cookie sessions.
//!
//! Startup sequence:
//! 1. Load and validate [`config::Config`] and the `SESSION_*` settings.
//! 2. Initialise structured JSON logging.
//! 3. Build the session layer and the Axum router, then serve.

mod config;
mod server;
mod telemetry;

use anyhow::Result;
use encrypted_session::{EncryptedCookieLayer, SessionSettings};
use tracing::info;

use server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let (cfg, settings) = config::Config::from_env()
        .and_then(|cfg| Ok((cfg, SessionSettings::from_env()?)))
        .map_err(|e| {
            // Telemetry is not yet up; write to stderr directly.
            eprintln!("ERROR: session-server configuration invalid: {e:#}");
            e
        })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init(&cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_port = cfg.listen_port,
        cipher = %settings.cipher,
        cookie = %settings.cookie_name,
        "session-server starting"
    );

    // -----------------------------------------------------------------------
    // 3. HTTP server
    // -----------------------------------------------------------------------
    let sessions = EncryptedCookieLayer::from_settings(&settings)?;
    let router = server::router::build(AppState::new(settings.cipher.as_str()), sessions);

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.listen_port).into();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "listening");
    axum::serve(listener, router).await?;

    Ok(())
}
