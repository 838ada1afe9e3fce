//! Telemetry initialisation for the session server: structured JSON logs.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Install the global JSON subscriber.
///
/// `RUST_LOG` takes precedence over `log_level`. Session cipher failures are
/// emitted at `WARN` by `encrypted_session`, so any level up to `warn` keeps
/// them visible.
///
/// # Errors
///
/// Returns an error if the subscriber has already been set.
pub fn init(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .json()
        .with_current_span(false)
        .with_target(true)
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise session-server tracing subscriber: {e}"))
}
