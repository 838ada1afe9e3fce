//! Configuration loading and validation for the session server.
//!
//! Server options come from unprefixed environment variables. Session options
//! (`SESSION_*`) are loaded by
//! [`encrypted_session::SessionSettings::from_env`].

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

/// Validated server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// TCP port to accept HTTP connections on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Tracing log level, used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_listen_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build session-server configuration")?;

        Self::from_source(cfg)
    }

    fn from_source(cfg: config::Config) -> Result<Self> {
        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise session-server configuration")?;

        c.validate()?;
        Ok(c)
    }

    fn validate(&self) -> Result<()> {
        if self.listen_port == 0 {
            anyhow::bail!("LISTEN_PORT must be a non-zero TCP port");
        }
        EnvFilter::try_new(&self.log_level)
            .with_context(|| format!("LOG_LEVEL {:?} is not a valid filter", self.log_level))?;
        Ok(())
    }
}
