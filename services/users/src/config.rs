//! HTTP server settings
//!
//! Defaults are layered under `APP_*` environment variables with the
//! `config` crate, e.g. `APP_PORT=9000` or `APP_MAX_PAGE_SIZE=50`.

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

use crate::listing::MAX_LIMIT;

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// Port to bind
    pub port: u16,
    /// Largest page size a listing will return
    pub max_page_size: i64,
}

impl ServerConfig {
    /// Load the configuration from defaults and the environment
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", 8083_i64)?
            .set_default("max_page_size", MAX_LIMIT)?
            .add_source(Environment::with_prefix("APP"))
            .build()?
            .try_deserialize()
    }

    /// `host:port` pair for the listener
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
