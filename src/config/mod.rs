//! Typed configuration from environment variables.
//!
//! Loads once at startup. Queue tuning (retry ceiling, backoff base,
//! polling, leases) lives in the settings file, see [`settings`].

pub mod settings;

pub use settings::Settings;

use crate::error::{Error, Result};
use std::path::PathBuf;

const DEFAULT_DATABASE_URL: &str = "sqlite://queuectl.db";
const DEFAULT_SETTINGS_PATH: &str = "queuectl.toml";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub settings_path: PathBuf,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: var_or("DATABASE_URL", DEFAULT_DATABASE_URL)?,
            settings_path: PathBuf::from(var_or("QUEUECTL_SETTINGS", DEFAULT_SETTINGS_PATH)?),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok().filter(|v| !v.is_empty()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn var_or(name: &str, default: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if value.trim().is_empty() => Err(Error::Config(format!(
            "environment variable {name} is set but empty"
        ))),
        Ok(value) => Ok(value),
        Err(_) => Ok(default.to_string()),
    }
}
