//! Typed configuration from environment variables.
//!
//! Loads once at startup and fails fast on malformed values. Dispatcher
//! sizing comes from an optional TOML file (`SWITCHBOARD_CONFIG`) with
//! `SWITCHBOARD_*` environment overrides on top.

pub mod dispatch;

pub use dispatch::DispatchConfig;

use std::path::PathBuf;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct Config {
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    pub dispatch: DispatchConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let mut dispatch = match std::env::var("SWITCHBOARD_CONFIG") {
            Ok(path) => DispatchConfig::load(&PathBuf::from(path))?,
            Err(_) => DispatchConfig::default(),
        };
        dispatch.apply_env()?;
        dispatch.validate()?;

        Ok(Self {
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            dispatch,
        })
    }
}
