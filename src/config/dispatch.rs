//! Dispatcher sizing: queue capacities, worker counts, debounce window.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    /// Capacity of every queue (per channel, orchestrator, memory).
    pub queue_capacity: usize,
    /// Concurrent workers spawned for each routing key.
    pub workers_per_channel: usize,
    /// Size of the orchestrator pool; busy once all are occupied.
    pub orchestrator_workers: usize,
    /// Debounce window for coalesced messages. Zero disables coalescing.
    pub debounce_ms: u64,
    /// Upper bound on distinct routing keys. Channel queues are never reaped.
    pub max_channels: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            workers_per_channel: 5,
            orchestrator_workers: 2,
            debounce_ms: 2000,
            max_channels: 10_000,
        }
    }
}

impl DispatchConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("bad dispatch config: {e}")))
    }

    /// Load from a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read dispatch config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply `SWITCHBOARD_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(v) = parse_var("SWITCHBOARD_QUEUE_CAPACITY")? {
            self.queue_capacity = v;
        }
        if let Some(v) = parse_var("SWITCHBOARD_WORKERS_PER_CHANNEL")? {
            self.workers_per_channel = v;
        }
        if let Some(v) = parse_var("SWITCHBOARD_ORCHESTRATOR_WORKERS")? {
            self.orchestrator_workers = v;
        }
        if let Some(v) = parse_var("SWITCHBOARD_DEBOUNCE_MS")? {
            self.debounce_ms = v;
        }
        if let Some(v) = parse_var("SWITCHBOARD_MAX_CHANNELS")? {
            self.max_channels = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let non_zero = [
            ("queue_capacity", self.queue_capacity),
            ("workers_per_channel", self.workers_per_channel),
            ("orchestrator_workers", self.orchestrator_workers),
            ("max_channels", self.max_channels),
        ];
        for (name, value) in non_zero {
            if value == 0 {
                return Err(Error::Config(format!("{name} must be at least 1")));
            }
        }
        Ok(())
    }

    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("invalid {name}={raw}: {e}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = DispatchConfig::from_toml_str("workers_per_channel = 3\n").unwrap();
        assert_eq!(config.workers_per_channel, 3);
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.debounce_delay(), Duration::from_secs(2));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(DispatchConfig::from_toml_str("worker_count = 3\n").is_err());
    }

    #[test]
    fn zero_workers_fail_validation() {
        let config = DispatchConfig {
            orchestrator_workers: 0,
            ..DispatchConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("orchestrator_workers"));
    }

    #[test]
    fn zero_debounce_is_valid() {
        let config = DispatchConfig {
            debounce_ms: 0,
            ..DispatchConfig::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.debounce_delay().is_zero());
    }
}
