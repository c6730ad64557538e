//! Agent configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the agent can start with zero
//! configuration for local development.

use std::path::PathBuf;
use std::time::Duration;

use pylon_shared::constants::{DEFAULT_UPLOADS_DIR, MAX_FILE_SIZE};

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Directory incoming blobs are written under, one sub-directory per
    /// conversation.
    /// Env: `PYLON_UPLOADS_DIR`
    /// Default: `./uploads`
    pub uploads_dir: PathBuf,

    /// Largest blob a client may announce, in bytes.
    /// Env: `PYLON_MAX_BLOB_SIZE`
    /// Default: 50 MiB
    pub max_blob_size: u64,

    /// Transfers untouched for this long are cleaned up by the sweep.
    /// Env: `PYLON_TRANSFER_IDLE_SECS`
    /// Default: `600`
    pub transfer_idle: Duration,

    /// How often the idle sweep runs.
    /// Env: `PYLON_SWEEP_INTERVAL_SECS`
    /// Default: `60`
    pub sweep_interval: Duration,

    /// Capacity of the outbound message queue.
    /// Env: `PYLON_OUTBOUND_BUFFER`
    /// Default: `256`
    pub outbound_buffer: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            uploads_dir: PathBuf::from(DEFAULT_UPLOADS_DIR),
            max_blob_size: MAX_FILE_SIZE as u64,
            transfer_idle: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(60),
            outbound_buffer: 256,
        }
    }
}

impl AgentConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = lookup("PYLON_UPLOADS_DIR") {
            if !dir.is_empty() {
                config.uploads_dir = PathBuf::from(dir);
            }
        }

        if let Some(n) = parse_positive(&lookup, "PYLON_MAX_BLOB_SIZE") {
            config.max_blob_size = n;
        }

        if let Some(secs) = parse_positive(&lookup, "PYLON_TRANSFER_IDLE_SECS") {
            config.transfer_idle = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_positive(&lookup, "PYLON_SWEEP_INTERVAL_SECS") {
            config.sweep_interval = Duration::from_secs(secs);
        }

        if let Some(n) = parse_positive(&lookup, "PYLON_OUTBOUND_BUFFER") {
            config.outbound_buffer = n as usize;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

fn parse_positive(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = AgentConfig::from_lookup(lookup(&[]));
        assert_eq!(config.uploads_dir, PathBuf::from("./uploads"));
        assert_eq!(config.max_blob_size, 50 * 1024 * 1024);
        assert_eq!(config.transfer_idle, Duration::from_secs(600));
    }

    #[test]
    fn test_overrides() {
        let config = AgentConfig::from_lookup(lookup(&[
            ("PYLON_UPLOADS_DIR", "/var/lib/pylon"),
            ("PYLON_MAX_BLOB_SIZE", "1024"),
            ("PYLON_SWEEP_INTERVAL_SECS", "5"),
        ]));
        assert_eq!(config.uploads_dir, PathBuf::from("/var/lib/pylon"));
        assert_eq!(config.max_blob_size, 1024);
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = AgentConfig::from_lookup(lookup(&[
            ("PYLON_MAX_BLOB_SIZE", "lots"),
            ("PYLON_OUTBOUND_BUFFER", "0"),
        ]));
        assert_eq!(config.max_blob_size, 50 * 1024 * 1024);
        assert_eq!(config.outbound_buffer, 256);
    }
}
