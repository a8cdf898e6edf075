use crate::constants::{
    DEFAULT_ADVERTISE_HOST, DEFAULT_COORDINATOR_ADDRESS, DEFAULT_FETCH_ATTEMPTS,
    DEFAULT_REQUEST_TIMEOUT_MILLISECONDS, DEFAULT_RETRY_BACKOFF_MILLISECONDS,
    DEFAULT_SYNC_INTERVAL_S,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Runtime settings shared by the coordinator and peer binaries.
/// Every key is optional in the YAML file and falls back to the defaults in `constants`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub coordinator_address: String,
    pub advertise_host: String,
    pub sync_interval_s: u64,
    pub request_timeout_ms: u64,
    pub fetch_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            coordinator_address: DEFAULT_COORDINATOR_ADDRESS.to_string(),
            advertise_host: DEFAULT_ADVERTISE_HOST.to_string(),
            sync_interval_s: DEFAULT_SYNC_INTERVAL_S,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MILLISECONDS,
            fetch_attempts: DEFAULT_FETCH_ATTEMPTS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MILLISECONDS,
        }
    }
}

impl Config {
    pub fn parse_from_file(file_path: impl AsRef<Path>) -> Result<Self> {
        let file_path = file_path.as_ref();
        let content = std::fs::read_to_string(file_path)
            .with_context(|| format!("Failed to read config file {:?}", file_path))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", file_path))?;
        Ok(config)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_s)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}
