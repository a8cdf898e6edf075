pub mod incoming_request_handler;
pub mod local_state;
pub mod node;

use crate::config::Config;
use crate::networking::message_dispatcher::DispatchError;
use crate::storage::file_store::StoreError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PeerError {
    #[error("File '{0}' not found in the cluster")]
    NotFound(String),
    #[error("{address} no longer holds '{file}'")]
    StaleHolder { address: String, file: String },
    #[error("No cached copy of '{0}' to refresh")]
    PreconditionMissing(String),
    #[error("Unreachable: {0}")]
    Unreachable(#[from] DispatchError),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl PeerError {
    /// Failures worth another attempt after a backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            PeerError::StaleHolder { .. } => true,
            PeerError::Unreachable(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Tunables of a peer node, taken from `Config`.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerSettings {
    pub sync_interval: Duration,
    pub fetch_attempts: u32,
    pub retry_backoff: Duration,
}

impl PeerSettings {
    pub fn from_config(config: &Config) -> Self {
        PeerSettings {
            sync_interval: config.sync_interval(),
            fetch_attempts: config.fetch_attempts.max(1),
            retry_backoff: config.retry_backoff(),
        }
    }
}
