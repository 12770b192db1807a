use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Sync client parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// How long a request waits for its reply
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// TTL for cache entries written by live updates and fetches
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    /// TTL for cache entries restored from the offline snapshot, counted from
    /// the snapshot timestamp
    #[serde(default = "default_snapshot_ttl_ms")]
    pub snapshot_ttl_ms: u64,
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_cache_ttl_ms() -> u64 {
    5 * 60 * 1_000
}

fn default_snapshot_ttl_ms() -> u64 {
    24 * 60 * 60 * 1_000
}

fn default_storage_key() -> String {
    "beacon-offline-snapshot".to_string()
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from(".beacon")
}

fn default_outbound_capacity() -> usize {
    1_024
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            cache_ttl_ms: default_cache_ttl_ms(),
            snapshot_ttl_ms: default_snapshot_ttl_ms(),
            storage_key: default_storage_key(),
            storage_dir: default_storage_dir(),
            outbound_capacity: default_outbound_capacity(),
        }
    }
}

impl SyncConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_millis(self.snapshot_ttl_ms)
    }
}
