use beacon_gateway::TransportKind;
use std::path::Path;
use thiserror::Error;

use super::types::BeaconConfigFile;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("transport.ws_url is required for the websocket transport")]
    MissingWsUrl,
    #[error("transport.base_url is required")]
    MissingBaseUrl,
    #[error("polling.interval_ms must be greater than zero")]
    InvalidInterval,
    #[error("{0} must be greater than zero")]
    InvalidTimeout(&'static str),
}

/// Load beacon configuration from a JSON file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<BeaconConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: BeaconConfigFile = serde_json::from_str(&content)?;
    Ok(config)
}

/// Load configuration from a JSON string
pub fn load_config_from_str(json: &str) -> Result<BeaconConfigFile, ConfigError> {
    let config: BeaconConfigFile = serde_json::from_str(json)?;
    Ok(config)
}

/// Load the default embedded configuration
pub fn load_default_config() -> Result<BeaconConfigFile, ConfigError> {
    let default_config = include_str!("beacon_config.json");
    load_config_from_str(default_config)
}

impl BeaconConfigFile {
    /// Validate the configuration
    ///
    /// The base URL is needed by every transport kind: one-shot fetches and
    /// the chat fallback always go over REST.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transport.kind == TransportKind::Websocket
            && self.transport.ws_url.trim().is_empty()
        {
            return Err(ConfigError::MissingWsUrl);
        }
        if self.transport.base_url.trim().is_empty() {
            return Err(ConfigError::MissingBaseUrl);
        }
        if self.polling.interval_ms == 0 {
            return Err(ConfigError::InvalidInterval);
        }
        if self.polling.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout("polling.request_timeout_ms"));
        }
        if self.websocket.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout("websocket.connect_timeout_ms"));
        }
        if self.sync.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout("sync.request_timeout_ms"));
        }
        Ok(())
    }
}
