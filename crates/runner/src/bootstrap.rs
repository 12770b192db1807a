//! Bootstrap - builds a ready-to-init SyncClient from configuration

use beacon_clock::SystemClock;
use beacon_gateway::{GatewayError, RestFetcher, Transport, TransportFactory};
use beacon_sync::{FileSnapshotStore, SyncClient};
use std::sync::Arc;
use thiserror::Error;

use crate::config::{BeaconConfigFile, ConfigError};

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Gateway setup failed: {0}")]
    Gateway(#[from] GatewayError),
}

/// Validate `config` and wire the configured transport, a REST fetcher, the
/// on-disk snapshot store and the system clock into a [`SyncClient`].
///
/// The client is not started; call [`SyncClient::init`].
pub fn build_client(config: &BeaconConfigFile) -> Result<SyncClient, BootstrapError> {
    config.validate()?;
    let transport =
        TransportFactory::from_config(&config.transport, &config.websocket, &config.polling)?;
    build_client_with_transport(config, transport)
}

/// Like [`build_client`] but with a caller-supplied transport
pub fn build_client_with_transport(
    config: &BeaconConfigFile,
    transport: Arc<dyn Transport>,
) -> Result<SyncClient, BootstrapError> {
    let fetcher = RestFetcher::new(config.transport.base_url.clone(), config.polling.clone())?;
    let store = FileSnapshotStore::new(&config.sync.storage_dir, &config.sync.storage_key);

    log::info!(
        "Bootstrapping {} client (rest: {}, snapshot: {})",
        transport.name(),
        fetcher.base_url(),
        store.path().display()
    );

    Ok(SyncClient::with_reconnect(
        config.sync.clone(),
        config.reconnect.clone(),
        transport,
        Arc::new(fetcher),
        Arc::new(store),
        Arc::new(SystemClock::new()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_default_config;
    use beacon_gateway::TransportConfig;

    #[tokio::test]
    async fn test_build_websocket_client() {
        let config = load_default_config().unwrap();
        let client = build_client(&config).unwrap();
        assert!(!client.is_connected());
        assert_eq!(client.config().storage_key, "beacon-offline-snapshot");
    }

    #[tokio::test]
    async fn test_build_polling_client() {
        let mut config = load_default_config().unwrap();
        config.transport = TransportConfig::polling("http://localhost:8080/api");
        assert!(build_client(&config).is_ok());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = load_default_config().unwrap();
        config.transport.ws_url.clear();
        assert!(matches!(
            build_client(&config),
            Err(BootstrapError::Config(ConfigError::MissingWsUrl))
        ));
    }

    #[test]
    fn test_malformed_url_is_gateway_error() {
        let mut config = load_default_config().unwrap();
        config.transport.ws_url = "not a url".to_string();
        assert!(matches!(
            build_client(&config),
            Err(BootstrapError::Gateway(_))
        ));
    }
}
