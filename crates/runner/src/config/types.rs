use beacon_gateway::{PollingConfig, ReconnectConfig, TransportConfig, WebSocketConfig};
use beacon_sync::SyncConfig;
use serde::{Deserialize, Serialize};

/// Top-level `beacon_config.json`. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeaconConfigFile {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}
