//! Transport configuration
//!
//! Configuration types for creating transports from config files.
//! Durations are stored in milliseconds with `Duration` accessors.

use beacon_core::Channel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Transport type selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Persistent WebSocket connection (default)
    #[default]
    Websocket,
    /// Fixed-interval HTTP polling with a health probe
    Polling,
}

/// Which transport to build and where it points
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub kind: TransportKind,
    /// WebSocket endpoint (e.g. `wss://api.example.com/ws`)
    #[serde(default)]
    pub ws_url: String,
    /// REST base URL (e.g. `https://api.example.com/api`)
    #[serde(default)]
    pub base_url: String,
}

impl TransportConfig {
    pub fn websocket(ws_url: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            kind: TransportKind::Websocket,
            ws_url: ws_url.into(),
            base_url: base_url.into(),
        }
    }

    pub fn polling(base_url: impl Into<String>) -> Self {
        Self {
            kind: TransportKind::Polling,
            ws_url: String::new(),
            base_url: base_url.into(),
        }
    }
}

/// Reconnection backoff parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first retry
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Cap on any single delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Consecutive failed attempts before giving up (0 = never give up)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Randomise each delay by ±20%
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_attempts() -> u32 {
    10
}

fn default_jitter() -> bool {
    true
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            max_attempts: default_max_attempts(),
            jitter: default_jitter(),
        }
    }
}

impl ReconnectConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Deterministic policy (no jitter), mostly for tests
    pub fn fixed(initial_delay_ms: u64, max_delay_ms: u64, max_attempts: u32) -> Self {
        Self {
            initial_delay_ms,
            max_delay_ms,
            multiplier: default_multiplier(),
            max_attempts,
            jitter: false,
        }
    }
}

/// WebSocket transport parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Interval between client pings
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Close the connection if no pong arrives within this window
    #[serde(default = "default_pong_timeout_ms")]
    pub pong_timeout_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_heartbeat_interval_ms() -> u64 {
    15_000
}

fn default_pong_timeout_ms() -> u64 {
    45_000
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            pong_timeout_ms: default_pong_timeout_ms(),
        }
    }
}

impl WebSocketConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.pong_timeout_ms)
    }
}

/// HTTP polling parameters
///
/// Maps are keyed by channel wire name (`"prices"`, `"ai-chat"`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Fixed poll interval per channel
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
    /// Per-channel delay before the first poll, to avoid synchronized bursts
    #[serde(default = "default_stagger_ms")]
    pub stagger_ms: BTreeMap<String, u64>,
    /// Per-channel REST path, appended to the base URL
    #[serde(default = "default_endpoints")]
    pub endpoints: BTreeMap<String, String>,
    #[serde(default = "default_health_path")]
    pub health_path: String,
    #[serde(default = "default_health_interval_ms")]
    pub health_interval_ms: u64,
    /// Timeout for each HTTP request
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Consecutive 429/5xx/network failures before the session is closed
    #[serde(default = "default_server_error_threshold")]
    pub server_error_threshold: u32,
}

fn default_poll_interval_ms() -> u64 {
    8_000
}

fn default_stagger_ms() -> BTreeMap<String, u64> {
    [
        (Channel::Market, 0),
        (Channel::Prices, 1_000),
        (Channel::Defi, 2_000),
        (Channel::Nft, 3_000),
        (Channel::GameFi, 4_000),
    ]
    .into_iter()
    .map(|(c, ms)| (c.as_str().to_string(), ms))
    .collect()
}

fn default_endpoints() -> BTreeMap<String, String> {
    [
        (Channel::Market, "/overview"),
        (Channel::Prices, "/prices/live"),
        (Channel::Defi, "/defi/protocols"),
        (Channel::Nft, "/nft/collections"),
        (Channel::GameFi, "/gamefi/projects"),
        (Channel::AiChat, "/ai/chat"),
    ]
    .into_iter()
    .map(|(c, path)| (c.as_str().to_string(), path.to_string()))
    .collect()
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_health_interval_ms() -> u64 {
    15_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_server_error_threshold() -> u32 {
    3
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
            stagger_ms: default_stagger_ms(),
            endpoints: default_endpoints(),
            health_path: default_health_path(),
            health_interval_ms: default_health_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            server_error_threshold: default_server_error_threshold(),
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Delay before the first poll of `channel` (zero if unconfigured)
    pub fn stagger(&self, channel: Channel) -> Duration {
        Duration::from_millis(self.stagger_ms.get(channel.as_str()).copied().unwrap_or(0))
    }

    /// REST path for `channel`, falling back to `/{channel}`
    pub fn endpoint(&self, channel: Channel) -> String {
        self.endpoints
            .get(channel.as_str())
            .cloned()
            .unwrap_or_else(|| format!("/{}", channel))
    }
}
