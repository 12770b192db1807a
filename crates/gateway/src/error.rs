//! Error types for the gateway crate

use thiserror::Error;

/// Transport-level errors
///
/// These are advisory: the connection manager absorbs them and retries,
/// listeners see them through `on_error`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Health check failed: {0}")]
    HealthCheck(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Not connected")]
    NotConnected,

    #[error("Timeout waiting for {0}")]
    Timeout(String),

    /// Backend answered with HTTP 429 or 5xx
    #[error("Server error: HTTP {status}")]
    Server { status: u16 },

    #[error("Gave up after {attempts} reconnect attempts")]
    GaveUp { attempts: u32 },
}

impl TransportError {
    /// Returns true for HTTP 429
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, TransportError::Server { status: 429 })
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        TransportError::Serialization(e.to_string())
    }
}

/// Gateway-level errors (construction and configuration)
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),
}
