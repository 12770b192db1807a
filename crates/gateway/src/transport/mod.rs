//! Transport abstraction layer
//!
//! One contract, three implementations selected at construction time:
//! - [`WsTransport`]: persistent WebSocket connection
//! - [`PollingTransport`]: fixed-interval HTTP polling, "connected" means the
//!   last health probe succeeded
//! - [`ChannelTransport`]: in-memory, for tests and simulations

pub mod channel;
pub mod config;
pub mod polling;
pub mod websocket;

pub use channel::{ChannelTransport, ChannelTransportHandle};
pub use config::{PollingConfig, ReconnectConfig, TransportConfig, TransportKind, WebSocketConfig};
pub use polling::{PollSchedule, PollingTransport};
pub use websocket::WsTransport;

use async_trait::async_trait;
use beacon_core::{ClientMessage, ServerMessage};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::{GatewayError, TransportError};

/// Capacity of the per-session event channel handed to [`Transport::open`]
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Events a transport reports for the session it was opened with
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Inbound message, delivered in arrival order
    Message(ServerMessage),
    /// Non-fatal problem (e.g. HTTP 429), the session stays open
    Warning(TransportError),
    /// Session is over, the connection manager will reconnect
    Closed { reason: String },
}

/// Transport - carries client/server envelopes to and from the backend
///
/// A transport is opened once per connection attempt. Everything it observes
/// for that session is reported through the `events` sender; it never calls
/// back into its owner.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Establish a session. Returns once the transport is usable.
    async fn open(&self, events: mpsc::Sender<TransportEvent>) -> Result<(), TransportError>;

    /// Send one envelope on the current session
    async fn send(&self, message: ClientMessage) -> Result<(), TransportError>;

    /// Tear down the current session (no-op if none)
    async fn close(&self);
}

/// Builds the configured transport
pub struct TransportFactory;

impl TransportFactory {
    pub fn from_config(
        transport: &TransportConfig,
        websocket: &WebSocketConfig,
        polling: &PollingConfig,
    ) -> Result<Arc<dyn Transport>, GatewayError> {
        match transport.kind {
            TransportKind::Websocket => {
                url::Url::parse(&transport.ws_url)?;
                Ok(Arc::new(WsTransport::new(
                    transport.ws_url.clone(),
                    websocket.clone(),
                )))
            }
            TransportKind::Polling => {
                url::Url::parse(&transport.base_url)?;
                Ok(Arc::new(PollingTransport::new(
                    transport.base_url.clone(),
                    polling.clone(),
                )?))
            }
        }
    }
}
