//! Beacon Gateway
//!
//! Transport layer for the Beacon sync client. Provides:
//! - Transport abstraction with WebSocket, HTTP polling and in-memory implementations
//! - Connection manager with reconnect backoff and lifecycle listeners
//! - REST adapter for one-shot fetches and chat
//!
//! ## Architecture
//!
//! ```text
//!      Backend (WebSocket / REST)
//!               │
//!        ┌──────▼──────┐
//!        │  Transport  │  ws | polling | channel
//!        └──────┬──────┘
//!               │ TransportEvent
//!        ┌──────▼──────┐
//!        │ Connection  │  backoff, state, listeners
//!        │  Manager    │
//!        └──────┬──────┘
//!               │ ServerMessage (in order)
//!        ┌──────▼──────┐
//!        │ beacon-sync │
//!        └─────────────┘
//! ```
//!
//! The transport is chosen once, at construction time, through
//! [`TransportFactory`]. Nothing above the connection manager knows which one
//! is in use.

pub mod adapters;
pub mod connection;
pub mod error;
pub mod transport;

// Re-export commonly used types
pub use adapters::RestFetcher;
pub use connection::{Backoff, ConnectionListener, ConnectionManager, ListenerId, ListenerSet};
pub use error::{GatewayError, TransportError};
pub use transport::{
    ChannelTransport, ChannelTransportHandle, PollSchedule, PollingConfig, PollingTransport,
    ReconnectConfig, Transport, TransportConfig, TransportEvent, TransportFactory, TransportKind,
    WebSocketConfig, WsTransport,
};
