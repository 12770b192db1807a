//! Beacon Core Domain
//!
//! Pure domain types for the Beacon real-time sync client.
//! This crate contains no async, no I/O, and is 100% unit testable.

pub mod entities;
pub mod messages;
pub mod payloads;
pub mod values;

// Re-export commonly used types at crate root
pub use entities::{Channel, ConnectionState, SubscriptionKey, UnknownChannel};
pub use messages::{ClientMessage, ServerMessage};
pub use payloads::{
    ChatRequest, ChatResponse, ChatRole, ChatTurn, DecodeError, DefiProtocol, GameFiProject,
    MarketOverview, NftCollection, PriceTick, validate_payload,
};
pub use values::{Price, Symbol, Timestamp};
