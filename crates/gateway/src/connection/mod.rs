//! Connection lifecycle
//!
//! [`ConnectionManager`] drives a [`Transport`](crate::transport::Transport)
//! through Disconnected → Connecting → Connected → Reconnecting, retrying with
//! [`Backoff`] and reporting every transition to [`ConnectionListener`]s.

mod backoff;
mod listener;
mod manager;

pub use backoff::Backoff;
pub use listener::{ConnectionListener, ListenerId, ListenerSet};
pub use manager::ConnectionManager;
