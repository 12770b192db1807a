//! Error types for the sync client

use beacon_core::DecodeError;
use beacon_gateway::TransportError;
use beacon_ports::FetchError;
use std::time::Duration;
use thiserror::Error;

/// Category of a [`SyncError`], for matching without inspecting payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Timeout,
    Remote,
    Transport,
    Fetch,
    Decode,
    Offline,
    Disposed,
    NotInitialized,
}

/// Errors returned to consumers of the sync client
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// No reply arrived within the request timeout
    #[error("Request {request_id} timed out after {timeout:?}")]
    Timeout {
        request_id: String,
        timeout: Duration,
    },

    /// The reply carried an error
    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Offline with nothing cached for the key
    #[error("Offline and no cached data for {0}")]
    Offline(String),

    #[error("Client disposed")]
    Disposed,

    #[error("Client not initialized")]
    NotInitialized,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Timeout { .. } => ErrorKind::Timeout,
            SyncError::Remote(_) => ErrorKind::Remote,
            SyncError::Transport(_) => ErrorKind::Transport,
            SyncError::Fetch(_) => ErrorKind::Fetch,
            SyncError::Decode(_) => ErrorKind::Decode,
            SyncError::Offline(_) => ErrorKind::Offline,
            SyncError::Disposed => ErrorKind::Disposed,
            SyncError::NotInitialized => ErrorKind::NotInitialized,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }
}
