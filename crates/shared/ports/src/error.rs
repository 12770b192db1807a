use thiserror::Error;

/// Errors from durable local storage
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Storage IO error: {0}")]
    Io(String),

    #[error("Storage serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

/// Errors from one-shot fetches
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Network or communication failure
    #[error("Network error: {0}")]
    Network(String),

    /// Backend asked us to slow down (HTTP 429)
    #[error("Rate limited")]
    RateLimited,

    /// Non-success HTTP status
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    /// Response body did not match the expected shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// Fetch was not attempted because the client is offline
    #[error("Offline")]
    Offline,
}

impl FetchError {
    /// Transient errors are worth retrying and are shown as warnings
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network(_) | FetchError::RateLimited | FetchError::Offline => true,
            FetchError::Http { status, .. } => *status >= 500,
            FetchError::Decode(_) => false,
        }
    }
}
