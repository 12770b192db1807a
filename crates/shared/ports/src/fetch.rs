use async_trait::async_trait;
use beacon_core::{Channel, ChatRequest, ChatResponse};
use serde_json::Value;

use crate::error::FetchError;

/// Port for one-shot requests, independent of the push/poll channel
///
/// Used for the eager initial snapshot of each feed and for `refresh()`.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the current payload for a channel
    async fn fetch(&self, channel: Channel, params: &[String]) -> Result<Value, FetchError>;

    /// Send a chat request directly, bypassing the correlator
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, FetchError>;
}
