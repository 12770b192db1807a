use serde::{Deserialize, Serialize};
use std::fmt;

use super::Channel;

/// Identity of a subscription: channel plus optional filter params.
///
/// Params are normalised (sorted, deduplicated) so `["ETH", "BTC"]` and
/// `["BTC", "ETH", "BTC"]` name the same subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionKey {
    pub channel: Channel,
    pub params: Vec<String>,
}

impl SubscriptionKey {
    pub fn new<I, S>(channel: Channel, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut params: Vec<String> = params.into_iter().map(Into::into).collect();
        params.sort();
        params.dedup();
        Self { channel, params }
    }

    /// Subscription to the whole channel, no filter
    pub fn channel(channel: Channel) -> Self {
        Self {
            channel,
            params: Vec::new(),
        }
    }

    pub fn has_params(&self) -> bool {
        !self.params.is_empty()
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            write!(f, "{}", self.channel)
        } else {
            write!(f, "{}[{}]", self.channel, self.params.join(","))
        }
    }
}
