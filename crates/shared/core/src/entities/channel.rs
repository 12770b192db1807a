use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Logical stream multiplexed over a single transport connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    /// Global market overview (market cap, dominance, sentiment)
    #[serde(rename = "market", alias = "market-update")]
    Market,
    /// Live price ticks
    #[serde(rename = "prices", alias = "price-update")]
    Prices,
    /// DeFi protocol metrics
    #[serde(rename = "defi", alias = "defi-update")]
    Defi,
    /// NFT collection stats
    #[serde(rename = "nft", alias = "nft-update")]
    Nft,
    /// GameFi project stats
    #[serde(rename = "gamefi", alias = "gamefi-update")]
    GameFi,
    /// AI assistant request/response
    #[serde(rename = "ai-chat", alias = "ai-response")]
    AiChat,
}

impl Channel {
    /// Every channel, in a stable order
    pub const ALL: [Channel; 6] = [
        Channel::Market,
        Channel::Prices,
        Channel::Defi,
        Channel::Nft,
        Channel::GameFi,
        Channel::AiChat,
    ];

    /// Name used on the wire and as the cache key
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Market => "market",
            Channel::Prices => "prices",
            Channel::Defi => "defi",
            Channel::Nft => "nft",
            Channel::GameFi => "gamefi",
            Channel::AiChat => "ai-chat",
        }
    }

    /// Returns true for channels that carry pushed/polled updates.
    ///
    /// `AiChat` is request/response only.
    pub fn is_streaming(&self) -> bool {
        !matches!(self, Channel::AiChat)
    }

    /// Legacy `*-update` event name some backends still emit
    pub fn update_alias(&self) -> &'static str {
        match self {
            Channel::Market => "market-update",
            Channel::Prices => "price-update",
            Channel::Defi => "defi-update",
            Channel::Nft => "nft-update",
            Channel::GameFi => "gamefi-update",
            Channel::AiChat => "ai-response",
        }
    }

    /// Channels that carry pushed/polled updates
    pub fn streaming() -> impl Iterator<Item = Channel> {
        Self::ALL.into_iter().filter(Channel::is_streaming)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a channel name is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown channel: {0}")]
pub struct UnknownChannel(pub String);

impl FromStr for Channel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|c| c.as_str() == s || c.update_alias() == s)
            .ok_or_else(|| UnknownChannel(s.to_string()))
    }
}
