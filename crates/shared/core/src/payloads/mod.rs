//! Payload shapes carried on each channel
//!
//! [`validate_payload`] is the single gate that keeps malformed data out of
//! the cache and away from consumers.

mod chat;
mod defi;
mod gamefi;
mod market;
mod nft;

pub use chat::{ChatRequest, ChatResponse, ChatRole, ChatTurn};
pub use defi::DefiProtocol;
pub use gamefi::GameFiProject;
pub use market::{MarketOverview, PriceTick};
pub use nft::NftCollection;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::entities::Channel;

/// Payload did not match the expected shape for its channel
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed {channel} payload: {message}")]
pub struct DecodeError {
    pub channel: Channel,
    pub message: String,
}

impl DecodeError {
    pub fn new(channel: Channel, err: impl std::fmt::Display) -> Self {
        Self {
            channel,
            message: err.to_string(),
        }
    }
}

/// Check that `data` decodes into the typed payload for `channel`
pub fn validate_payload(channel: Channel, data: &Value) -> Result<(), DecodeError> {
    let result = match channel {
        Channel::Market => MarketOverview::deserialize(data).map(drop),
        Channel::Prices => Vec::<PriceTick>::deserialize(data).map(drop),
        Channel::Defi => Vec::<DefiProtocol>::deserialize(data).map(drop),
        Channel::Nft => Vec::<NftCollection>::deserialize(data).map(drop),
        Channel::GameFi => Vec::<GameFiProject>::deserialize(data).map(drop),
        Channel::AiChat => ChatResponse::deserialize(data).map(drop),
    };
    result.map_err(|e| DecodeError::new(channel, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_valid_price_payload() {
        let data = json!([
            { "symbol": "BTC", "price": "67000.5", "change24h": 1.2 },
            { "symbol": "ETH", "price": 3200 }
        ]);
        assert!(validate_payload(Channel::Prices, &data).is_ok());

        let ticks = Vec::<PriceTick>::deserialize(&data).unwrap();
        assert_eq!(ticks[0].price, dec!(67000.5));
        assert_eq!(ticks[1].price, dec!(3200));
    }

    #[test]
    fn test_wrong_shape_is_rejected() {
        let data = json!({ "symbol": "BTC", "price": "1" });
        let err = validate_payload(Channel::Prices, &data).unwrap_err();
        assert_eq!(err.channel, Channel::Prices);

        let data = json!({ "totalMarketCap": "not-a-number" });
        assert!(validate_payload(Channel::Market, &data).is_err());
    }

    #[test]
    fn test_market_overview_optional_fields() {
        let data = json!({
            "totalMarketCap": "2400000000000",
            "totalVolume24h": "98000000000",
            "btcDominance": 52.1
        });
        let overview = MarketOverview::deserialize(&data).unwrap();
        assert_eq!(overview.fear_greed_index, None);
        assert_eq!(overview.market_cap_change_24h, 0.0);
    }

    #[test]
    fn test_price_tick_matches_case_insensitive() {
        let tick = PriceTick::new("BTC", dec!(1));
        assert!(tick.matches(&["btc".to_string()]));
        assert!(!tick.matches(&["ETH".to_string()]));
    }
}
