use serde::{Deserialize, Serialize};

use crate::values::{Price, Symbol, Timestamp};

/// Global market overview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketOverview {
    pub total_market_cap: Price,
    pub total_volume_24h: Price,
    /// Bitcoin share of total market cap, in percent
    pub btc_dominance: f64,
    #[serde(default)]
    pub market_cap_change_24h: f64,
    /// 0 (extreme fear) to 100 (extreme greed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fear_greed_index: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_cryptocurrencies: Option<u32>,
}

/// Single live price tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceTick {
    pub symbol: Symbol,
    pub price: Price,
    /// 24h change, in percent
    #[serde(default)]
    pub change_24h: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_24h: Option<Price>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
}

impl PriceTick {
    pub fn new(symbol: impl Into<Symbol>, price: Price) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            change_24h: 0.0,
            volume_24h: None,
            timestamp: None,
        }
    }

    /// Case-insensitive symbol match
    pub fn matches(&self, symbols: &[String]) -> bool {
        symbols.iter().any(|s| s.eq_ignore_ascii_case(&self.symbol))
    }
}
