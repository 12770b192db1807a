use serde::{Deserialize, Serialize};

use crate::values::Price;

/// DeFi protocol metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefiProtocol {
    pub name: String,
    pub chain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Total value locked
    pub tvl: Price,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apy: Option<f64>,
    #[serde(default)]
    pub change_24h: f64,
}
