use serde::{Deserialize, Serialize};

use crate::values::Price;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftCollection {
    pub name: String,
    pub floor_price: Price,
    pub volume_24h: Price,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owners: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<u32>,
    #[serde(default)]
    pub change_24h: f64,
}
