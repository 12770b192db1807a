use serde::{Deserialize, Serialize};

use crate::values::{Price, Symbol};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameFiProject {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Symbol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub players_24h: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<Price>,
    #[serde(default)]
    pub change_24h: f64,
}
