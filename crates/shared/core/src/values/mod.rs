use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Monetary amount (price, market cap, TVL) - uses Decimal for precision
pub type Price = Decimal;

/// Timestamp in UTC
pub type Timestamp = DateTime<Utc>;

/// Ticker symbol for a traded asset (e.g. "BTC")
pub type Symbol = String;
