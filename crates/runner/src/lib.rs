//! Beacon Runner
//!
//! Turns a `beacon_config.json` into a running sync client:
//!
//! - **config**: file loading, embedded defaults and validation
//! - **bootstrap**: transport + REST fetcher + snapshot store → `SyncClient`
//! - **monitor**: mounts every feed and logs state changes
//!
//! The `beacon-monitor` binary ties the three together.

pub mod bootstrap;
pub mod config;
pub mod monitor;

pub use bootstrap::{BootstrapError, build_client, build_client_with_transport};
pub use config::{BeaconConfigFile, ConfigError, load_config, load_default_config};
pub use monitor::{FeedSummary, Monitor};
