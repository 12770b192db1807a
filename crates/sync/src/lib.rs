//! Beacon Sync Client
//!
//! Consumer-facing half of Beacon. Sits on top of a
//! [`ConnectionManager`](beacon_gateway::ConnectionManager) and adds:
//!
//! ```text
//!   Feed / ChatSession        (hook adapters)
//!           │
//!      SyncClient ── SubscriptionRegistry  (ref-counted interest, fan-out)
//!           │    ├── Correlator            (requestId → pending reply)
//!           │    ├── OfflineCache          (TTL'd last-known values)
//!           │    └── SnapshotPersister     (durable copy for cold start)
//!           │
//!   ConnectionManager → Transport (websocket | polling | channel)
//! ```

pub mod cache;
pub mod chat;
pub mod client;
pub mod config;
pub mod correlator;
pub mod error;
pub mod feed;
pub mod registry;
pub mod snapshot;

pub use cache::{CachedValue, OfflineCache};
pub use chat::ChatSession;
pub use client::{FetchPolicy, Fetched, Freshness, SubscriptionHandle, SyncClient};
pub use config::SyncConfig;
pub use correlator::Correlator;
pub use error::{ErrorKind, SyncError};
pub use feed::{
    DefiFeed, Feed, FeedPayload, FeedState, FeedStatus, FeedView, GameFiFeed, MarketFeed, NftFeed,
    PriceFeed,
};
pub use registry::{
    Activation, Deactivation, SubscriptionId, SubscriptionRegistry, Update, UpdateListener,
};
pub use snapshot::{
    ChannelSnapshot, FileSnapshotStore, MemorySnapshotStore, OfflineSnapshot, SNAPSHOT_VERSION,
    SnapshotPersister,
};
