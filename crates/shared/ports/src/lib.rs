//! Beacon Ports
//!
//! Port definitions (traits) for the Beacon sync client.
//! These define the boundaries between sync logic and infrastructure.

mod clock;
mod error;
mod fetch;
mod store;

pub use clock::Clock;
pub use error::{FetchError, StoreError};
pub use fetch::Fetcher;
pub use store::SnapshotStore;
