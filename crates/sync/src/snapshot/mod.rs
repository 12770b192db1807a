//! Offline Snapshot
//!
//! Durable copy of the last payload per channel, written through a
//! [`SnapshotStore`] as one versioned JSON blob:
//!
//! ```json
//! { "version": 1, "channels": { "prices": { "payload": [...], "timestamp": "..." } } }
//! ```
//!
//! Storage failures are logged and never propagated.

mod store;

pub use store::{FileSnapshotStore, MemorySnapshotStore};

use beacon_core::{Channel, Timestamp};
use beacon_ports::SnapshotStore;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub payload: Value,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineSnapshot {
    pub version: u32,
    /// Keyed by channel wire name
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelSnapshot>,
}

impl Default for OfflineSnapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            channels: BTreeMap::new(),
        }
    }
}

impl OfflineSnapshot {
    pub fn get(&self, channel: Channel) -> Option<&ChannelSnapshot> {
        self.channels.get(channel.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// In-memory snapshot plus a counter bumped on every change
struct Current {
    snapshot: OfflineSnapshot,
    generation: u64,
}

/// Serialised blob tagged with the generation it was taken at
struct Pending {
    generation: u64,
    blob: String,
}

pub struct SnapshotPersister {
    store: Arc<dyn SnapshotStore>,
    current: Mutex<Current>,
    /// Generation of the last blob the store accepted. Held for the whole
    /// save so writes reach the store one at a time, newest wins.
    saved: Arc<Mutex<u64>>,
}

impl SnapshotPersister {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            store,
            current: Mutex::new(Current {
                snapshot: OfflineSnapshot::default(),
                generation: 0,
            }),
            saved: Arc::new(Mutex::new(0)),
        }
    }

    /// Read the stored snapshot. Anything unreadable yields an empty one.
    pub fn load(&self) -> OfflineSnapshot {
        let loaded = match self.store.load() {
            Ok(Some(blob)) => match serde_json::from_str::<OfflineSnapshot>(&blob) {
                Ok(snapshot) if snapshot.version == SNAPSHOT_VERSION => snapshot,
                Ok(snapshot) => {
                    log::warn!(
                        "Discarding offline snapshot with version {} (expected {})",
                        snapshot.version,
                        SNAPSHOT_VERSION
                    );
                    OfflineSnapshot::default()
                }
                Err(e) => {
                    log::warn!("Discarding corrupt offline snapshot: {}", e);
                    OfflineSnapshot::default()
                }
            },
            Ok(None) => OfflineSnapshot::default(),
            Err(e) => {
                log::warn!("Failed to load offline snapshot: {}", e);
                OfflineSnapshot::default()
            }
        };

        let mut current = self.current.lock();
        current.snapshot = loaded.clone();
        current.generation += 1;
        loaded
    }

    /// Merge one channel into the snapshot and persist it.
    ///
    /// Inside a Tokio runtime the write runs on the blocking pool and this
    /// returns immediately.
    pub fn record(&self, channel: Channel, payload: Value, timestamp: Timestamp) {
        let pending = {
            let mut current = self.current.lock();
            current.snapshot.channels.insert(
                channel.as_str().to_string(),
                ChannelSnapshot { payload, timestamp },
            );
            current.generation += 1;
            Self::serialize(&current)
        };
        let Some(pending) = pending else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let store = Arc::clone(&self.store);
                let saved = Arc::clone(&self.saved);
                runtime.spawn_blocking(move || save_if_newer(&*store, &saved, pending));
            }
            Err(_) => save_if_newer(&*self.store, &self.saved, pending),
        }
    }

    /// Persist the in-memory snapshot and wait for the write to land
    pub async fn flush(&self) {
        let pending = Self::serialize(&self.current.lock());
        let Some(pending) = pending else {
            return;
        };
        let store = Arc::clone(&self.store);
        let saved = Arc::clone(&self.saved);
        let write = tokio::task::spawn_blocking(move || save_if_newer(&*store, &saved, pending));
        if let Err(e) = write.await {
            log::warn!("Offline snapshot flush did not complete: {}", e);
        }
    }

    pub fn snapshot(&self) -> OfflineSnapshot {
        self.current.lock().snapshot.clone()
    }

    pub fn clear(&self) {
        let mut current = self.current.lock();
        current.snapshot = OfflineSnapshot::default();
        current.generation += 1;
        // Newer than anything in flight, so no older blob lands afterwards
        let mut saved = self.saved.lock();
        *saved = current.generation;
        if let Err(e) = self.store.clear() {
            log::warn!("Failed to clear offline snapshot: {}", e);
        }
    }

    fn serialize(current: &Current) -> Option<Pending> {
        match serde_json::to_string(&current.snapshot) {
            Ok(blob) => Some(Pending {
                generation: current.generation,
                blob,
            }),
            Err(e) => {
                log::warn!("Failed to serialize offline snapshot: {}", e);
                None
            }
        }
    }
}

fn save_if_newer(store: &dyn SnapshotStore, saved: &Mutex<u64>, pending: Pending) {
    let mut saved = saved.lock();
    if pending.generation <= *saved {
        log::debug!(
            "Skipping offline snapshot generation {} (already at {})",
            pending.generation,
            *saved
        );
        return;
    }
    match store.save(&pending.blob) {
        Ok(()) => *saved = pending.generation,
        Err(e) => log::warn!("Failed to save offline snapshot: {}", e),
    }
}
