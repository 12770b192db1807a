use crate::error::StoreError;

/// Port for durable local storage of the offline snapshot
///
/// A store holds a single blob under one storage key. Implementations
/// decide where that lives (a file, a browser-like key/value store, memory).
pub trait SnapshotStore: Send + Sync {
    /// Load the stored blob, `None` if nothing was stored yet
    fn load(&self) -> Result<Option<String>, StoreError>;

    /// Replace the stored blob
    fn save(&self, blob: &str) -> Result<(), StoreError>;

    /// Remove the stored blob
    fn clear(&self) -> Result<(), StoreError>;
}
