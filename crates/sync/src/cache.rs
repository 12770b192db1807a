//! Offline Cache
//!
//! Last-known payload per cache key with a TTL. Expiry is judged against the
//! injected [`Clock`], so tests control it with a manual clock.

use beacon_core::Timestamp;
use beacon_ports::Clock;
use chrono::DateTime;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue {
    pub payload: Value,
    pub cached_at: Timestamp,
    pub expires_at: Timestamp,
}

impl CachedValue {
    /// Time since the value was cached (zero if `now` is earlier)
    pub fn age(&self, now: Timestamp) -> Duration {
        (now - self.cached_at).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }
}

pub struct OfflineCache {
    entries: RwLock<HashMap<String, CachedValue>>,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
    offline: AtomicBool,
}

impl OfflineCache {
    pub fn new(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
            clock,
            offline: AtomicBool::new(false),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Store `payload` under `key` for `ttl` (default TTL if `None`)
    pub fn set(&self, key: impl Into<String>, payload: Value, ttl: Option<Duration>) {
        let now = self.clock.now();
        let expires_at = expiry(now, ttl.unwrap_or(self.default_ttl));
        self.set_with_expiry(key, payload, now, expires_at);
    }

    /// Store with explicit timestamps (used when restoring a snapshot)
    pub fn set_with_expiry(
        &self,
        key: impl Into<String>,
        payload: Value,
        cached_at: Timestamp,
        expires_at: Timestamp,
    ) {
        self.entries.write().insert(
            key.into(),
            CachedValue {
                payload,
                cached_at,
                expires_at,
            },
        );
    }

    /// Live entry for `key`. An expired entry is evicted on this read.
    pub fn get(&self, key: &str) -> Option<CachedValue> {
        let now = self.clock.now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(value) if !value.is_expired(now) => return Some(value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|v| v.is_expired(now)) {
            entries.remove(key);
            log::debug!("Evicted expired cache entry {}", key);
        }
        None
    }

    pub fn remove(&self, key: &str) -> Option<CachedValue> {
        self.entries.write().remove(key)
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, v| !v.is_expired(now));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of stored entries, expired ones included until purged
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Returns the previous flag
    pub fn set_offline(&self, offline: bool) -> bool {
        let previous = self.offline.swap(offline, Ordering::SeqCst);
        if previous != offline {
            log::info!("Offline mode {}", if offline { "on" } else { "off" });
        }
        previous
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

/// `now + ttl`, saturating at the maximum timestamp
pub(crate) fn expiry(now: Timestamp, ttl: Duration) -> Timestamp {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<chrono::Utc>::MAX_UTC)
}
