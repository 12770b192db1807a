//! Subscription Registry
//!
//! Ref-counted interest per [`SubscriptionKey`]. Routing is by channel only:
//! every live listener on a channel sees every update for it, and param
//! filtering happens in the consumer.

use beacon_core::{Channel, SubscriptionKey, Timestamp};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// A validated channel update, as delivered to listeners
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub channel: Channel,
    pub data: Value,
    pub timestamp: Timestamp,
}

/// Callback invoked for each update on a subscribed channel
pub type UpdateListener = Arc<dyn Fn(&Update) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Outcome of a subscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// First subscriber on the key: the channel must be set up
    Activated,
    AlreadyActive,
}

/// Outcome of an unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deactivation {
    /// Last subscriber on the key left: the channel must be torn down
    Deactivated,
    StillActive,
    /// Nothing to release
    NotSubscribed,
}

struct Entry {
    id: SubscriptionId,
    key: SubscriptionKey,
    listener: UpdateListener,
    alive: Arc<AtomicBool>,
}

#[derive(Default)]
struct RegistryState {
    /// Registration order
    entries: Vec<Entry>,
    counts: HashMap<SubscriptionKey, usize>,
}

impl RegistryState {
    fn release(&mut self, index: usize) -> Deactivation {
        let entry = self.entries.remove(index);
        entry.alive.store(false, Ordering::SeqCst);

        let remaining = match self.counts.get_mut(&entry.key) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => return Deactivation::NotSubscribed,
        };

        if remaining == 0 {
            self.counts.remove(&entry.key);
            log::debug!("Last subscriber left {}", entry.key);
            Deactivation::Deactivated
        } else {
            Deactivation::StillActive
        }
    }
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    next_id: AtomicU64,
    state: RwLock<RegistryState>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        key: SubscriptionKey,
        listener: UpdateListener,
    ) -> (SubscriptionId, Activation) {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut state = self.state.write();

        let count = state.counts.entry(key.clone()).or_insert(0);
        *count += 1;
        let activation = if *count == 1 {
            Activation::Activated
        } else {
            Activation::AlreadyActive
        };

        log::debug!("Subscribed {} ({:?}, refs={})", key, activation, *count);
        state.entries.push(Entry {
            id,
            key,
            listener,
            alive: Arc::new(AtomicBool::new(true)),
        });
        (id, activation)
    }

    /// Release one registration by id
    pub fn unsubscribe_id(&self, id: SubscriptionId) -> Deactivation {
        let mut state = self.state.write();
        match state.entries.iter().position(|e| e.id == id) {
            Some(index) => state.release(index),
            None => Deactivation::NotSubscribed,
        }
    }

    /// Release the most recent registration on `key`
    pub fn unsubscribe_key(&self, key: &SubscriptionKey) -> Deactivation {
        let mut state = self.state.write();
        match state.entries.iter().rposition(|e| &e.key == key) {
            Some(index) => state.release(index),
            None => Deactivation::NotSubscribed,
        }
    }

    /// Deliver `update` to every live listener on `channel`, in registration
    /// order. Returns the number of listeners called.
    pub fn dispatch(&self, channel: Channel, update: &Update) -> usize {
        // Listeners may subscribe/unsubscribe from inside the callback
        let targets: Vec<(UpdateListener, Arc<AtomicBool>)> = self
            .state
            .read()
            .entries
            .iter()
            .filter(|e| e.key.channel == channel)
            .map(|e| (Arc::clone(&e.listener), Arc::clone(&e.alive)))
            .collect();

        let mut delivered = 0;
        for (listener, alive) in targets {
            if alive.load(Ordering::SeqCst) {
                listener(update);
                delivered += 1;
            }
        }
        delivered
    }

    /// Keys with at least one subscriber, in first-registration order
    pub fn active_keys(&self) -> Vec<SubscriptionKey> {
        let state = self.state.read();
        let mut keys: Vec<SubscriptionKey> = Vec::with_capacity(state.counts.len());
        for entry in &state.entries {
            if !keys.contains(&entry.key) {
                keys.push(entry.key.clone());
            }
        }
        keys
    }

    pub fn ref_count(&self, key: &SubscriptionKey) -> usize {
        self.state.read().counts.get(key).copied().unwrap_or(0)
    }

    /// Returns true if any key on `channel` has subscribers
    pub fn is_active(&self, channel: Channel) -> bool {
        self.state.read().counts.keys().any(|k| k.channel == channel)
    }

    pub fn listener_count(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Drop every registration, marking all listeners dead
    pub fn clear(&self) -> Vec<SubscriptionKey> {
        let keys = self.active_keys();
        let mut state = self.state.write();
        for entry in state.entries.drain(..) {
            entry.alive.store(false, Ordering::SeqCst);
        }
        state.counts.clear();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parking_lot::Mutex;
    use serde_json::json;

    fn update(channel: Channel, data: Value) -> Update {
        Update {
            channel,
            data,
            timestamp: Utc::now(),
        }
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> UpdateListener {
        let log = Arc::clone(log);
        Arc::new(move |u: &Update| log.lock().push(format!("{}:{}", name, u.data)))
    }

    #[test]
    fn test_ref_counting() {
        let registry = SubscriptionRegistry::new();
        let key = SubscriptionKey::channel(Channel::Defi);
        let log = Arc::new(Mutex::new(Vec::new()));

        let (a, first) = registry.subscribe(key.clone(), recorder(&log, "a"));
        let (b, second) = registry.subscribe(key.clone(), recorder(&log, "b"));
        assert_eq!(first, Activation::Activated);
        assert_eq!(second, Activation::AlreadyActive);
        assert_eq!(registry.ref_count(&key), 2);

        assert_eq!(registry.unsubscribe_id(a), Deactivation::StillActive);
        assert!(registry.is_active(Channel::Defi));
        assert_eq!(registry.unsubscribe_id(b), Deactivation::Deactivated);
        assert!(!registry.is_active(Channel::Defi));
        assert_eq!(registry.ref_count(&key), 0);
    }

    #[test]
    fn test_unsubscribe_clamps_at_zero() {
        let registry = SubscriptionRegistry::new();
        let key = SubscriptionKey::channel(Channel::Nft);
        let log = Arc::new(Mutex::new(Vec::new()));
        let (id, _) = registry.subscribe(key.clone(), recorder(&log, "a"));

        assert_eq!(registry.unsubscribe_id(id), Deactivation::Deactivated);
        assert_eq!(registry.unsubscribe_id(id), Deactivation::NotSubscribed);
        assert_eq!(registry.unsubscribe_key(&key), Deactivation::NotSubscribed);
        assert_eq!(registry.ref_count(&key), 0);
    }

    #[test]
    fn test_dispatch_by_channel_in_registration_order() {
        let registry = SubscriptionRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        registry.subscribe(SubscriptionKey::new(Channel::Prices, ["BTC"]), recorder(&log, "btc"));
        registry.subscribe(SubscriptionKey::channel(Channel::Market), recorder(&log, "market"));
        registry.subscribe(SubscriptionKey::new(Channel::Prices, ["ETH"]), recorder(&log, "eth"));

        let delivered = registry.dispatch(Channel::Prices, &update(Channel::Prices, json!(1)));
        assert_eq!(delivered, 2);
        assert_eq!(*log.lock(), vec!["btc:1", "eth:1"]);
    }

    #[test]
    fn test_removed_listener_is_not_called() {
        let registry = SubscriptionRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let key = SubscriptionKey::channel(Channel::GameFi);
        let (id, _) = registry.subscribe(key, recorder(&log, "a"));
        registry.unsubscribe_id(id);

        registry.dispatch(Channel::GameFi, &update(Channel::GameFi, json!([])));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_listener_unsubscribed_mid_dispatch_is_skipped() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let key = SubscriptionKey::channel(Channel::Market);

        // The first listener removes the second before it runs
        let victim: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));
        let reg = Arc::clone(&registry);
        let target = Arc::clone(&victim);
        registry.subscribe(
            key.clone(),
            Arc::new(move |_u: &Update| {
                if let Some(id) = target.lock().take() {
                    reg.unsubscribe_id(id);
                }
            }),
        );
        let (second, _) = registry.subscribe(key, recorder(&log, "second"));
        *victim.lock() = Some(second);

        let delivered = registry.dispatch(Channel::Market, &update(Channel::Market, json!({})));
        assert_eq!(delivered, 1);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_active_keys_and_unsubscribe_key() {
        let registry = SubscriptionRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let prices = SubscriptionKey::new(Channel::Prices, ["BTC"]);
        let market = SubscriptionKey::channel(Channel::Market);

        registry.subscribe(prices.clone(), recorder(&log, "a"));
        registry.subscribe(market.clone(), recorder(&log, "b"));
        registry.subscribe(prices.clone(), recorder(&log, "c"));
        assert_eq!(registry.active_keys(), vec![prices.clone(), market.clone()]);

        assert_eq!(registry.unsubscribe_key(&prices), Deactivation::StillActive);
        assert_eq!(registry.unsubscribe_key(&prices), Deactivation::Deactivated);
        assert_eq!(registry.active_keys(), vec![market]);
    }

    #[test]
    fn test_clear() {
        let registry = SubscriptionRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.subscribe(SubscriptionKey::channel(Channel::Defi), recorder(&log, "a"));

        assert_eq!(registry.clear().len(), 1);
        assert_eq!(registry.listener_count(), 0);
        registry.dispatch(Channel::Defi, &update(Channel::Defi, json!([])));
        assert!(log.lock().is_empty());
    }
}
