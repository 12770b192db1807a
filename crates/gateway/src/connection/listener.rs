use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::TransportError;

/// Observer of connection lifecycle events
///
/// Callbacks run on the connection supervisor task and must not block.
pub trait ConnectionListener: Send + Sync {
    fn on_connect(&self) {}

    fn on_disconnect(&self, _reason: &str) {}

    /// A reconnect attempt will run after `delay`
    fn on_reconnecting(&self, _attempt: u32, _delay: Duration) {}

    fn on_error(&self, _error: &TransportError) {}
}

/// Handle returned by [`ListenerSet::add`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Registered listeners, notified in registration order
#[derive(Default)]
pub struct ListenerSet {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn ConnectionListener>)>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn ConnectionListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    pub fn notify_connect(&self) {
        for listener in self.snapshot() {
            listener.on_connect();
        }
    }

    pub fn notify_disconnect(&self, reason: &str) {
        for listener in self.snapshot() {
            listener.on_disconnect(reason);
        }
    }

    pub fn notify_reconnecting(&self, attempt: u32, delay: Duration) {
        for listener in self.snapshot() {
            listener.on_reconnecting(attempt, delay);
        }
    }

    pub fn notify_error(&self, error: &TransportError) {
        for listener in self.snapshot() {
            listener.on_error(error);
        }
    }

    // Callbacks may add or remove listeners, so never hold the lock while calling out
    fn snapshot(&self) -> Vec<Arc<dyn ConnectionListener>> {
        self.listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}
