//! SyncClient facade
//!
//! Wires the connection manager, registry, correlator, cache and snapshot
//! together. Construct one per backend and share it by cloning; there is no
//! global instance.
//!
//! Two background tasks run after [`SyncClient::init`]:
//! - dispatch: inbound messages → correlator, or validate → cache → listeners
//! - writer: outbound queue → transport, dropping messages while disconnected
//!
//! Both hold only a weak reference, so dropping the last client clone stops them.

use beacon_core::{
    Channel, ChatRequest, ChatResponse, ClientMessage, ConnectionState, DecodeError, ServerMessage,
    SubscriptionKey, Timestamp, validate_payload,
};
use beacon_gateway::transport::EVENT_CHANNEL_CAPACITY;
use beacon_gateway::{
    ConnectionListener, ConnectionManager, ListenerId, ReconnectConfig, Transport, TransportError,
};
use beacon_ports::{Clock, Fetcher, SnapshotStore};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::cache::{OfflineCache, expiry};
use crate::config::SyncConfig;
use crate::correlator::Correlator;
use crate::error::SyncError;
use crate::registry::{Activation, Deactivation, SubscriptionId, SubscriptionRegistry, Update};
use crate::snapshot::SnapshotPersister;

/// Where a one-shot fetch may read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPolicy {
    /// Serve the cache while offline, otherwise go to the network
    PreferCache,
    /// Always try the network first (refresh)
    Network,
}

/// Whether data came from the backend just now or from the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Live,
    Cached { age: Duration },
}

impl Freshness {
    pub fn is_live(&self) -> bool {
        matches!(self, Freshness::Live)
    }
}

/// Result of [`SyncClient::fetch`]
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub data: Value,
    pub freshness: Freshness,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Running,
    Disposed,
}

struct Lifecycle {
    phase: Phase,
    inbound_rx: Option<mpsc::Receiver<ServerMessage>>,
    outbound_rx: Option<mpsc::Receiver<ClientMessage>>,
    tasks: Vec<JoinHandle<()>>,
    listener_id: Option<ListenerId>,
}

struct ClientInner {
    config: SyncConfig,
    connection: ConnectionManager,
    registry: SubscriptionRegistry,
    correlator: Correlator,
    cache: OfflineCache,
    snapshot: SnapshotPersister,
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
    outbound: mpsc::Sender<ClientMessage>,
    lifecycle: Mutex<Lifecycle>,
}

#[derive(Clone)]
pub struct SyncClient {
    inner: Arc<ClientInner>,
}

impl SyncClient {
    pub fn new(
        config: SyncConfig,
        transport: Arc<dyn Transport>,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn SnapshotStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_reconnect(
            config,
            ReconnectConfig::default(),
            transport,
            fetcher,
            store,
            clock,
        )
    }

    pub fn with_reconnect(
        config: SyncConfig,
        reconnect: ReconnectConfig,
        transport: Arc<dyn Transport>,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn SnapshotStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));

        let inner = ClientInner {
            connection: ConnectionManager::new(transport, reconnect, inbound_tx),
            registry: SubscriptionRegistry::new(),
            correlator: Correlator::new(config.request_timeout()),
            cache: OfflineCache::new(config.cache_ttl(), Arc::clone(&clock)),
            snapshot: SnapshotPersister::new(store),
            fetcher,
            clock,
            outbound: outbound_tx,
            lifecycle: Mutex::new(Lifecycle {
                phase: Phase::Created,
                inbound_rx: Some(inbound_rx),
                outbound_rx: Some(outbound_rx),
                tasks: Vec::new(),
                listener_id: None,
            }),
            config,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Restore the offline snapshot, start the background tasks and connect.
    ///
    /// Idempotent; fails only after [`dispose`](Self::dispose).
    pub fn init(&self) -> Result<(), SyncError> {
        let mut lifecycle = self.inner.lifecycle.lock();
        match lifecycle.phase {
            Phase::Running => return Ok(()),
            Phase::Disposed => return Err(SyncError::Disposed),
            Phase::Created => {}
        }
        let (Some(inbound_rx), Some(outbound_rx)) =
            (lifecycle.inbound_rx.take(), lifecycle.outbound_rx.take())
        else {
            return Err(SyncError::Disposed);
        };

        self.inner.restore_snapshot();

        let weak = Arc::downgrade(&self.inner);
        lifecycle
            .tasks
            .push(tokio::spawn(run_dispatch(weak.clone(), inbound_rx)));
        lifecycle
            .tasks
            .push(tokio::spawn(run_writer(weak.clone(), outbound_rx)));
        lifecycle.listener_id = Some(
            self.inner
                .connection
                .add_listener(Arc::new(OfflineTracker { client: weak })),
        );
        lifecycle.phase = Phase::Running;
        drop(lifecycle);

        log::info!(
            "Sync client started on {} transport ({})",
            self.inner.connection.transport_name(),
            self.inner.clock.name()
        );
        self.inner.connection.connect();
        Ok(())
    }

    /// Disconnect, fail pending requests, drop every subscription and flush
    /// the snapshot. The client cannot be restarted.
    pub async fn dispose(&self) {
        let (tasks, listener_id) = {
            let mut lifecycle = self.inner.lifecycle.lock();
            if lifecycle.phase == Phase::Disposed {
                return;
            }
            lifecycle.phase = Phase::Disposed;
            lifecycle.inbound_rx.take();
            lifecycle.outbound_rx.take();
            (
                std::mem::take(&mut lifecycle.tasks),
                lifecycle.listener_id.take(),
            )
        };

        if let Some(id) = listener_id {
            self.inner.connection.remove_listener(id);
        }
        self.inner.connection.disconnect().await;

        let rejected = self.inner.correlator.reject_all(SyncError::Disposed);
        self.inner.registry.clear();
        for task in tasks {
            task.abort();
        }
        self.inner.snapshot.flush().await;
        log::info!(
            "Sync client disposed ({} pending requests rejected)",
            rejected
        );
    }

    /// Start connecting again, e.g. after the manager gave up.
    ///
    /// No-op while connected or while an attempt is in progress.
    pub fn reconnect(&self) -> Result<(), SyncError> {
        self.ensure_running()?;
        log::info!("Reconnect requested while {}", self.connection_state());
        self.inner.connection.connect();
        Ok(())
    }

    /// Register `listener` for updates on `channel`.
    ///
    /// Never blocks. The first subscriber on a key activates the channel on
    /// the backend; the returned handle releases the registration when
    /// dropped.
    pub fn subscribe<I, S, F>(&self, channel: Channel, params: I, listener: F) -> SubscriptionHandle
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&Update) + Send + Sync + 'static,
    {
        let key = SubscriptionKey::new(channel, params);
        let (id, activation) = self.inner.registry.subscribe(key.clone(), Arc::new(listener));

        // While disconnected the on-connect replay covers it
        if activation == Activation::Activated && self.inner.connection.is_connected() {
            if let Err(e) = self.inner.enqueue(ClientMessage::subscribe(&key)) {
                log::warn!("Failed to queue subscribe for {}: {}", key, e);
            }
        }

        SubscriptionHandle {
            client: Arc::downgrade(&self.inner),
            id,
            key,
            released: false,
        }
    }

    /// Release the most recent subscription on `channel` + `params`
    pub fn unsubscribe<I, S>(&self, channel: Channel, params: I) -> Deactivation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = SubscriptionKey::new(channel, params);
        let deactivation = self.inner.registry.unsubscribe_key(&key);
        self.inner.after_release(&key, deactivation);
        deactivation
    }

    /// One-shot fetch, independent of the push/poll channel
    pub async fn fetch(
        &self,
        channel: Channel,
        params: &[String],
        policy: FetchPolicy,
    ) -> Result<Fetched, SyncError> {
        self.ensure_not_disposed()?;
        let inner = &self.inner;
        let key = SubscriptionKey::new(channel, params.iter().cloned());

        if policy == FetchPolicy::PreferCache && inner.cache.is_offline() {
            if let Some(hit) = inner.cached(&key) {
                log::debug!("Serving {} from cache while offline", key);
                return Ok(hit);
            }
        }

        let error = match inner.fetcher.fetch(channel, &key.params).await {
            Ok(data) => match validate_payload(channel, &data) {
                Ok(()) => {
                    let now = inner.clock.now();
                    inner.cache.set(key.to_string(), data.clone(), None);
                    if !key.has_params() {
                        inner.snapshot.record(channel, data.clone(), now);
                    }
                    return Ok(Fetched {
                        data,
                        freshness: Freshness::Live,
                        timestamp: now,
                    });
                }
                Err(e) => SyncError::Decode(e),
            },
            Err(e) => SyncError::Fetch(e),
        };

        log::warn!("Fetch of {} failed: {}", key, error);
        if let Some(hit) = inner.cached(&key) {
            return Ok(hit);
        }
        if inner.cache.is_offline() {
            Err(SyncError::Offline(key.to_string()))
        } else {
            Err(error)
        }
    }

    /// Send a request over the transport and wait for its correlated reply
    pub async fn request(&self, channel: Channel, payload: Value) -> Result<Value, SyncError> {
        self.ensure_running()?;
        let inner = &self.inner;
        inner
            .correlator
            .send(channel, payload, |message| inner.enqueue(message))
            .await
    }

    /// Ask the AI assistant.
    ///
    /// Goes through the correlator while connected; otherwise uses the direct
    /// REST endpoint.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, SyncError> {
        self.ensure_running()?;
        if !self.is_connected() {
            log::debug!("Not connected, sending chat over REST");
            return Ok(self.inner.fetcher.chat(&request).await?);
        }

        let payload = serde_json::to_value(&request)
            .map_err(|e| SyncError::Decode(DecodeError::new(Channel::AiChat, e)))?;
        let reply = self.request(Channel::AiChat, payload).await?;
        ChatResponse::deserialize(&reply)
            .map_err(|e| SyncError::Decode(DecodeError::new(Channel::AiChat, e)))
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection.watch_state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connection.is_connected()
    }

    pub fn is_offline(&self) -> bool {
        self.inner.cache.is_offline()
    }

    /// Force offline mode on or off; the next connection event overrides it
    pub fn set_offline(&self, offline: bool) {
        self.inner.cache.set_offline(offline);
    }

    pub fn add_connection_listener(&self, listener: Arc<dyn ConnectionListener>) -> ListenerId {
        self.inner.connection.add_listener(listener)
    }

    pub fn remove_connection_listener(&self, id: ListenerId) -> bool {
        self.inner.connection.remove_listener(id)
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.inner.registry
    }

    pub fn cache(&self) -> &OfflineCache {
        &self.inner.cache
    }

    pub fn snapshot(&self) -> &SnapshotPersister {
        &self.inner.snapshot
    }

    pub fn pending_requests(&self) -> usize {
        self.inner.correlator.pending_count()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    fn ensure_running(&self) -> Result<(), SyncError> {
        match self.inner.lifecycle.lock().phase {
            Phase::Running => Ok(()),
            Phase::Created => Err(SyncError::NotInitialized),
            Phase::Disposed => Err(SyncError::Disposed),
        }
    }

    fn ensure_not_disposed(&self) -> Result<(), SyncError> {
        if self.inner.lifecycle.lock().phase == Phase::Disposed {
            return Err(SyncError::Disposed);
        }
        Ok(())
    }
}

impl ClientInner {
    fn enqueue(&self, message: ClientMessage) -> Result<(), SyncError> {
        self.outbound.try_send(message).map_err(|e| match e {
            TrySendError::Full(message) => {
                log::warn!("Outbound queue full, dropping {:?}", message);
                SyncError::Transport(TransportError::Send("outbound queue full".to_string()))
            }
            TrySendError::Closed(_) => SyncError::Disposed,
        })
    }

    fn after_release(&self, key: &SubscriptionKey, deactivation: Deactivation) {
        if deactivation == Deactivation::Deactivated && self.connection.is_connected() {
            if let Err(e) = self.enqueue(ClientMessage::unsubscribe(key)) {
                log::warn!("Failed to queue unsubscribe for {}: {}", key, e);
            }
        }
    }

    /// Cached value for `key`, falling back to the whole-channel entry
    fn cached(&self, key: &SubscriptionKey) -> Option<Fetched> {
        let hit = self.cache.get(&key.to_string()).or_else(|| {
            key.has_params()
                .then(|| self.cache.get(key.channel.as_str()))
                .flatten()
        })?;
        let now = self.clock.now();
        Some(Fetched {
            freshness: Freshness::Cached { age: hit.age(now) },
            timestamp: hit.cached_at,
            data: hit.payload,
        })
    }

    fn restore_snapshot(&self) {
        let snapshot = self.snapshot.load();
        let now = self.clock.now();
        let ttl = self.config.snapshot_ttl();
        let mut restored = 0;

        for (name, entry) in snapshot.channels {
            let channel = match name.parse::<Channel>() {
                Ok(channel) => channel,
                Err(e) => {
                    log::warn!("Skipping snapshot entry: {}", e);
                    continue;
                }
            };
            if let Err(e) = validate_payload(channel, &entry.payload) {
                log::warn!("Skipping snapshot entry: {}", e);
                continue;
            }
            let expires_at = expiry(entry.timestamp, ttl);
            if now >= expires_at {
                log::debug!("Snapshot entry for {} is stale", channel);
                continue;
            }
            self.cache
                .set_with_expiry(channel.as_str(), entry.payload, entry.timestamp, expires_at);
            restored += 1;
        }

        if restored > 0 {
            log::info!("Restored {} channels from offline snapshot", restored);
        }
    }

    fn handle_inbound(&self, message: ServerMessage) {
        if message.is_reply() {
            if !self.correlator.resolve(&message) {
                log::debug!("Dropping unmatched reply on {}", message.channel);
            }
            return;
        }

        let channel = message.channel;
        if let Err(e) = validate_payload(channel, &message.data) {
            log::warn!("Dropping {} update: {}", channel, e);
            return;
        }

        let timestamp = message.timestamp.unwrap_or_else(|| self.clock.now());
        self.cache.set(channel.as_str(), message.data.clone(), None);
        self.snapshot
            .record(channel, message.data.clone(), timestamp);

        let update = Update {
            channel,
            data: message.data,
            timestamp,
        };
        let delivered = self.registry.dispatch(channel, &update);
        log::debug!("Delivered {} update to {} listeners", channel, delivered);
    }
}

/// Keeps the offline flag and backend subscriptions in step with the connection
struct OfflineTracker {
    client: Weak<ClientInner>,
}

impl ConnectionListener for OfflineTracker {
    fn on_connect(&self) {
        let Some(inner) = self.client.upgrade() else {
            return;
        };
        inner.cache.set_offline(false);

        let keys = inner.registry.active_keys();
        if !keys.is_empty() {
            log::info!("Replaying {} subscriptions", keys.len());
        }
        for key in keys {
            if let Err(e) = inner.enqueue(ClientMessage::subscribe(&key)) {
                log::warn!("Failed to replay subscribe for {}: {}", key, e);
            }
        }
    }

    fn on_disconnect(&self, _reason: &str) {
        if let Some(inner) = self.client.upgrade() {
            inner.cache.set_offline(true);
        }
    }

    fn on_reconnecting(&self, _attempt: u32, _delay: Duration) {
        if let Some(inner) = self.client.upgrade() {
            inner.cache.set_offline(true);
        }
    }

    fn on_error(&self, error: &TransportError) {
        if let TransportError::GaveUp { .. } = error {
            if let Some(inner) = self.client.upgrade() {
                inner.cache.set_offline(true);
            }
        }
    }
}

/// Registration returned by [`SyncClient::subscribe`]; releases on drop
pub struct SubscriptionHandle {
    client: Weak<ClientInner>,
    id: SubscriptionId,
    key: SubscriptionKey,
    released: bool,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    pub fn unsubscribe(mut self) -> Deactivation {
        self.release()
    }

    fn release(&mut self) -> Deactivation {
        if self.released {
            return Deactivation::NotSubscribed;
        }
        self.released = true;

        let Some(inner) = self.client.upgrade() else {
            return Deactivation::NotSubscribed;
        };
        let deactivation = inner.registry.unsubscribe_id(self.id);
        inner.after_release(&self.key, deactivation);
        deactivation
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.release();
    }
}

async fn run_dispatch(client: Weak<ClientInner>, mut inbound: mpsc::Receiver<ServerMessage>) {
    while let Some(message) = inbound.recv().await {
        let Some(inner) = client.upgrade() else {
            return;
        };
        inner.handle_inbound(message);
    }
}

async fn run_writer(client: Weak<ClientInner>, mut outbound: mpsc::Receiver<ClientMessage>) {
    while let Some(message) = outbound.recv().await {
        let Some(inner) = client.upgrade() else {
            return;
        };
        if !inner.connection.is_connected() {
            log::debug!("Dropping outbound {:?} while disconnected", message);
            continue;
        }
        if let Err(e) = inner.connection.send(message).await {
            log::warn!("Failed to send outbound message: {}", e);
        }
    }
}
