use beacon_core::{ClientMessage, ConnectionState, ServerMessage};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::backoff::Backoff;
use super::listener::{ConnectionListener, ListenerId, ListenerSet};
use crate::error::TransportError;
use crate::transport::config::ReconnectConfig;
use crate::transport::{EVENT_CHANNEL_CAPACITY, Transport, TransportEvent};

/// Why a session's event pump stopped
enum PumpExit {
    Closed(String),
    InboundDropped,
}

struct Inner {
    transport: Arc<dyn Transport>,
    backoff: Backoff,
    inbound: mpsc::Sender<ServerMessage>,
    state: watch::Sender<ConnectionState>,
    listeners: ListenerSet,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

/// Owns a transport and keeps it connected
///
/// `connect()` spawns a supervisor task that opens the transport, forwards
/// inbound messages in arrival order and reconnects with backoff when the
/// session closes. Failures never surface as errors to the caller; they are
/// reported to listeners.
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        reconnect: ReconnectConfig,
        inbound: mpsc::Sender<ServerMessage>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                transport,
                backoff: Backoff::new(reconnect),
                inbound,
                state,
                listeners: ListenerSet::new(),
                supervisor: Mutex::new(None),
            }),
        }
    }

    /// Start connecting. No-op while already connecting or connected.
    pub fn connect(&self) {
        let mut supervisor = self.inner.supervisor.lock();
        if self.state().is_active() {
            return;
        }
        if let Some(handle) = supervisor.as_ref() {
            if !handle.is_finished() {
                return;
            }
        }

        self.inner.set_state(ConnectionState::Connecting);
        *supervisor = Some(tokio::spawn(run_supervisor(Arc::clone(&self.inner))));
    }

    /// Stop reconnecting, close the transport and go Disconnected
    pub async fn disconnect(&self) {
        let handle = self.inner.supervisor.lock().take();
        if let Some(handle) = handle {
            handle.abort();
        }
        self.inner.transport.close().await;

        let was_connected = self.state().is_connected();
        self.inner.set_state(ConnectionState::Disconnected);
        if was_connected {
            self.inner.listeners.notify_disconnect("disconnected by client");
        }
    }

    /// Send on the open session
    pub async fn send(&self, message: ClientMessage) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.inner.transport.send(message).await
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Subscribe to state changes
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn add_listener(&self, listener: Arc<dyn ConnectionListener>) -> ListenerId {
        self.inner.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    pub fn transport_name(&self) -> &str {
        self.inner.transport.name()
    }

    pub fn backoff(&self) -> &Backoff {
        &self.inner.backoff
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(handle) = self.inner.supervisor.lock().take() {
            handle.abort();
        }
    }
}

impl Inner {
    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous == next && next != ConnectionState::Reconnecting {
            return;
        }
        if !previous.can_transition_to(next) {
            log::warn!("Unexpected connection transition {} -> {}", previous, next);
        }
        log::info!(
            "Connection [{}] {} -> {}",
            self.transport.name(),
            previous,
            next
        );
    }

    async fn pump(&self, events: &mut mpsc::Receiver<TransportEvent>) -> PumpExit {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Message(message) => {
                    log::debug!("Inbound {} message", message.channel);
                    if self.inbound.send(message).await.is_err() {
                        return PumpExit::InboundDropped;
                    }
                }
                TransportEvent::Warning(error) => {
                    log::warn!("Transport warning: {}", error);
                    self.listeners.notify_error(&error);
                }
                TransportEvent::Closed { reason } => return PumpExit::Closed(reason),
            }
        }
        PumpExit::Closed("event stream ended".to_string())
    }
}

async fn run_supervisor(inner: Arc<Inner>) {
    let mut attempt: u32 = 0;

    loop {
        if inner.inbound.is_closed() {
            inner.set_state(ConnectionState::Disconnected);
            return;
        }

        let (events_tx, mut events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        match inner.transport.open(events_tx).await {
            Ok(()) => {
                attempt = 0;
                inner.set_state(ConnectionState::Connected);
                inner.listeners.notify_connect();

                let exit = inner.pump(&mut events_rx).await;
                inner.transport.close().await;

                match exit {
                    PumpExit::Closed(reason) => {
                        log::warn!("Connection closed: {}", reason);
                        inner.set_state(ConnectionState::Reconnecting);
                        inner.listeners.notify_disconnect(&reason);
                    }
                    PumpExit::InboundDropped => {
                        log::debug!("Inbound receiver dropped, stopping supervisor");
                        inner.set_state(ConnectionState::Disconnected);
                        return;
                    }
                }
            }
            Err(error) => {
                log::warn!("Connection attempt failed: {}", error);
                inner.listeners.notify_error(&error);
                inner.set_state(ConnectionState::Reconnecting);
            }
        }

        attempt = attempt.saturating_add(1);
        if !inner.backoff.should_retry(attempt) {
            let attempts = inner.backoff.max_attempts();
            log::error!("Giving up after {} reconnect attempts", attempts);
            inner.set_state(ConnectionState::Disconnected);
            inner
                .listeners
                .notify_error(&TransportError::GaveUp { attempts });
            return;
        }

        let delay = inner.backoff.delay(attempt);
        log::info!("Reconnecting in {:?} (attempt {})", delay, attempt);
        inner.listeners.notify_reconnecting(attempt, delay);
        tokio::time::sleep(delay).await;
    }
}
