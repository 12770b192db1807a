//! Tokio channel-based transport for single-process mode
//!
//! The transport side is handed to the connection manager; the
//! [`ChannelTransportHandle`] plays the backend: it pushes inbound messages,
//! drops the connection, fails opens and records everything the client sent.

use async_trait::async_trait;
use beacon_core::{ClientMessage, ServerMessage};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::{Notify, mpsc};

use crate::error::TransportError;
use crate::transport::{Transport, TransportEvent};

/// Computes an automatic reply for an outbound message
pub type AutoReply = Arc<dyn Fn(&ClientMessage) -> Option<ServerMessage> + Send + Sync>;

struct Shared {
    events: Mutex<Option<mpsc::Sender<TransportEvent>>>,
    sent: Mutex<Vec<ClientMessage>>,
    fail_opens: AtomicU32,
    opens: AtomicU32,
    auto_reply: Mutex<Option<AutoReply>>,
    changed: Notify,
}

/// In-memory transport
pub struct ChannelTransport {
    shared: Arc<Shared>,
}

/// Backend side of a [`ChannelTransport`]
#[derive(Clone)]
pub struct ChannelTransportHandle {
    shared: Arc<Shared>,
}

impl ChannelTransport {
    /// Create a transport/handle pair
    pub fn pair() -> (Self, ChannelTransportHandle) {
        let shared = Arc::new(Shared {
            events: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            fail_opens: AtomicU32::new(0),
            opens: AtomicU32::new(0),
            auto_reply: Mutex::new(None),
            changed: Notify::new(),
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            ChannelTransportHandle { shared },
        )
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    fn name(&self) -> &str {
        "channel"
    }

    async fn open(&self, events: mpsc::Sender<TransportEvent>) -> Result<(), TransportError> {
        let remaining = self.shared.fail_opens.load(Ordering::SeqCst);
        if remaining > 0 {
            self.shared.fail_opens.store(remaining - 1, Ordering::SeqCst);
            self.shared.changed.notify_waiters();
            return Err(TransportError::Connection(
                "simulated connect failure".to_string(),
            ));
        }

        *self.shared.events.lock() = Some(events);
        self.shared.opens.fetch_add(1, Ordering::SeqCst);
        self.shared.changed.notify_waiters();
        Ok(())
    }

    async fn send(&self, message: ClientMessage) -> Result<(), TransportError> {
        let Some(events) = self.shared.events.lock().clone() else {
            return Err(TransportError::NotConnected);
        };

        let reply = self
            .shared
            .auto_reply
            .lock()
            .clone()
            .and_then(|reply_fn| reply_fn(&message));

        self.shared.sent.lock().push(message);
        self.shared.changed.notify_waiters();

        if let Some(reply) = reply {
            events
                .send(TransportEvent::Message(reply))
                .await
                .map_err(|_| TransportError::ChannelClosed)?;
        }
        Ok(())
    }

    async fn close(&self) {
        self.shared.events.lock().take();
        self.shared.changed.notify_waiters();
    }
}

impl ChannelTransportHandle {
    /// Deliver an inbound message on the open session
    pub async fn push(&self, message: ServerMessage) -> Result<(), TransportError> {
        self.emit(TransportEvent::Message(message)).await
    }

    /// Report a non-fatal warning on the open session
    pub async fn warn(&self, error: TransportError) -> Result<(), TransportError> {
        self.emit(TransportEvent::Warning(error)).await
    }

    /// Simulate the backend dropping the connection
    pub async fn drop_connection(&self, reason: &str) {
        let events = self.shared.events.lock().take();
        if let Some(events) = events {
            let _ = events
                .send(TransportEvent::Closed {
                    reason: reason.to_string(),
                })
                .await;
        }
        self.shared.changed.notify_waiters();
    }

    /// Make the next `n` calls to `open` fail
    pub fn fail_next_opens(&self, n: u32) {
        self.shared.fail_opens.store(n, Ordering::SeqCst);
    }

    /// Reply automatically to outbound messages
    pub fn set_auto_reply<F>(&self, reply: F)
    where
        F: Fn(&ClientMessage) -> Option<ServerMessage> + Send + Sync + 'static,
    {
        *self.shared.auto_reply.lock() = Some(Arc::new(reply));
    }

    /// Echo every request back as a successful reply carrying its payload
    pub fn echo_requests(&self) {
        self.set_auto_reply(|msg| match msg {
            ClientMessage::Request {
                channel,
                request_id,
                payload,
            } => Some(ServerMessage::reply(*channel, request_id, payload.clone())),
            _ => None,
        });
    }

    pub fn clear_auto_reply(&self) {
        self.shared.auto_reply.lock().take();
    }

    /// Everything the client sent so far, in order
    pub fn sent(&self) -> Vec<ClientMessage> {
        self.shared.sent.lock().clone()
    }

    pub fn clear_sent(&self) {
        self.shared.sent.lock().clear();
    }

    /// Number of successful opens
    pub fn open_count(&self) -> u32 {
        self.shared.opens.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.shared.events.lock().is_some()
    }

    /// Wait until a session is open
    pub async fn wait_open(&self) {
        self.wait_for(|h| h.is_open()).await;
    }

    /// Wait until at least `n` sessions have been opened
    pub async fn wait_opens(&self, n: u32) {
        self.wait_for(|h| h.open_count() >= n).await;
    }

    /// Wait until the client has sent at least `n` messages
    pub async fn wait_sent(&self, n: usize) {
        self.wait_for(|h| h.shared.sent.lock().len() >= n).await;
    }

    async fn wait_for(&self, condition: impl Fn(&Self) -> bool) {
        loop {
            let notified = self.shared.changed.notified();
            if condition(self) {
                return;
            }
            notified.await;
        }
    }

    async fn emit(&self, event: TransportEvent) -> Result<(), TransportError> {
        let Some(events) = self.shared.events.lock().clone() else {
            return Err(TransportError::NotConnected);
        };
        events
            .send(event)
            .await
            .map_err(|_| TransportError::ChannelClosed)
    }
}
