//! Request/Response Correlator
//!
//! Each request gets a fresh uuid v4 id and a pending entry. The entry is
//! removed on every exit path (reply, timeout, send failure, caller dropping
//! the future), so the pending map never leaks.

use beacon_core::{Channel, ClientMessage, ServerMessage};
use dashmap::DashMap;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{Instant, timeout};
use uuid::Uuid;

use crate::error::SyncError;

type Reply = Result<Value, SyncError>;

struct Pending {
    channel: Channel,
    reply: oneshot::Sender<Reply>,
    created_at: Instant,
}

/// Removes the pending entry when the request future finishes or is dropped
struct PendingGuard<'a> {
    pending: &'a DashMap<String, Pending>,
    request_id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.request_id);
    }
}

pub struct Correlator {
    pending: DashMap<String, Pending>,
    timeout: Duration,
}

impl Correlator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send a request through `enqueue` and wait for the matching reply
    pub async fn send<F>(&self, channel: Channel, payload: Value, enqueue: F) -> Reply
    where
        F: FnOnce(ClientMessage) -> Result<(), SyncError>,
    {
        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();

        self.pending.insert(
            request_id.clone(),
            Pending {
                channel,
                reply: tx,
                created_at: Instant::now(),
            },
        );
        let _guard = PendingGuard {
            pending: &self.pending,
            request_id: request_id.clone(),
        };

        enqueue(ClientMessage::request(channel, request_id.clone(), payload))?;

        match timeout(self.timeout, rx).await {
            Ok(Ok(reply)) => reply,
            // Sender dropped without a reply
            Ok(Err(_)) => Err(SyncError::Disposed),
            Err(_) => {
                log::warn!(
                    "Request {} on {} timed out after {:?}",
                    request_id,
                    channel,
                    self.timeout
                );
                Err(SyncError::Timeout {
                    request_id,
                    timeout: self.timeout,
                })
            }
        }
    }

    /// Complete the pending request matching `message`.
    ///
    /// Returns false if the message is not a reply or its id is unknown
    /// (already resolved or timed out).
    pub fn resolve(&self, message: &ServerMessage) -> bool {
        let Some(request_id) = message.request_id.as_deref() else {
            return false;
        };
        let Some((_, pending)) = self.pending.remove(request_id) else {
            log::debug!("Reply {} matches no pending request", request_id);
            return false;
        };

        if pending.channel != message.channel {
            log::debug!(
                "Reply {} arrived on {} for a {} request",
                request_id,
                message.channel,
                pending.channel
            );
        }

        let reply = match message.error_message() {
            Some(error) => Err(SyncError::Remote(error.to_string())),
            None => Ok(message.data.clone()),
        };
        let _ = pending.reply.send(reply);
        true
    }

    /// Fail every pending request with `error`
    pub fn reject_all(&self, error: SyncError) -> usize {
        let ids: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        let mut rejected = 0;
        for id in ids {
            if let Some((_, pending)) = self.pending.remove(&id) {
                let _ = pending.reply.send(Err(error.clone()));
                rejected += 1;
            }
        }
        rejected
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn contains(&self, request_id: &str) -> bool {
        self.pending.contains_key(request_id)
    }

    /// Age of the oldest pending request
    pub fn oldest_pending(&self) -> Option<Duration> {
        self.pending.iter().map(|e| e.created_at.elapsed()).max()
    }
}
