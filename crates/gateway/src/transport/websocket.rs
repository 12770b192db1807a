//! WebSocket transport
//!
//! One socket per session, split into a writer task (outbound frames plus the
//! heartbeat) and a reader task (inbound frames). Undecodable text frames are
//! logged and dropped; the session survives them.

use async_trait::async_trait;
use beacon_core::{ClientMessage, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Bytes, Message};

use crate::error::TransportError;
use crate::transport::config::WebSocketConfig;
use crate::transport::{Transport, TransportEvent};

const OUTGOING_CAPACITY: usize = 256;

enum Outgoing {
    Text(String),
    Pong(Bytes),
    Close,
}

struct Session {
    outgoing: mpsc::Sender<Outgoing>,
    reader: JoinHandle<()>,
}

/// Persistent WebSocket connection to the backend
pub struct WsTransport {
    url: String,
    config: WebSocketConfig,
    session: Mutex<Option<Session>>,
}

impl WsTransport {
    pub fn new(url: String, config: WebSocketConfig) -> Self {
        Self {
            url,
            config,
            session: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for WsTransport {
    fn name(&self) -> &str {
        "websocket"
    }

    async fn open(&self, events: mpsc::Sender<TransportEvent>) -> Result<(), TransportError> {
        let (ws_stream, _) = timeout(self.config.connect_timeout(), connect_async(&self.url))
            .await
            .map_err(|_| TransportError::Timeout(format!("connect to {}", self.url)))?
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        log::info!("WebSocket connected to {}", self.url);

        let (mut write, mut read) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::channel::<Outgoing>(OUTGOING_CAPACITY);
        let last_pong = Arc::new(Mutex::new(Instant::now()));

        // Writer: outbound frames and heartbeat
        let heartbeat_interval = self.config.heartbeat_interval();
        let pong_timeout = self.config.pong_timeout();
        let writer_events = events.clone();
        let writer_pong = Arc::clone(&last_pong);
        tokio::spawn(async move {
            let mut heartbeat = interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);
            loop {
                tokio::select! {
                    outgoing = out_rx.recv() => {
                        let frame = match outgoing {
                            Some(Outgoing::Text(text)) => Message::Text(text.into()),
                            Some(Outgoing::Pong(data)) => Message::Pong(data),
                            Some(Outgoing::Close) | None => {
                                let _ = write.send(Message::Close(None)).await;
                                break;
                            }
                        };
                        if let Err(e) = write.send(frame).await {
                            let _ = writer_events
                                .send(TransportEvent::Closed { reason: e.to_string() })
                                .await;
                            break;
                        }
                    }
                    _ = heartbeat.tick() => {
                        let silent_for = writer_pong.lock().elapsed();
                        if silent_for > pong_timeout {
                            log::warn!("No pong for {:?}, closing WebSocket", silent_for);
                            let _ = writer_events
                                .send(TransportEvent::Closed { reason: "pong timeout".to_string() })
                                .await;
                            break;
                        }
                        if let Err(e) = write.send(Message::Ping(Bytes::new())).await {
                            let _ = writer_events
                                .send(TransportEvent::Closed { reason: e.to_string() })
                                .await;
                            break;
                        }
                    }
                }
            }
        });

        // Reader: inbound frames
        let pong_tx = out_tx.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(message) => {
                            if events.send(TransportEvent::Message(message)).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            log::warn!("Dropping undecodable frame: {}", e);
                        }
                    },
                    Ok(Message::Ping(data)) => {
                        log::trace!("Received ping: {:?}", data);
                        let _ = pong_tx.send(Outgoing::Pong(data)).await;
                    }
                    Ok(Message::Pong(_)) => {
                        *last_pong.lock() = Instant::now();
                    }
                    Ok(Message::Close(frame)) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "closed by server".to_string());
                        let _ = events.send(TransportEvent::Closed { reason }).await;
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = events
                            .send(TransportEvent::Closed {
                                reason: e.to_string(),
                            })
                            .await;
                        return;
                    }
                }
            }
            let _ = events
                .send(TransportEvent::Closed {
                    reason: "stream ended".to_string(),
                })
                .await;
        });

        let previous = self.session.lock().replace(Session {
            outgoing: out_tx,
            reader,
        });
        if let Some(previous) = previous {
            previous.reader.abort();
            let _ = previous.outgoing.try_send(Outgoing::Close);
        }
        Ok(())
    }

    async fn send(&self, message: ClientMessage) -> Result<(), TransportError> {
        let outgoing = self
            .session
            .lock()
            .as_ref()
            .map(|s| s.outgoing.clone())
            .ok_or(TransportError::NotConnected)?;

        let text = serde_json::to_string(&message)?;
        outgoing
            .send(Outgoing::Text(text))
            .await
            .map_err(|_| TransportError::ChannelClosed)
    }

    async fn close(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            session.reader.abort();
            let _ = session.outgoing.try_send(Outgoing::Close);
            log::debug!("WebSocket session to {} closed", self.url);
        }
    }
}
