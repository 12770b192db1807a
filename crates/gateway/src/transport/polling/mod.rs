//! HTTP polling transport
//!
//! "Connected" means the last health probe succeeded. A channel is polled at
//! a fixed interval while any key on it is subscribed, with a per-channel
//! stagger before its first poll so channels do not fire together.
//!
//! Polls always fetch the whole channel. Subscription params never reach the
//! query string: updates fan out to every listener on the channel, and each
//! consumer narrows by its own params.

mod schedule;

pub use schedule::PollSchedule;

use async_trait::async_trait;
use beacon_core::{Channel, ClientMessage, ServerMessage, SubscriptionKey};
use beacon_ports::FetchError;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at, sleep_until};

use crate::adapters::RestFetcher;
use crate::error::{GatewayError, TransportError};
use crate::transport::config::PollingConfig;
use crate::transport::{Transport, TransportEvent};

enum PollCommand {
    Activate(SubscriptionKey),
    Deactivate(SubscriptionKey),
}

struct PollSession {
    commands: mpsc::UnboundedSender<PollCommand>,
    events: mpsc::Sender<TransportEvent>,
    tasks: Vec<JoinHandle<()>>,
}

impl PollSession {
    fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

/// Polls REST endpoints and reports each response as a channel update
pub struct PollingTransport {
    fetcher: RestFetcher,
    config: PollingConfig,
    session: Mutex<Option<PollSession>>,
}

impl PollingTransport {
    pub fn new(base_url: String, config: PollingConfig) -> Result<Self, GatewayError> {
        let fetcher = RestFetcher::new(base_url, config.clone())?;
        Ok(Self {
            fetcher,
            config,
            session: Mutex::new(None),
        })
    }

    /// Build on an existing fetcher (shares its HTTP client)
    pub fn with_fetcher(fetcher: RestFetcher) -> Self {
        let config = fetcher.config().clone();
        Self {
            fetcher,
            config,
            session: Mutex::new(None),
        }
    }

    pub fn fetcher(&self) -> &RestFetcher {
        &self.fetcher
    }

    fn spawn_request(
        &self,
        events: mpsc::Sender<TransportEvent>,
        channel: Channel,
        request_id: String,
        payload: serde_json::Value,
    ) {
        let fetcher = self.fetcher.clone();
        tokio::spawn(async move {
            let reply = match fetcher.post(channel, &payload).await {
                Ok(data) => ServerMessage::reply(channel, request_id, data),
                Err(e) => {
                    log::warn!("Request on {} failed: {}", channel, e);
                    ServerMessage::error_reply(channel, request_id, e.to_string())
                }
            };
            let _ = events.send(TransportEvent::Message(reply)).await;
        });
    }
}

#[async_trait]
impl Transport for PollingTransport {
    fn name(&self) -> &str {
        "polling"
    }

    async fn open(&self, events: mpsc::Sender<TransportEvent>) -> Result<(), TransportError> {
        self.fetcher
            .probe_health()
            .await
            .map_err(|e| TransportError::HealthCheck(e.to_string()))?;

        log::info!("Health check passed for {}", self.fetcher.base_url());

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let failures = Arc::new(AtomicU32::new(0));

        let health = tokio::spawn(run_health_loop(
            self.fetcher.clone(),
            self.config.clone(),
            events.clone(),
        ));
        let poller = tokio::spawn(run_poll_loop(
            self.fetcher.clone(),
            self.config.clone(),
            cmd_rx,
            events.clone(),
            failures,
        ));

        let previous = self.session.lock().replace(PollSession {
            commands: cmd_tx,
            events,
            tasks: vec![health, poller],
        });
        if let Some(previous) = previous {
            previous.shutdown();
        }
        Ok(())
    }

    async fn send(&self, message: ClientMessage) -> Result<(), TransportError> {
        let (commands, events) = self
            .session
            .lock()
            .as_ref()
            .map(|s| (s.commands.clone(), s.events.clone()))
            .ok_or(TransportError::NotConnected)?;

        let command = match message {
            ClientMessage::Subscribe { channel, params } => {
                PollCommand::Activate(SubscriptionKey::new(channel, params))
            }
            ClientMessage::Unsubscribe { channel, params } => {
                PollCommand::Deactivate(SubscriptionKey::new(channel, params))
            }
            ClientMessage::Request {
                channel,
                request_id,
                payload,
            } => {
                self.spawn_request(events, channel, request_id, payload);
                return Ok(());
            }
            // Health probes stand in for keepalives
            ClientMessage::Ping => return Ok(()),
        };

        commands
            .send(command)
            .map_err(|_| TransportError::ChannelClosed)
    }

    async fn close(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            session.shutdown();
            log::debug!("Polling session to {} closed", self.fetcher.base_url());
        }
    }
}

async fn run_health_loop(
    fetcher: RestFetcher,
    config: PollingConfig,
    events: mpsc::Sender<TransportEvent>,
) {
    let period = config.health_interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        ticker.tick().await;
        if let Err(e) = fetcher.probe_health().await {
            log::warn!("Health check failed: {}", e);
            let _ = events
                .send(TransportEvent::Closed {
                    reason: format!("health check failed: {}", e),
                })
                .await;
            return;
        }
    }
}

/// Subscribed keys per channel; a channel is scheduled while its set is non-empty
#[derive(Default)]
struct PollInterest {
    keys: HashMap<Channel, HashSet<SubscriptionKey>>,
}

impl PollInterest {
    /// Returns true when this is the channel's first key
    fn activate(&mut self, key: SubscriptionKey) -> bool {
        let keys = self.keys.entry(key.channel).or_default();
        keys.insert(key) && keys.len() == 1
    }

    /// Returns true when the channel has no keys left
    fn deactivate(&mut self, key: &SubscriptionKey) -> bool {
        let Some(keys) = self.keys.get_mut(&key.channel) else {
            return false;
        };
        if !keys.remove(key) || !keys.is_empty() {
            return false;
        }
        self.keys.remove(&key.channel);
        true
    }
}

async fn run_poll_loop(
    fetcher: RestFetcher,
    config: PollingConfig,
    mut commands: mpsc::UnboundedReceiver<PollCommand>,
    events: mpsc::Sender<TransportEvent>,
    failures: Arc<AtomicU32>,
) {
    let mut schedule = PollSchedule::new(config.interval());
    let mut interest = PollInterest::default();

    loop {
        let next_due = schedule.next_due();
        tokio::select! {
            command = commands.recv() => match command {
                Some(PollCommand::Activate(key)) => {
                    let channel = key.channel;
                    if interest.activate(key) {
                        let first_due = Instant::now() + config.stagger(channel);
                        schedule.insert(SubscriptionKey::channel(channel), first_due);
                        log::debug!("Polling {} every {:?}", channel, config.interval());
                    }
                }
                Some(PollCommand::Deactivate(key)) => {
                    if interest.deactivate(&key) {
                        schedule.remove(&SubscriptionKey::channel(key.channel));
                        log::debug!("Stopped polling {}", key.channel);
                    }
                }
                None => return,
            },
            _ = wait_until(next_due) => {
                for key in schedule.take_due(Instant::now()) {
                    tokio::spawn(poll_once(
                        fetcher.clone(),
                        key.channel,
                        events.clone(),
                        Arc::clone(&failures),
                        config.server_error_threshold,
                    ));
                }
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn poll_once(
    fetcher: RestFetcher,
    channel: Channel,
    events: mpsc::Sender<TransportEvent>,
    failures: Arc<AtomicU32>,
    threshold: u32,
) {
    let error = match fetcher.get_channel(channel, &[]).await {
        Ok(data) => {
            failures.store(0, Ordering::SeqCst);
            let message = ServerMessage::update(channel, data).with_timestamp(chrono::Utc::now());
            let _ = events.send(TransportEvent::Message(message)).await;
            return;
        }
        Err(FetchError::Decode(e)) => {
            log::warn!("Dropping undecodable {} response: {}", channel, e);
            return;
        }
        Err(FetchError::Http { status, message }) if status < 500 => {
            log::warn!("Poll of {} rejected with HTTP {}: {}", channel, status, message);
            let _ = events
                .send(TransportEvent::Warning(TransportError::Server { status }))
                .await;
            return;
        }
        Err(FetchError::Http { status, .. }) => TransportError::Server { status },
        Err(FetchError::RateLimited) => TransportError::Server { status: 429 },
        Err(e) => TransportError::Connection(e.to_string()),
    };

    let count = failures.fetch_add(1, Ordering::SeqCst) + 1;
    log::warn!("Poll of {} failed ({} consecutive): {}", channel, count, error);
    let _ = events.send(TransportEvent::Warning(error.clone())).await;

    if count >= threshold {
        let _ = events
            .send(TransportEvent::Closed {
                reason: format!("{} consecutive poll failures, last: {}", count, error),
            })
            .await;
    }
}
