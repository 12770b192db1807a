//! End-to-end scenarios for the sync client over an in-memory transport
//!
//! The `ChannelTransportHandle` plays the backend, `ManualClock` drives cache
//! ages and Tokio's paused clock drives timeouts and backoff.

use async_trait::async_trait;
use beacon_clock::{Clock, ManualClock};
use beacon_core::{
    Channel, ChatRequest, ChatResponse, ClientMessage, ConnectionState, ServerMessage,
};
use beacon_gateway::{ChannelTransport, ChannelTransportHandle, ReconnectConfig};
use beacon_ports::{FetchError, Fetcher};
use beacon_sync::{
    ChatSession, DefiFeed, ErrorKind, FeedStatus, FetchPolicy, Freshness, MarketFeed,
    MemorySnapshotStore, PriceFeed, SyncClient, SyncConfig, SyncError, Update,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

// ============================================================================
// Fixtures
// ============================================================================

#[derive(Default)]
struct FakeFetcher {
    responses: Mutex<HashMap<Channel, Result<Value, FetchError>>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
    chat_calls: AtomicUsize,
}

impl FakeFetcher {
    fn respond(&self, channel: Channel, response: Result<Value, FetchError>) {
        self.responses.lock().insert(channel, response);
    }

    fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, channel: Channel, _params: &[String]) -> Result<Value, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .get(&channel)
            .cloned()
            .unwrap_or_else(|| Err(FetchError::Network("connection refused".to_string())))
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, FetchError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ChatResponse {
            response: format!("rest: {}", request.message),
            confidence: None,
            suggestions: None,
        })
    }
}

struct Harness {
    client: SyncClient,
    backend: ChannelTransportHandle,
    fetcher: Arc<FakeFetcher>,
    store: Arc<MemorySnapshotStore>,
    clock: Arc<ManualClock>,
}

fn harness() -> Harness {
    harness_with(MemorySnapshotStore::new(), ManualClock::new(None))
}

fn harness_with(store: MemorySnapshotStore, clock: Arc<ManualClock>) -> Harness {
    build_harness(store, clock, ReconnectConfig::fixed(100, 1_000, 0))
}

fn build_harness(
    store: MemorySnapshotStore,
    clock: Arc<ManualClock>,
    reconnect: ReconnectConfig,
) -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();

    let (transport, backend) = ChannelTransport::pair();
    let fetcher = Arc::new(FakeFetcher::default());
    let store = Arc::new(store);
    let client = SyncClient::with_reconnect(
        SyncConfig::default(),
        reconnect,
        Arc::new(transport),
        fetcher.clone(),
        store.clone(),
        clock.clone(),
    );
    Harness {
        client,
        backend,
        fetcher,
        store,
        clock,
    }
}

fn market(dominance: f64) -> Value {
    json!({
        "totalMarketCap": "2400000000000",
        "totalVolume24h": "98000000000",
        "btcDominance": dominance
    })
}

fn prices() -> Value {
    json!([
        { "symbol": "BTC", "price": "67000.5", "change24h": 1.2 },
        { "symbol": "ETH", "price": "3200" }
    ])
}

fn recorder() -> (Arc<Mutex<Vec<Value>>>, impl Fn(&Update) + Send + Sync + 'static) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    (log, move |update: &Update| sink.lock().push(update.data.clone()))
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}

fn count_subscribes(sent: &[ClientMessage]) -> usize {
    sent.iter()
        .filter(|m| matches!(m, ClientMessage::Subscribe { .. }))
        .count()
}

fn count_unsubscribes(sent: &[ClientMessage]) -> usize {
    sent.iter()
        .filter(|m| matches!(m, ClientMessage::Unsubscribe { .. }))
        .count()
}

async fn connected(h: &Harness) {
    h.client.init().unwrap();
    h.backend.wait_open().await;
    eventually(|| h.client.is_connected()).await;
}

// ============================================================================
// Streaming
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_updates_arrive_in_order() {
    let h = harness();
    let (log, listener) = recorder();
    let _sub = h.client.subscribe(Channel::Market, Vec::<String>::new(), listener);

    connected(&h).await;
    // Subscriptions made before connecting are sent by the on-connect replay
    h.backend.wait_sent(1).await;
    assert_eq!(
        h.backend.sent()[0],
        ClientMessage::Subscribe {
            channel: Channel::Market,
            params: vec![]
        }
    );

    for dominance in [50.0, 51.0, 52.0] {
        h.backend
            .push(ServerMessage::update(Channel::Market, market(dominance)))
            .await
            .unwrap();
    }

    eventually(|| log.lock().len() == 3).await;
    let seen: Vec<f64> = log
        .lock()
        .iter()
        .map(|v| v["btcDominance"].as_f64().unwrap())
        .collect();
    assert_eq!(seen, vec![50.0, 51.0, 52.0]);

    let cached = h.client.cache().get("market").unwrap();
    assert_eq!(cached.payload["btcDominance"], 52.0);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_payload_never_reaches_listeners_or_cache() {
    let h = harness();
    let (log, listener) = recorder();
    let _sub = h.client.subscribe(Channel::Market, Vec::<String>::new(), listener);
    connected(&h).await;

    h.backend
        .push(ServerMessage::update(Channel::Market, json!({ "garbage": true })))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(log.lock().is_empty());
    assert!(h.client.cache().get("market").is_none());
    assert!(h.store.blob().is_none());

    h.backend
        .push(ServerMessage::update(Channel::Market, market(49.5)))
        .await
        .unwrap();
    eventually(|| log.lock().len() == 1).await;
    // Snapshot writes land on the blocking pool
    eventually(|| h.store.blob().is_some_and(|blob| blob.contains("49.5"))).await;
}

#[tokio::test(start_paused = true)]
async fn test_ref_counted_teardown_sends_single_unsubscribe() {
    let h = harness();
    connected(&h).await;

    let (_log_a, a) = recorder();
    let (_log_b, b) = recorder();
    let first = h.client.subscribe(Channel::Defi, Vec::<String>::new(), a);
    let second = h.client.subscribe(Channel::Defi, Vec::<String>::new(), b);

    h.backend.wait_sent(1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(count_subscribes(&h.backend.sent()), 1);

    drop(first);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(count_unsubscribes(&h.backend.sent()), 0);

    drop(second);
    h.backend.wait_sent(2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let sent = h.backend.sent();
    assert_eq!(count_unsubscribes(&sent), 1);
    assert_eq!(sent.len(), 2);
    assert!(!h.client.registry().is_active(Channel::Defi));
}

#[tokio::test(start_paused = true)]
async fn test_subscriptions_resume_after_reconnect() {
    let h = harness();
    let (log, listener) = recorder();
    let _prices = h.client.subscribe(Channel::Prices, ["BTC"], listener);
    let (_market_log, market_listener) = recorder();
    let _market = h.client.subscribe(Channel::Market, Vec::<String>::new(), market_listener);

    connected(&h).await;
    h.backend.wait_sent(2).await;
    h.backend.clear_sent();

    h.backend.drop_connection("server restart").await;
    h.backend.wait_opens(2).await;
    h.backend.wait_sent(2).await;

    let keys: Vec<_> = h.backend.sent().iter().filter_map(|m| m.key()).collect();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0].channel, Channel::Prices);
    assert_eq!(keys[0].params, vec!["BTC".to_string()]);
    assert_eq!(keys[1].channel, Channel::Market);

    eventually(|| h.client.is_connected()).await;
    assert!(!h.client.is_offline());
    h.backend
        .push(ServerMessage::update(Channel::Prices, prices()))
        .await
        .unwrap();
    eventually(|| log.lock().len() == 1).await;
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_after_giving_up() {
    let h = build_harness(
        MemorySnapshotStore::new(),
        ManualClock::new(None),
        ReconnectConfig::fixed(100, 1_000, 2),
    );
    let (log, listener) = recorder();
    let _sub = h.client.subscribe(Channel::Market, Vec::<String>::new(), listener);

    // The first open plus two retries
    h.backend.fail_next_opens(3);
    h.client.init().unwrap();
    eventually(|| h.client.is_offline()).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.client.connection_state(), ConnectionState::Disconnected);
    assert_eq!(h.backend.open_count(), 0);

    h.client.reconnect().unwrap();
    h.backend.wait_open().await;
    eventually(|| h.client.is_connected()).await;
    assert!(!h.client.is_offline());

    // The replay re-activates the subscription on the new session
    h.backend.wait_sent(1).await;
    assert_eq!(count_subscribes(&h.backend.sent()), 1);
    h.backend
        .push(ServerMessage::update(Channel::Market, market(48.0)))
        .await
        .unwrap();
    eventually(|| log.lock().len() == 1).await;

    // Already connected: nothing new is opened
    h.client.reconnect().unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(h.backend.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_before_init_fails() {
    let h = harness();
    assert_eq!(h.client.reconnect(), Err(SyncError::NotInitialized));
}

// ============================================================================
// Requests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_request_before_init_fails() {
    let h = harness();
    let err = h.client.request(Channel::AiChat, json!({})).await.unwrap_err();
    assert_eq!(err, SyncError::NotInitialized);
}

#[tokio::test(start_paused = true)]
async fn test_request_times_out_after_drop() {
    let h = harness();
    connected(&h).await;

    h.backend.fail_next_opens(10_000);
    h.backend.drop_connection("network lost").await;
    eventually(|| !h.client.is_connected()).await;

    let started = tokio::time::Instant::now();
    let err = h
        .client
        .request(Channel::AiChat, json!({ "message": "hello?" }))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert_eq!(h.client.pending_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_request_round_trip() {
    let h = harness();
    h.backend.echo_requests();
    connected(&h).await;

    let reply = h
        .client
        .request(Channel::AiChat, json!({ "response": "pong" }))
        .await
        .unwrap();
    assert_eq!(reply["response"], "pong");
    assert_eq!(h.client.pending_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dispose_rejects_pending_requests() {
    let h = harness();
    connected(&h).await;

    let client = h.client.clone();
    let pending = tokio::spawn(async move { client.request(Channel::AiChat, json!({})).await });
    eventually(|| h.client.pending_requests() == 1).await;

    h.client.dispose().await;
    assert_eq!(pending.await.unwrap(), Err(SyncError::Disposed));
    assert_eq!(h.client.pending_requests(), 0);
    assert_eq!(h.client.init(), Err(SyncError::Disposed));
    assert!(!h.client.is_connected());
}

// ============================================================================
// Offline
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_offline_fetch_falls_back_to_cache() {
    let h = harness();
    connected(&h).await;

    h.backend
        .push(ServerMessage::update(Channel::Prices, prices()))
        .await
        .unwrap();
    eventually(|| h.client.cache().get("prices").is_some()).await;

    h.backend.fail_next_opens(10_000);
    h.backend.drop_connection("network lost").await;
    eventually(|| h.client.is_offline()).await;

    h.clock.advance_std(Duration::from_secs(5));
    let fetched = h
        .client
        .fetch(Channel::Prices, &[], FetchPolicy::PreferCache)
        .await
        .unwrap();
    assert_eq!(
        fetched.freshness,
        Freshness::Cached {
            age: Duration::from_secs(5)
        }
    );
    assert_eq!(fetched.data[0]["symbol"], "BTC");
    // Served without touching the network
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 0);

    // A filtered key falls back to the whole-channel entry
    let filtered = h
        .client
        .fetch(Channel::Prices, &["ETH".to_string()], FetchPolicy::Network)
        .await
        .unwrap();
    assert!(!filtered.freshness.is_live());

    let err = h
        .client
        .fetch(Channel::Defi, &[], FetchPolicy::PreferCache)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Offline);
}

#[tokio::test(start_paused = true)]
async fn test_online_fetch_failure_without_cache_is_fetch_error() {
    let h = harness();
    h.fetcher.respond(Channel::Nft, Err(FetchError::RateLimited));
    connected(&h).await;

    let err = h
        .client
        .fetch(Channel::Nft, &[], FetchPolicy::Network)
        .await
        .unwrap_err();
    assert_eq!(err, SyncError::Fetch(FetchError::RateLimited));
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_seeds_cache_on_init() {
    let clock = ManualClock::new(None);
    let now = clock.now();
    let blob = json!({
        "version": 1,
        "channels": {
            "market": { "payload": market(48.0), "timestamp": now - chrono::Duration::hours(1) },
            "prices": { "payload": prices(), "timestamp": now - chrono::Duration::days(2) },
            "bogus": { "payload": {}, "timestamp": now }
        }
    });
    let h = harness_with(MemorySnapshotStore::with_blob(blob.to_string()), clock);
    h.backend.fail_next_opens(10_000);
    h.client.init().unwrap();
    eventually(|| h.client.is_offline()).await;

    let fetched = h
        .client
        .fetch(Channel::Market, &[], FetchPolicy::PreferCache)
        .await
        .unwrap();
    assert_eq!(fetched.data["btcDominance"], 48.0);
    assert_eq!(
        fetched.freshness,
        Freshness::Cached {
            age: Duration::from_secs(3600)
        }
    );

    // Older than the snapshot TTL
    assert!(h.client.cache().get("prices").is_none());
}

// ============================================================================
// Feeds
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_feed_loads_from_eager_fetch() {
    let h = harness();
    h.fetcher.respond(Channel::Market, Ok(market(53.0)));

    let feed = MarketFeed::mount(&h.client, Vec::<String>::new());
    assert!(feed.snapshot().is_loading);

    eventually(|| feed.state().status == FeedStatus::Ready).await;
    let view = feed.snapshot();
    assert_eq!(view.data.unwrap().btc_dominance, 53.0);
    assert_eq!(view.freshness, Some(Freshness::Live));
    assert!(view.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_feed_push_beats_stale_fetch() {
    let h = harness();
    h.fetcher.respond(Channel::Market, Ok(market(40.0)));
    h.fetcher.set_delay(Duration::from_secs(5));

    let feed = MarketFeed::mount(&h.client, Vec::<String>::new());
    connected(&h).await;

    h.backend
        .push(ServerMessage::update(Channel::Market, market(60.0)))
        .await
        .unwrap();
    eventually(|| feed.data().is_some()).await;

    // Let the slow fetch finish
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 1);
    assert_eq!(feed.data().unwrap().btc_dominance, 60.0);
    assert_eq!(feed.state().status, FeedStatus::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_feed_filters_pushes_by_symbol() {
    let h = harness();
    let feed = PriceFeed::mount(&h.client, ["eth"]);
    connected(&h).await;

    h.backend
        .push(ServerMessage::update(Channel::Prices, prices()))
        .await
        .unwrap();
    eventually(|| feed.data().is_some()).await;

    let ticks = feed.data().unwrap();
    assert_eq!(ticks.len(), 1);
    assert_eq!(ticks[0].symbol, "ETH");
}

#[tokio::test(start_paused = true)]
async fn test_filtered_and_unfiltered_feeds_share_a_channel() {
    let h = harness();
    let everything = PriceFeed::mount(&h.client, Vec::<String>::new());
    let btc_only = PriceFeed::mount(&h.client, ["BTC"]);
    connected(&h).await;

    let all_prices = json!([
        { "symbol": "BTC", "price": "67000.5" },
        { "symbol": "ETH", "price": "3200" },
        { "symbol": "SOL", "price": "150" }
    ]);
    h.backend
        .push(ServerMessage::update(Channel::Prices, all_prices.clone()))
        .await
        .unwrap();
    eventually(|| everything.data().is_some() && btc_only.data().is_some()).await;

    let symbols: Vec<String> = everything
        .data()
        .unwrap()
        .into_iter()
        .map(|tick| tick.symbol)
        .collect();
    assert_eq!(symbols, vec!["BTC", "ETH", "SOL"]);

    let narrowed = btc_only.data().unwrap();
    assert_eq!(narrowed.len(), 1);
    assert_eq!(narrowed[0].symbol, "BTC");

    // The channel-wide cache entry holds the full list
    assert_eq!(h.client.cache().get("prices").unwrap().payload, all_prices);
}

#[tokio::test(start_paused = true)]
async fn test_feed_error_then_cached_refresh() {
    let h = harness();
    let defi = DefiFeed::mount(&h.client, Vec::<String>::new());
    eventually(|| defi.state().status == FeedStatus::Error).await;
    assert!(defi.data().is_none());
    assert_eq!(
        defi.state().error.map(|e| e.kind()),
        Some(ErrorKind::Fetch)
    );

    // Once a push landed, a failed refresh falls back to the cached copy
    let market_feed = MarketFeed::mount(&h.client, Vec::<String>::new());
    connected(&h).await;
    h.backend
        .push(ServerMessage::update(Channel::Market, market(55.0)))
        .await
        .unwrap();
    eventually(|| market_feed.data().is_some()).await;

    h.clock.advance_std(Duration::from_secs(2));
    market_feed.refresh().await;
    let state = market_feed.state();
    assert_eq!(state.status, FeedStatus::Ready);
    assert_eq!(
        state.freshness,
        Some(Freshness::Cached {
            age: Duration::from_secs(2)
        })
    );
    assert_eq!(state.data.unwrap().btc_dominance, 55.0);
}

#[tokio::test(start_paused = true)]
async fn test_unmounted_feed_ignores_late_fetch() {
    let h = harness();
    h.fetcher.respond(Channel::Market, Ok(market(50.0)));
    h.fetcher.set_delay(Duration::from_secs(2));

    let mut feed = MarketFeed::mount(&h.client, Vec::<String>::new());
    let watch = feed.watch();
    feed.unmount();
    assert!(!feed.is_mounted());
    assert_eq!(h.client.registry().listener_count(), 0);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(watch.borrow().data.is_none());
}

// ============================================================================
// Chat
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_chat_session_round_trip() {
    let h = harness();
    h.backend.set_auto_reply(|msg| match msg {
        ClientMessage::Request {
            channel,
            request_id,
            payload,
        } => Some(ServerMessage::reply(
            *channel,
            request_id,
            json!({ "response": format!("re: {}", payload["message"].as_str().unwrap_or("")) }),
        )),
        _ => None,
    });
    connected(&h).await;

    let session = ChatSession::new(&h.client);
    let response = session.send("what is TVL?", "defi").await.unwrap();
    assert_eq!(response.response, "re: what is TVL?");

    let second = session.send("and APY?", "defi").await.unwrap();
    assert_eq!(second.response, "re: and APY?");
    assert_eq!(session.history().len(), 4);
    assert!(!session.is_loading());
    assert!(session.error().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_chat_timeout_surfaces_in_session() {
    let h = harness();
    connected(&h).await;

    let session = ChatSession::new(&h.client);
    let err = session.send("anyone there?", "").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(session.error().map(|e| e.kind()), Some(ErrorKind::Timeout));
    assert!(session.history().is_empty());
    assert!(!session.is_loading());
    assert_eq!(h.client.pending_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_chat_uses_rest_while_disconnected() {
    let h = harness();
    h.backend.fail_next_opens(10_000);
    h.client.init().unwrap();

    let session = ChatSession::new(&h.client);
    let response = session.send("hi", "").await.unwrap();
    assert_eq!(response.response, "rest: hi");
    assert_eq!(h.fetcher.chat_calls.load(Ordering::SeqCst), 1);
}
