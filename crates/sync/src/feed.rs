//! Hook Adapters: typed feeds over a [`SyncClient`]
//!
//! A [`Feed`] is what a view holds while it is on screen. Mounting it
//! subscribes to the channel and kicks off an eager fetch. Updates from
//! either source land in one observable [`FeedState`].
//!
//! Merge rule: every applied update bumps a version counter. A fetch result
//! only applies if no push arrived since the fetch started (or nothing is
//! shown yet), so fresher pushed data is never overwritten by a slow fetch.
//! The version check runs under the state lock, atomically with pushes.

use beacon_core::{
    Channel, DefiProtocol, GameFiProject, MarketOverview, NftCollection, PriceTick, Timestamp,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;

use crate::client::{FetchPolicy, Freshness, SubscriptionHandle, SyncClient};
use crate::error::SyncError;
use crate::registry::Update;

/// Payload type that can back a [`Feed`]
pub trait FeedPayload: DeserializeOwned + Clone + Send + Sync + 'static {
    const CHANNEL: Channel;

    /// Narrow the payload to `params` (symbols or names). Empty params keep
    /// everything.
    fn filter(self, _params: &[String]) -> Self {
        self
    }

    fn is_empty(&self) -> bool {
        false
    }

    fn item_count(&self) -> usize {
        1
    }
}

impl FeedPayload for MarketOverview {
    const CHANNEL: Channel = Channel::Market;
}

impl FeedPayload for Vec<PriceTick> {
    const CHANNEL: Channel = Channel::Prices;

    fn filter(self, params: &[String]) -> Self {
        if params.is_empty() {
            return self;
        }
        self.into_iter().filter(|tick| tick.matches(params)).collect()
    }

    fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    fn item_count(&self) -> usize {
        self.len()
    }
}

fn name_matches(name: &str, params: &[String]) -> bool {
    params.iter().any(|p| p.eq_ignore_ascii_case(name))
}

macro_rules! named_list_payload {
    ($item:ty, $channel:expr) => {
        impl FeedPayload for Vec<$item> {
            const CHANNEL: Channel = $channel;

            fn filter(self, params: &[String]) -> Self {
                if params.is_empty() {
                    return self;
                }
                self.into_iter()
                    .filter(|item| name_matches(&item.name, params))
                    .collect()
            }

            fn is_empty(&self) -> bool {
                self.as_slice().is_empty()
            }

            fn item_count(&self) -> usize {
                self.len()
            }
        }
    };
}

named_list_payload!(DefiProtocol, Channel::Defi);
named_list_payload!(NftCollection, Channel::Nft);
named_list_payload!(GameFiProject, Channel::GameFi);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Idle,
    Loading,
    Ready,
    Error,
}

impl fmt::Display for FeedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FeedStatus::Idle => "idle",
            FeedStatus::Loading => "loading",
            FeedStatus::Ready => "ready",
            FeedStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Observable state of a feed. `Error` keeps the last data.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedState<T> {
    pub status: FeedStatus,
    pub data: Option<T>,
    pub error: Option<SyncError>,
    pub freshness: Option<Freshness>,
    pub updated_at: Option<Timestamp>,
}

impl<T> Default for FeedState<T> {
    fn default() -> Self {
        Self {
            status: FeedStatus::Idle,
            data: None,
            error: None,
            freshness: None,
            updated_at: None,
        }
    }
}

/// Render-oriented view of [`FeedState`]
#[derive(Debug, Clone, PartialEq)]
pub struct FeedView<T> {
    pub data: Option<T>,
    pub is_loading: bool,
    pub error: Option<SyncError>,
    pub freshness: Option<Freshness>,
}

impl<T: Clone> From<&FeedState<T>> for FeedView<T> {
    fn from(state: &FeedState<T>) -> Self {
        Self {
            data: state.data.clone(),
            is_loading: state.status == FeedStatus::Loading,
            error: state.error.clone(),
            freshness: state.freshness,
        }
    }
}

struct Shared<T> {
    state: watch::Sender<FeedState<T>>,
    version: AtomicU64,
    alive: AtomicBool,
    params: Vec<String>,
}

impl<T: FeedPayload> Shared<T> {
    fn apply_push(&self, update: &Update) {
        if !self.alive.load(Ordering::SeqCst) {
            return;
        }
        let data = match T::deserialize(&update.data) {
            Ok(data) => data.filter(&self.params),
            Err(e) => {
                log::warn!("Dropping undecodable {} push: {}", T::CHANNEL, e);
                return;
            }
        };
        // A filtered push with none of our items is not news for this feed
        if !self.params.is_empty() && data.is_empty() {
            return;
        }

        self.state.send_modify(|state| {
            self.version.fetch_add(1, Ordering::SeqCst);
            state.status = FeedStatus::Ready;
            state.data = Some(data);
            state.error = None;
            state.freshness = Some(Freshness::Live);
            state.updated_at = Some(update.timestamp);
        });
    }

    async fn fetch(&self, client: &SyncClient, policy: FetchPolicy) {
        let started = self.version.load(Ordering::SeqCst);
        let result = client.fetch(T::CHANNEL, &self.params, policy).await;

        if !self.alive.load(Ordering::SeqCst) {
            log::debug!("Discarding {} fetch for unmounted feed", T::CHANNEL);
            return;
        }

        let fetched = result.and_then(|fetched| {
            let data = T::deserialize(&fetched.data)
                .map_err(|e| SyncError::Decode(beacon_core::DecodeError::new(T::CHANNEL, e)))?;
            Ok((data.filter(&self.params), fetched))
        });

        self.state.send_if_modified(|state| {
            let superseded = self.version.load(Ordering::SeqCst) != started;
            match fetched {
                Ok((data, fetched)) => {
                    if superseded && state.data.is_some() {
                        log::debug!("Ignoring stale {} fetch", T::CHANNEL);
                        return false;
                    }
                    self.version.fetch_add(1, Ordering::SeqCst);
                    state.status = FeedStatus::Ready;
                    state.data = Some(data);
                    state.error = None;
                    state.freshness = Some(fetched.freshness);
                    state.updated_at = Some(fetched.timestamp);
                    true
                }
                Err(error) => {
                    if superseded {
                        return false;
                    }
                    log::warn!("{} feed fetch failed: {}", T::CHANNEL, error);
                    state.status = FeedStatus::Error;
                    state.error = Some(error);
                    true
                }
            }
        });
    }
}

/// Mounted view of one channel. Unmounts on drop.
pub struct Feed<T: FeedPayload> {
    shared: Arc<Shared<T>>,
    client: SyncClient,
    subscription: Option<SubscriptionHandle>,
}

pub type MarketFeed = Feed<MarketOverview>;
pub type PriceFeed = Feed<Vec<PriceTick>>;
pub type DefiFeed = Feed<Vec<DefiProtocol>>;
pub type NftFeed = Feed<Vec<NftCollection>>;
pub type GameFiFeed = Feed<Vec<GameFiProject>>;

impl<T: FeedPayload> Feed<T> {
    /// Subscribe and start the eager fetch. Must be called inside a Tokio
    /// runtime.
    pub fn mount<I, S>(client: &SyncClient, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let params: Vec<String> = params.into_iter().map(Into::into).collect();
        let (state, _) = watch::channel(FeedState::default());
        state.send_modify(|s| s.status = FeedStatus::Loading);

        let shared = Arc::new(Shared {
            state,
            version: AtomicU64::new(0),
            alive: AtomicBool::new(true),
            params,
        });

        let weak: Weak<Shared<T>> = Arc::downgrade(&shared);
        let subscription = client.subscribe(T::CHANNEL, shared.params.clone(), move |update| {
            if let Some(shared) = weak.upgrade() {
                shared.apply_push(update);
            }
        });

        let eager = Arc::clone(&shared);
        let fetch_client = client.clone();
        tokio::spawn(async move {
            eager.fetch(&fetch_client, FetchPolicy::PreferCache).await;
        });

        log::debug!("Mounted {} feed", T::CHANNEL);
        Self {
            shared,
            client: client.clone(),
            subscription: Some(subscription),
        }
    }

    pub fn snapshot(&self) -> FeedView<T> {
        FeedView::from(&*self.shared.state.borrow())
    }

    pub fn state(&self) -> FeedState<T> {
        self.shared.state.borrow().clone()
    }

    pub fn data(&self) -> Option<T> {
        self.shared.state.borrow().data.clone()
    }

    pub fn watch(&self) -> watch::Receiver<FeedState<T>> {
        self.shared.state.subscribe()
    }

    pub fn params(&self) -> &[String] {
        &self.shared.params
    }

    pub fn is_mounted(&self) -> bool {
        self.shared.alive.load(Ordering::SeqCst)
    }

    /// Re-fetch from the network, bypassing the cache
    pub async fn refresh(&self) {
        if !self.is_mounted() {
            return;
        }
        self.shared
            .state
            .send_modify(|s| s.status = FeedStatus::Loading);
        self.shared.fetch(&self.client, FetchPolicy::Network).await;
    }

    pub fn unmount(&mut self) {
        if !self.shared.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        self.subscription.take();
        log::debug!("Unmounted {} feed", T::CHANNEL);
    }
}

impl<T: FeedPayload> Drop for Feed<T> {
    fn drop(&mut self) {
        self.unmount();
    }
}
