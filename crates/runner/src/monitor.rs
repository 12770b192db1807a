//! Monitor - mounts every feed and logs how each one evolves

use beacon_core::{Channel, ConnectionState};
use beacon_sync::{
    DefiFeed, FeedPayload, FeedState, FeedStatus, Freshness, GameFiFeed, MarketFeed, NftFeed,
    PriceFeed, SyncClient,
};
use std::fmt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// One-line digest of a feed's state
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSummary {
    pub channel: Channel,
    pub status: FeedStatus,
    pub freshness: Option<Freshness>,
    pub items: usize,
}

impl FeedSummary {
    fn of<T: FeedPayload>(state: &FeedState<T>) -> Self {
        Self {
            channel: T::CHANNEL,
            status: state.status,
            freshness: state.freshness,
            items: state.data.as_ref().map_or(0, |data| data.item_count()),
        }
    }
}

impl fmt::Display for FeedSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({} items", self.channel, self.status, self.items)?;
        match self.freshness {
            Some(Freshness::Live) => write!(f, ", live)"),
            Some(Freshness::Cached { age }) => write!(f, ", cached {}s ago)", age.as_secs()),
            None => write!(f, ")"),
        }
    }
}

pub struct Monitor {
    market: MarketFeed,
    prices: PriceFeed,
    defi: DefiFeed,
    nft: NftFeed,
    gamefi: GameFiFeed,
    tasks: Vec<JoinHandle<()>>,
}

impl Monitor {
    /// Mount all five feeds on `client`. Prices are narrowed to `symbols`
    /// when it is non-empty.
    pub fn start(client: &SyncClient, symbols: &[String]) -> Self {
        let market = MarketFeed::mount(client, Vec::<String>::new());
        let prices = PriceFeed::mount(client, symbols.iter().cloned());
        let defi = DefiFeed::mount(client, Vec::<String>::new());
        let nft = NftFeed::mount(client, Vec::<String>::new());
        let gamefi = GameFiFeed::mount(client, Vec::<String>::new());

        let tasks = vec![
            log_connection(client.watch_connection()),
            log_feed(market.watch()),
            log_feed(prices.watch()),
            log_feed(defi.watch()),
            log_feed(nft.watch()),
            log_feed(gamefi.watch()),
        ];

        log::info!("Monitor started");
        Self {
            market,
            prices,
            defi,
            nft,
            gamefi,
            tasks,
        }
    }

    pub fn summary(&self) -> Vec<FeedSummary> {
        vec![
            FeedSummary::of(&self.market.state()),
            FeedSummary::of(&self.prices.state()),
            FeedSummary::of(&self.defi.state()),
            FeedSummary::of(&self.nft.state()),
            FeedSummary::of(&self.gamefi.state()),
        ]
    }

    /// Refresh every feed from the network
    pub async fn refresh_all(&self) {
        self.market.refresh().await;
        self.prices.refresh().await;
        self.defi.refresh().await;
        self.nft.refresh().await;
        self.gamefi.refresh().await;
    }

    /// Stop logging and unmount every feed
    pub fn stop(self) {
        for line in self.summary() {
            log::info!("Final {}", line);
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

fn log_feed<T: FeedPayload>(mut rx: watch::Receiver<FeedState<T>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last: Option<FeedSummary> = None;
        while rx.changed().await.is_ok() {
            let summary = FeedSummary::of(&*rx.borrow_and_update());
            if last.as_ref() == Some(&summary) {
                continue;
            }
            match summary.status {
                FeedStatus::Error => {
                    let error = rx.borrow().error.clone();
                    match error {
                        Some(e) => log::warn!("{}: {}", summary, e),
                        None => log::warn!("{}", summary),
                    }
                }
                _ => log::info!("{}", summary),
            }
            last = Some(summary);
        }
    })
}

fn log_connection(mut rx: watch::Receiver<ConnectionState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let state = *rx.borrow_and_update();
            log::info!("Connection {}", state);
        }
    })
}
