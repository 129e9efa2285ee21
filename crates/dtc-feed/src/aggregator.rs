//! Multi-feed aggregator.
//!
//! Owns every attached [`ExchangeFeed`], installs one shared [`FeedSink`]
//! relay on each, and multiplexes their events into a single channel the
//! server drains. The adapters map is locked for mutation only; event
//! delivery goes straight through the relay channel and never takes the
//! lock, so adapter worker tasks cannot stall on aggregator administration.

use std::sync::Arc;

use ahash::AHashMap;
use anyhow::{Result, anyhow, bail};
use dtc_core::FeedEvent;
use dtc_core::error::BridgeError;
use dtc_core::{NormalizedQuote, NormalizedTrade};
use tokio::sync::{Mutex, mpsc};
use tracing::{info, warn};

use crate::{ExchangeFeed, FeedSink};

/// Owns the exchange adapters and fans their events into one channel.
pub struct FeedAggregator {
    feeds: Mutex<AHashMap<String, Arc<dyn ExchangeFeed>>>,
    relay: Arc<EventRelay>,
}

impl FeedAggregator {
    /// Build an aggregator plus the receiving end of its event channel.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FeedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let aggregator = Arc::new(Self {
            feeds: Mutex::new(AHashMap::new()),
            relay: Arc::new(EventRelay { tx }),
        });
        (aggregator, rx)
    }

    /// Attach a feed: install the relay sink, start its connection task,
    /// and record it under its exchange name.
    pub async fn add_exchange(&self, feed: Arc<dyn ExchangeFeed>) -> Result<()> {
        let name = feed.name().to_string();
        let mut feeds = self.feeds.lock().await;
        if feeds.contains_key(&name) {
            bail!("exchange '{name}' is already attached");
        }
        feed.set_sink(self.relay.clone());
        feed.connect().await?;
        info!("[aggregator] exchange '{name}' attached");
        feeds.insert(name, feed);
        Ok(())
    }

    /// Detach and disconnect a feed. Returns `false` for unknown names.
    pub async fn remove_exchange(&self, name: &str) -> bool {
        let feed = self.feeds.lock().await.remove(name);
        match feed {
            Some(feed) => {
                feed.disconnect().await;
                info!("[aggregator] exchange '{name}' removed");
                true
            }
            None => false,
        }
    }

    /// Subscribe a normalized symbol on one exchange, or on every attached
    /// exchange when `exchange` is empty. Subscriptions on feeds that are
    /// currently down are recorded in their books and replayed on reconnect.
    pub async fn subscribe_symbol(&self, symbol: &str, exchange: &str) -> Result<()> {
        let feeds = self.feeds.lock().await;
        let symbols = [symbol.to_string()];
        if exchange.is_empty() {
            for feed in feeds.values() {
                feed.subscribe_many(&symbols).await?;
            }
            return Ok(());
        }
        feeds
            .get(exchange)
            .ok_or_else(|| anyhow!("unknown exchange '{exchange}'"))?
            .subscribe_many(&symbols)
            .await
    }

    /// Drop a normalized symbol from one exchange, or from all when
    /// `exchange` is empty.
    pub async fn unsubscribe_symbol(&self, symbol: &str, exchange: &str) -> Result<()> {
        let feeds = self.feeds.lock().await;
        if exchange.is_empty() {
            for feed in feeds.values() {
                feed.unsubscribe(symbol).await?;
            }
            return Ok(());
        }
        feeds
            .get(exchange)
            .ok_or_else(|| anyhow!("unknown exchange '{exchange}'"))?
            .unsubscribe(symbol)
            .await
    }

    /// Names of every attached exchange.
    pub async fn active_exchanges(&self) -> Vec<String> {
        let mut names: Vec<String> = self.feeds.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Distinct subscribed products summed over all feeds.
    pub async fn total_subscriptions(&self) -> usize {
        let feeds = self.feeds.lock().await;
        feeds.values().map(|f| f.subscribed_symbols().len()).sum()
    }

    /// One status line per feed.
    pub async fn status(&self) -> String {
        let feeds = self.feeds.lock().await;
        if feeds.is_empty() {
            return "no exchanges attached".to_string();
        }
        let mut lines: Vec<String> = feeds.values().map(|f| f.status()).collect();
        lines.sort();
        lines.join("\n")
    }

    /// Disconnect every feed (shutdown path).
    pub async fn shutdown(&self) {
        let feeds: Vec<Arc<dyn ExchangeFeed>> =
            self.feeds.lock().await.drain().map(|(_, f)| f).collect();
        for feed in feeds {
            feed.disconnect().await;
        }
    }
}

/// The sink installed on every adapter. Pushes into an unbounded channel so
/// callbacks return without blocking the adapter's worker task.
struct EventRelay {
    tx: mpsc::UnboundedSender<FeedEvent>,
}

impl FeedSink for EventRelay {
    fn on_trade(&self, trade: NormalizedTrade) {
        let _ = self.tx.send(FeedEvent::Trade(trade));
    }

    fn on_quote(&self, quote: NormalizedQuote) {
        let _ = self.tx.send(FeedEvent::Quote(quote));
    }

    fn on_connection(&self, exchange: &str, connected: bool) {
        let _ = self.tx.send(FeedEvent::Connection {
            exchange: exchange.to_string(),
            connected,
        });
    }

    fn on_error(&self, exchange: &str, error: &BridgeError) {
        warn!("[aggregator] feed '{exchange}' error: {error}");
        let _ = self.tx.send(FeedEvent::Error {
            exchange: exchange.to_string(),
            message: error.to_string(),
        });
    }
}
