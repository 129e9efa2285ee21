//! # dtc-feed
//!
//! Exchange market-data feeds for the DTC bridge.
//!
//! ## Architecture
//!
//! Each exchange implements the [`ExchangeFeed`] trait — connect, subscribe,
//! symbol mapping, status. Normalized events leave the adapter through a
//! [`FeedSink`] installed by the [`aggregator::FeedAggregator`], which owns
//! all adapters and multiplexes their events into one channel for the server.
//!
//! ## Shared infrastructure
//!
//! - [`transport`] — `WebSocketTransport` abstraction (TLS default, fake for tests)
//! - [`subscription`] — per-adapter subscription book, replayed on reconnect
//! - [`reconnect`] — exponential backoff schedule
//! - [`coinbase`] — the Coinbase exchange adapter
//! - [`mock`] — scriptable in-process feed for tests and `COINBASE_TEST_MODE=mock`

pub mod aggregator;
pub mod coinbase;
pub mod mock;
pub mod reconnect;
pub mod subscription;
pub mod transport;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use dtc_core::error::BridgeError;
use dtc_core::{NormalizedQuote, NormalizedTrade};

/// Consumer of normalized feed events.
///
/// Implementations are invoked on the adapter's worker task and must not
/// block: hand the event to a queue and return.
pub trait FeedSink: Send + Sync {
    fn on_trade(&self, trade: NormalizedTrade);
    fn on_quote(&self, quote: NormalizedQuote);
    /// Feed connection state changed (also fired after subscription replay
    /// completes on reconnect).
    fn on_connection(&self, exchange: &str, connected: bool);
    fn on_error(&self, exchange: &str, error: &BridgeError);
}

/// Trait implemented by all exchange market-data feeds.
///
/// Symbols passed in and out of the trait use the normalized `BASE/QUOTE`
/// form; each adapter converts to its exchange's native format internally.
///
/// # Lifecycle
///
/// 1. Construct via the exchange-specific `new(...)`.
/// 2. [`set_sink`](ExchangeFeed::set_sink), then [`connect`](ExchangeFeed::connect)
///    to start the connection task (reconnects run automatically).
/// 3. Subscribe / unsubscribe at any time; subscriptions made while
///    disconnected are recorded and replayed once the feed is up.
/// 4. [`disconnect`](ExchangeFeed::disconnect) to stop.
#[async_trait]
pub trait ExchangeFeed: Send + Sync {
    /// Exchange identifier (e.g. `"coinbase"`).
    fn name(&self) -> &str;

    /// Install the event consumer. Must be called before `connect`.
    fn set_sink(&self, sink: Arc<dyn FeedSink>);

    /// Start the connection task. Returns once the task is launched;
    /// connection state is reported through the sink.
    async fn connect(&self) -> Result<()>;

    /// Stop the connection task and close the socket.
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Subscribe to trade prints for a normalized symbol.
    async fn subscribe_trades(&self, symbol: &str) -> Result<()>;

    /// Subscribe to order-book updates for a normalized symbol.
    async fn subscribe_level2(&self, symbol: &str) -> Result<()>;

    /// Drop every subscription for a normalized symbol.
    async fn unsubscribe(&self, symbol: &str) -> Result<()>;

    /// Subscribe a batch of symbols to trades and level2 in one call.
    async fn subscribe_many(&self, symbols: &[String]) -> Result<()>;

    /// Exchange symbol → normalized form (e.g. `BTC-USD` → `BTC/USD`).
    fn normalize(&self, exchange_symbol: &str) -> String;

    /// Normalized form → exchange symbol (e.g. `BTC/USD` → `BTC-USD`).
    fn exchange_format(&self, normalized: &str) -> String;

    /// Symbols this feed can serve, normalized.
    fn available_symbols(&self) -> Vec<String>;

    /// Currently subscribed symbols, normalized.
    fn subscribed_symbols(&self) -> Vec<String>;

    /// One-line human-readable status.
    fn status(&self) -> String;
}
