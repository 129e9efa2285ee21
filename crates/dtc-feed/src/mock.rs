//! Scriptable in-process feed.
//!
//! Implements [`ExchangeFeed`] without any network I/O. Tests (and
//! `COINBASE_TEST_MODE=mock` deployments) drive it through a
//! [`MockFeedHandle`]: inject trades and quotes, flip the connection state,
//! and inspect which subscribe calls the server issued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use dtc_core::error::BridgeError;
use dtc_core::{NormalizedQuote, NormalizedTrade, canonical_symbol, normalized_symbol};

use crate::subscription::{SubscriptionBook, SubscriptionKind};
use crate::{ExchangeFeed, FeedSink};

/// A feed whose events come from the test harness instead of a socket.
pub struct MockFeed {
    inner: Arc<MockInner>,
}

struct MockInner {
    name: String,
    connected: AtomicBool,
    book: SubscriptionBook,
    sink: RwLock<Option<Arc<dyn FeedSink>>>,
    subscribe_calls: Mutex<Vec<String>>,
    unsubscribe_calls: Mutex<Vec<String>>,
}

impl MockFeed {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(MockInner {
                name: name.into(),
                connected: AtomicBool::new(false),
                book: SubscriptionBook::new(),
                sink: RwLock::new(None),
                subscribe_calls: Mutex::new(Vec::new()),
                unsubscribe_calls: Mutex::new(Vec::new()),
            }),
        }
    }

    /// A handle for driving this feed after ownership moves to the
    /// aggregator.
    pub fn handle(&self) -> MockFeedHandle {
        MockFeedHandle { inner: self.inner.clone() }
    }
}

impl MockInner {
    fn sink(&self) -> Option<Arc<dyn FeedSink>> {
        self.sink.read().expect("sink lock poisoned").clone()
    }
}

/// Drives a [`MockFeed`] from the outside.
#[derive(Clone)]
pub struct MockFeedHandle {
    inner: Arc<MockInner>,
}

impl MockFeedHandle {
    /// Push a trade through the sink. The exchange tag is overwritten with
    /// this feed's name, as a real adapter would.
    pub fn inject_trade(&self, mut trade: NormalizedTrade) {
        trade.exchange = self.inner.name.clone();
        if let Some(sink) = self.inner.sink() {
            sink.on_trade(trade);
        }
    }

    /// Push a quote through the sink.
    pub fn inject_quote(&self, mut quote: NormalizedQuote) {
        quote.exchange = self.inner.name.clone();
        if let Some(sink) = self.inner.sink() {
            sink.on_quote(quote);
        }
    }

    /// Simulate an upstream drop.
    pub fn inject_disconnect(&self) {
        self.inner.connected.store(false, Ordering::SeqCst);
        if let Some(sink) = self.inner.sink() {
            sink.on_connection(&self.inner.name, false);
        }
    }

    /// Simulate the feed coming back.
    pub fn inject_reconnect(&self) {
        self.inner.connected.store(true, Ordering::SeqCst);
        if let Some(sink) = self.inner.sink() {
            sink.on_connection(&self.inner.name, true);
        }
    }

    /// Simulate a feed-level error.
    pub fn inject_error(&self, error: BridgeError) {
        if let Some(sink) = self.inner.sink() {
            sink.on_error(&self.inner.name, &error);
        }
    }

    /// Exchange-format products passed to subscribe calls, in order.
    pub fn subscribe_calls(&self) -> Vec<String> {
        self.inner.subscribe_calls.lock().unwrap().clone()
    }

    /// Exchange-format products passed to unsubscribe calls, in order.
    pub fn unsubscribe_calls(&self) -> Vec<String> {
        self.inner.unsubscribe_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExchangeFeed for MockFeed {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn set_sink(&self, sink: Arc<dyn FeedSink>) {
        *self.inner.sink.write().expect("sink lock poisoned") = Some(sink);
    }

    async fn connect(&self) -> Result<()> {
        self.inner.connected.store(true, Ordering::SeqCst);
        if let Some(sink) = self.inner.sink() {
            sink.on_connection(&self.inner.name, true);
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.inner.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    async fn subscribe_trades(&self, symbol: &str) -> Result<()> {
        let product = self.exchange_format(symbol);
        self.inner.book.add(&product, SubscriptionKind::Trades);
        self.inner.subscribe_calls.lock().unwrap().push(product);
        Ok(())
    }

    async fn subscribe_level2(&self, symbol: &str) -> Result<()> {
        let product = self.exchange_format(symbol);
        self.inner.book.add(&product, SubscriptionKind::Level2);
        Ok(())
    }

    async fn unsubscribe(&self, symbol: &str) -> Result<()> {
        let product = self.exchange_format(symbol);
        self.inner.book.remove_product(&product);
        self.inner.unsubscribe_calls.lock().unwrap().push(product);
        Ok(())
    }

    async fn subscribe_many(&self, symbols: &[String]) -> Result<()> {
        for symbol in symbols {
            self.subscribe_trades(symbol).await?;
            self.subscribe_level2(symbol).await?;
        }
        Ok(())
    }

    fn normalize(&self, exchange_symbol: &str) -> String {
        normalized_symbol(exchange_symbol)
    }

    fn exchange_format(&self, normalized: &str) -> String {
        canonical_symbol(normalized)
    }

    fn available_symbols(&self) -> Vec<String> {
        self.inner.book.products().iter().map(|p| normalized_symbol(p)).collect()
    }

    fn subscribed_symbols(&self) -> Vec<String> {
        self.inner.book.products().iter().map(|p| normalized_symbol(p)).collect()
    }

    fn status(&self) -> String {
        format!(
            "{}: connected={} subscriptions={} (mock)",
            self.inner.name,
            self.is_connected(),
            self.inner.book.len(),
        )
    }
}
