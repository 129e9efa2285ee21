//! Coinbase exchange market-data adapter.
//!
//! One connection task owns the WebSocket: it subscribes, reads, answers
//! pings, and reconnects with exponential backoff. Everything
//! exchange-specific is confined to this module — symbol mapping
//! (`BTC-USD` ⇄ `BTC/USD`) and the channel JSON in [`json_parser`].
//!
//! The subscription book is authoritative: subscriptions made while the
//! feed is down are recorded and replayed on (re)connect before the feed
//! reports healthy. No synthetic events are ever produced on subscribe;
//! data flows only when the exchange sends it.

pub mod json_parser;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use dtc_core::error::BridgeError;
use dtc_core::{NormalizedQuote, NormalizedTrade, canonical_symbol, normalized_symbol};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::reconnect::{MAX_CONSECUTIVE_FAILURES, backoff_delay};
use crate::subscription::{SubscriptionBook, SubscriptionKind};
use crate::transport::{WsConnector, WsEvent, WsStream};
use crate::{ExchangeFeed, FeedSink};

use ahash::AHashMap;
use json_parser::{CoinbaseEvent, build_subscribe, build_unsubscribe};

/// Keep-alive cadence on the upstream socket.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Map a subscription kind onto the Coinbase channel name.
fn channel_name(kind: SubscriptionKind) -> &'static str {
    match kind {
        SubscriptionKind::Trades => "matches",
        SubscriptionKind::Level2 => "level2",
        SubscriptionKind::Ticker => "ticker",
        SubscriptionKind::Heartbeat => "heartbeat",
    }
}

const ALL_KINDS: [SubscriptionKind; 4] = [
    SubscriptionKind::Trades,
    SubscriptionKind::Level2,
    SubscriptionKind::Ticker,
    SubscriptionKind::Heartbeat,
];

// ---------------------------------------------------------------------------
// Top-of-book cache for level2 → quote folding
// ---------------------------------------------------------------------------

/// Best bid/offer derived from snapshot + l2update traffic.
#[derive(Debug, Clone, Copy, Default)]
struct TopOfBook {
    bid_price: f64,
    bid_size: f64,
    ask_price: f64,
    ask_size: f64,
}

impl TopOfBook {
    /// Fold one book change in; returns `true` when the top moved.
    fn apply(&mut self, is_bid: bool, price: f64, size: f64) -> bool {
        if is_bid {
            if size == 0.0 {
                if price == self.bid_price {
                    self.bid_size = 0.0;
                    return true;
                }
                return false;
            }
            if self.bid_price == 0.0 || price >= self.bid_price {
                self.bid_price = price;
                self.bid_size = size;
                return true;
            }
        } else {
            if size == 0.0 {
                if price == self.ask_price {
                    self.ask_size = 0.0;
                    return true;
                }
                return false;
            }
            if self.ask_price == 0.0 || price <= self.ask_price {
                self.ask_price = price;
                self.ask_size = size;
                return true;
            }
        }
        false
    }
}

// ---------------------------------------------------------------------------
// CoinbaseFeed
// ---------------------------------------------------------------------------

/// The Coinbase market-data feed.
pub struct CoinbaseFeed {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    ws_url: String,
    connector: Box<dyn WsConnector>,
    /// Products this feed can serve (exchange format), seeded at build time.
    catalog: Vec<String>,
    book: SubscriptionBook,
    sink: RwLock<Option<Arc<dyn FeedSink>>>,
    connected: AtomicBool,
    running: AtomicBool,
    /// Sender feeding the current connection's write half; `None` while down.
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    tops: Mutex<AHashMap<String, TopOfBook>>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl CoinbaseFeed {
    /// Create a feed over the given transport.
    ///
    /// `catalog` lists the exchange-format products the feed advertises via
    /// [`ExchangeFeed::available_symbols`].
    pub fn new(
        name: impl Into<String>,
        ws_url: impl Into<String>,
        connector: Box<dyn WsConnector>,
        catalog: Vec<String>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                ws_url: ws_url.into(),
                connector,
                catalog,
                book: SubscriptionBook::new(),
                sink: RwLock::new(None),
                connected: AtomicBool::new(false),
                running: AtomicBool::new(false),
                outbound: Mutex::new(None),
                tops: Mutex::new(AHashMap::new()),
                shutdown_tx,
                task: Mutex::new(None),
            }),
        }
    }

    async fn subscribe_kind(&self, normalized: &str, kind: SubscriptionKind) -> Result<()> {
        let product = self.exchange_format(normalized);
        let newly = self.inner.book.add(&product, kind);
        if newly && self.is_connected() {
            self.inner.send(build_subscribe(channel_name(kind), std::slice::from_ref(&product)));
        }
        Ok(())
    }
}

impl Inner {
    fn sink(&self) -> Option<Arc<dyn FeedSink>> {
        self.sink.read().expect("sink lock poisoned").clone()
    }

    /// Queue a message for the current connection; dropped silently while
    /// disconnected (the book replays on reconnect).
    fn send(&self, msg: String) {
        if let Some(tx) = self.outbound.lock().expect("outbound lock poisoned").as_ref() {
            let _ = tx.send(msg);
        }
    }

    fn notify_connection(&self, connected: bool) {
        if let Some(sink) = self.sink() {
            sink.on_connection(&self.name, connected);
        }
    }

    fn notify_error(&self, error: &BridgeError) {
        if let Some(sink) = self.sink() {
            sink.on_error(&self.name, error);
        }
    }

    /// Decode one inbound text frame and push the resulting events.
    fn handle_text(&self, text: &str) {
        let Some(event) = json_parser::parse_message(text) else {
            return;
        };
        let Some(sink) = self.sink() else {
            return;
        };

        match event {
            CoinbaseEvent::Trade { product_id, price, size, side, timestamp_ns } => {
                sink.on_trade(NormalizedTrade {
                    symbol: normalized_symbol(&product_id),
                    exchange: self.name.clone(),
                    timestamp_ns,
                    price,
                    size,
                    side,
                });
            }
            CoinbaseEvent::Ticker {
                product_id,
                bid_price,
                bid_size,
                ask_price,
                ask_size,
                timestamp_ns,
            } => {
                sink.on_quote(NormalizedQuote {
                    symbol: normalized_symbol(&product_id),
                    exchange: self.name.clone(),
                    timestamp_ns,
                    bid_price,
                    bid_size,
                    ask_price,
                    ask_size,
                });
            }
            CoinbaseEvent::Snapshot { product_id, bid_price, bid_size, ask_price, ask_size } => {
                let top = TopOfBook { bid_price, bid_size, ask_price, ask_size };
                self.tops.lock().expect("tops lock poisoned").insert(product_id.clone(), top);
                sink.on_quote(NormalizedQuote {
                    symbol: normalized_symbol(&product_id),
                    exchange: self.name.clone(),
                    timestamp_ns: dtc_core::time_util::now_ns(),
                    bid_price,
                    bid_size,
                    ask_price,
                    ask_size,
                });
            }
            CoinbaseEvent::L2Update { product_id, timestamp_ns, changes } => {
                let mut tops = self.tops.lock().expect("tops lock poisoned");
                let top = tops.entry(product_id.clone()).or_default();
                let mut moved = false;
                for change in &changes {
                    moved |= top.apply(change.is_bid, change.price, change.size);
                }
                let top = *top;
                drop(tops);
                if moved {
                    sink.on_quote(NormalizedQuote {
                        symbol: normalized_symbol(&product_id),
                        exchange: self.name.clone(),
                        timestamp_ns,
                        bid_price: top.bid_price,
                        bid_size: top.bid_size,
                        ask_price: top.ask_price,
                        ask_size: top.ask_size,
                    });
                }
            }
            CoinbaseEvent::Heartbeat { .. } | CoinbaseEvent::Subscriptions => {}
            CoinbaseEvent::Error { message } => {
                warn!("[{}] feed error: {message}", self.name);
                self.notify_error(&BridgeError::TransientNetwork(message));
            }
        }
    }
}

#[async_trait]
impl ExchangeFeed for CoinbaseFeed {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn set_sink(&self, sink: Arc<dyn FeedSink>) {
        *self.inner.sink.write().expect("sink lock poisoned") = Some(sink);
    }

    async fn connect(&self) -> Result<()> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _ = self.inner.shutdown_tx.send(false);
        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            connection_loop(inner).await;
        });
        *self.inner.task.lock().expect("task lock poisoned") = Some(task);
        Ok(())
    }

    async fn disconnect(&self) {
        let _ = self.inner.shutdown_tx.send(true);
        let task = self.inner.task.lock().expect("task lock poisoned").take();
        if let Some(task) = task {
            let _ = task.await;
        }
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    async fn subscribe_trades(&self, symbol: &str) -> Result<()> {
        self.subscribe_kind(symbol, SubscriptionKind::Trades).await
    }

    async fn subscribe_level2(&self, symbol: &str) -> Result<()> {
        self.subscribe_kind(symbol, SubscriptionKind::Level2).await
    }

    async fn unsubscribe(&self, symbol: &str) -> Result<()> {
        let product = self.exchange_format(symbol);
        let removed = self.inner.book.remove_product(&product);
        self.inner.tops.lock().expect("tops lock poisoned").remove(&product);
        if self.is_connected() {
            for kind in removed {
                self.inner
                    .send(build_unsubscribe(channel_name(kind), std::slice::from_ref(&product)));
            }
        }
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
        self.inner.catalog.iter().map(|p| normalized_symbol(p)).collect()
    }

    fn subscribed_symbols(&self) -> Vec<String> {
        self.inner.book.products().iter().map(|p| normalized_symbol(p)).collect()
    }

    fn status(&self) -> String {
        format!(
            "{}: connected={} subscriptions={}",
            self.inner.name,
            self.is_connected(),
            self.inner.book.len(),
        )
    }
}

// ---------------------------------------------------------------------------
// Connection task
// ---------------------------------------------------------------------------

/// Connect, replay, serve, reconnect — until shutdown or the failure budget
/// runs out.
async fn connection_loop(inner: Arc<Inner>) {
    let mut shutdown_rx = inner.shutdown_tx.subscribe();
    let mut streak: u32 = 0;

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let delay = match inner.connector.connect(&inner.ws_url).await {
            Ok(mut ws) => {
                info!("[{}] connected to {}", inner.name, inner.ws_url);
                match replay_subscriptions(&inner, ws.as_mut()).await {
                    Ok(()) => {
                        streak = 0;
                        let (tx, rx) = mpsc::unbounded_channel();
                        *inner.outbound.lock().expect("outbound lock poisoned") = Some(tx);
                        inner.connected.store(true, Ordering::SeqCst);
                        inner.notify_connection(true);

                        serve(&inner, ws, rx, &mut shutdown_rx).await;

                        inner.connected.store(false, Ordering::SeqCst);
                        *inner.outbound.lock().expect("outbound lock poisoned") = None;
                        inner.notify_connection(false);
                        if *shutdown_rx.borrow() {
                            break;
                        }
                        backoff_delay(1)
                    }
                    Err(e) => {
                        warn!("[{}] subscription replay failed: {e}", inner.name);
                        ws.close().await;
                        streak += 1;
                        if streak >= MAX_CONSECUTIVE_FAILURES {
                            feed_down(&inner, streak);
                            break;
                        }
                        backoff_delay(streak)
                    }
                }
            }
            Err(e) => {
                streak += 1;
                warn!(
                    "[{}] connect failed ({streak}/{MAX_CONSECUTIVE_FAILURES}): {e}",
                    inner.name
                );
                if streak >= MAX_CONSECUTIVE_FAILURES {
                    feed_down(&inner, streak);
                    break;
                }
                backoff_delay(streak)
            }
        };

        debug!("[{}] reconnecting in {delay:?}", inner.name);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_rx.changed() => break,
        }
    }

    inner.running.store(false, Ordering::SeqCst);
    debug!("[{}] connection task ended", inner.name);
}

fn feed_down(inner: &Inner, streak: u32) {
    warn!("[{}] giving up after {streak} consecutive failures", inner.name);
    inner.notify_error(&BridgeError::FeedDown(format!(
        "{}: {streak} consecutive reconnect failures",
        inner.name
    )));
}

/// Re-send every active subscription; the feed is not healthy until this
/// completes.
async fn replay_subscriptions(inner: &Inner, ws: &mut dyn WsStream) -> Result<()> {
    for kind in ALL_KINDS {
        let products = inner.book.active_products(kind);
        if products.is_empty() {
            continue;
        }
        debug!("[{}] replaying {} {:?} subscription(s)", inner.name, products.len(), kind);
        ws.send_text(&build_subscribe(channel_name(kind), &products)).await?;
    }
    Ok(())
}

/// Read/write loop for one live connection. Returns on disconnect or
/// shutdown.
async fn serve(
    inner: &Arc<Inner>,
    mut ws: Box<dyn WsStream>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    let mut ping = tokio::time::interval_at(Instant::now() + PING_INTERVAL, PING_INTERVAL);

    // The socket is one object, so the select only *picks* the next step;
    // all socket I/O happens after the arm futures are dropped.
    enum Step {
        Shutdown,
        Inbound(Option<WsEvent>),
        Outbound(Option<String>),
        Ping,
    }

    loop {
        let step = tokio::select! {
            _ = shutdown_rx.changed() => Step::Shutdown,
            event = ws.next_event() => Step::Inbound(event),
            msg = outbound_rx.recv() => Step::Outbound(msg),
            _ = ping.tick() => Step::Ping,
        };

        match step {
            Step::Shutdown => {
                ws.close().await;
                return;
            }
            Step::Inbound(Some(WsEvent::Text(text))) => inner.handle_text(&text),
            Step::Inbound(Some(WsEvent::Ping(payload))) => {
                let _ = ws.send_pong(payload).await;
            }
            Step::Inbound(Some(WsEvent::Binary(_))) => {}
            Step::Inbound(Some(WsEvent::Closed)) | Step::Inbound(None) => {
                warn!("[{}] stream ended", inner.name);
                return;
            }
            Step::Outbound(Some(msg)) => {
                if let Err(e) = ws.send_text(&msg).await {
                    warn!("[{}] send failed: {e}", inner.name);
                    return;
                }
            }
            // The sender lives in `Inner` until this function returns.
            Step::Outbound(None) => return,
            Step::Ping => {
                if ws.send_ping().await.is_err() {
                    return;
                }
            }
        }
    }
}
