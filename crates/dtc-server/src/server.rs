//! The DTC server: accept loop, per-session handlers, heartbeat monitor,
//! and market-data fan-out.
//!
//! One task per concern:
//!
//! - **accept** — binds `(bind_address, port)` and spawns a reader task per
//!   client, up to `max_clients`
//! - **reader (per session)** — reads with a deadline of the negotiated
//!   heartbeat interval, drains complete frames, dispatches
//! - **monitor** — 1 s cadence; closes silent sessions, emits server
//!   heartbeats
//! - **fan-out** — drains the aggregator's event channel and translates
//!   each event per subscribed session
//!
//! A failure on one session never leaks to another: send errors close only
//! the offending session.

use std::net::SocketAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use anyhow::{Context, Result};
use dtc_core::config::{DEFAULT_HEARTBEAT_SECS, ServerConfig};
use dtc_core::dtc::{
    AlertMessage, DtcMessage, Heartbeat, LogonRequest, LogonResponse, MarketDataReject,
    MarketDataRequest, MarketDataUpdateBidAsk, MarketDataUpdateTrade, OrderStatus, OrderUpdate,
    PositionUpdate, RequestAction, SecurityDefinitionForSymbolRequest, SubmitNewSingleOrder,
    SymbolSearchRequest, encode,
};
use dtc_core::time_util;
use dtc_core::{FeedEvent, NormalizedQuote, NormalizedTrade, canonical_symbol, normalized_symbol};
use dtc_feed::aggregator::FeedAggregator;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::registry::SymbolRegistry;
use crate::session::{MALFORMED_FRAME_LIMIT, Session, SessionState, drain_frames};

type ClientSession = Session<OwnedWriteHalf>;

/// The DTC bridge server.
pub struct DtcServer {
    config: ServerConfig,
    registry: Arc<SymbolRegistry>,
    aggregator: Arc<FeedAggregator>,
    sessions: Mutex<AHashMap<u64, Arc<ClientSession>>>,
    /// Canonical symbol → number of sessions holding it; drives adapter
    /// subscription garbage collection.
    feed_refs: Mutex<AHashMap<String, usize>>,
    next_client_id: AtomicU64,
    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    tasks: tokio::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl DtcServer {
    pub fn new(
        config: ServerConfig,
        registry: Arc<SymbolRegistry>,
        aggregator: Arc<FeedAggregator>,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            config,
            registry,
            aggregator,
            sessions: Mutex::new(AHashMap::new()),
            feed_refs: Mutex::new(AHashMap::new()),
            next_client_id: AtomicU64::new(1),
            running: AtomicBool::new(false),
            shutdown_tx,
            tasks: tokio::sync::Mutex::new(Vec::new()),
        })
    }

    /// Bind the listener and launch the accept, monitor, and fan-out tasks.
    /// Returns the bound address (useful with port 0).
    pub async fn start(
        self: &Arc<Self>,
        events: mpsc::UnboundedReceiver<FeedEvent>,
    ) -> Result<SocketAddr> {
        let bind = format!("{}:{}", self.config.bind_address, self.config.port);
        let listener = TcpListener::bind(&bind).await.with_context(|| format!("bind {bind}"))?;
        let addr = listener.local_addr().context("local_addr")?;
        self.running.store(true, Ordering::SeqCst);
        info!("[server] '{}' listening on {addr}", self.config.server_name);

        let mut tasks = self.tasks.lock().await;
        let server = self.clone();
        tasks.push(tokio::spawn(async move {
            server.accept_loop(listener).await;
        }));
        let server = self.clone();
        tasks.push(tokio::spawn(async move {
            server.heartbeat_monitor().await;
        }));
        let server = self.clone();
        tasks.push(tokio::spawn(async move {
            server.fanout_loop(events).await;
        }));
        Ok(addr)
    }

    /// Cooperative shutdown: flag, close sockets, join every task.
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("[server] shutting down");
        let _ = self.shutdown_tx.send(true);

        let sessions: Vec<Arc<ClientSession>> =
            self.sessions.lock().expect("sessions lock poisoned").values().cloned().collect();
        for session in sessions {
            session.set_state(SessionState::Disconnecting);
            session.notify_close();
            session.shutdown_writer().await;
        }

        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
        self.aggregator.shutdown().await;
        info!("[server] stopped");
    }

    pub fn client_count(&self) -> usize {
        self.sessions.lock().expect("sessions lock poisoned").len()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> String {
        format!(
            "{} on {}:{} — clients={} symbols={}",
            self.config.server_name,
            self.config.bind_address,
            self.config.port,
            self.client_count(),
            self.registry.len(),
        )
    }

    // -----------------------------------------------------------------------
    // Accept path
    // -----------------------------------------------------------------------

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            let accepted = tokio::select! {
                _ = shutdown_rx.changed() => break,
                accepted = listener.accept() => accepted,
            };
            let (stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    if self.is_running() {
                        warn!("[server] accept failed: {e}");
                    }
                    break;
                }
            };

            if self.client_count() >= self.config.max_clients {
                warn!("[server] rejecting {peer}: max_clients={} reached", self.config.max_clients);
                let (_, mut writer) = stream.into_split();
                let alert = encode(&DtcMessage::AlertMessage(AlertMessage {
                    message_text: "server full".into(),
                }));
                let _ = writer.write_all(&alert).await;
                let _ = writer.shutdown().await;
                continue;
            }

            let id = self.next_client_id.fetch_add(1, Ordering::SeqCst);
            let (reader, writer) = stream.into_split();
            let session = Arc::new(Session::new(id, writer));
            info!("[server] client {id} connected from {peer}");
            self.sessions.lock().expect("sessions lock poisoned").insert(id, session.clone());

            let server = self.clone();
            let handle = tokio::spawn(async move {
                server.session_task(session, reader).await;
            });
            self.tasks.lock().await.push(handle);
        }
        debug!("[server] accept loop ended");
    }

    /// Reader task for one client: deadline reads, frame reassembly,
    /// dispatch.
    async fn session_task(self: Arc<Self>, session: Arc<ClientSession>, mut reader: OwnedReadHalf) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut buf: Vec<u8> = Vec::with_capacity(4096);
        let mut chunk = [0u8; 4096];
        let mut idle_timeouts = 0u32;

        'read: loop {
            if matches!(session.state(), SessionState::Disconnecting | SessionState::Disconnected) {
                break;
            }
            // Read deadline equals the negotiated heartbeat interval; the
            // default applies before logon negotiates one.
            let interval = session.heartbeat_interval();
            let deadline = Duration::from_secs(if interval == 0 {
                DEFAULT_HEARTBEAT_SECS as u64
            } else {
                interval
            });

            let read_result = tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = session.closed() => break,
                result = tokio::time::timeout(deadline, reader.read(&mut chunk)) => result,
            };

            match read_result {
                // Deadline passed with no inbound bytes.
                Err(_) => {
                    idle_timeouts += 1;
                    if idle_timeouts >= 2 || session.is_heartbeat_expired(time_util::now_ms()) {
                        warn!("[server] client {} heartbeat timeout", session.id);
                        break;
                    }
                }
                Ok(Ok(0)) => {
                    debug!("[server] client {} closed the connection", session.id);
                    break;
                }
                Ok(Ok(n)) => {
                    idle_timeouts = 0;
                    session.touch();
                    buf.extend_from_slice(&chunk[..n]);

                    let (frames, error) = drain_frames(&mut buf);
                    for frame in frames {
                        session.reset_malformed();
                        self.dispatch(&session, frame).await;
                        if session.state() == SessionState::Disconnecting {
                            break 'read;
                        }
                    }
                    if let Some(e) = error {
                        let streak = session.record_malformed();
                        warn!(
                            "[server] client {} sent a malformed frame ({e}); streak {streak}/{MALFORMED_FRAME_LIMIT}",
                            session.id
                        );
                        if streak >= MALFORMED_FRAME_LIMIT {
                            warn!("[server] client {} closed after repeated malformed frames", session.id);
                            break;
                        }
                    }
                }
                Ok(Err(e)) => {
                    debug!("[server] client {} read error: {e}", session.id);
                    break;
                }
            }
        }

        self.remove_session(&session).await;
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    async fn dispatch(&self, session: &Arc<ClientSession>, msg: DtcMessage) {
        match msg {
            DtcMessage::LogonRequest(req) => self.handle_logon(session, req).await,
            // Liveness was already recorded for the frame.
            DtcMessage::Heartbeat(_) => {}
            DtcMessage::Logoff(logoff) => {
                info!(
                    "[server] client {} logged off ({})",
                    session.id,
                    if logoff.reason.is_empty() { "no reason" } else { &logoff.reason }
                );
                session.set_state(SessionState::Disconnecting);
            }
            DtcMessage::MarketDataRequest(req) => self.handle_market_data(session, req).await,
            DtcMessage::SecurityDefinitionForSymbolRequest(req) => {
                self.handle_security_definition(session, req).await;
            }
            DtcMessage::SymbolSearchRequest(req) => self.handle_symbol_search(session, req).await,
            DtcMessage::SubmitNewSingleOrder(order) => self.handle_submit_order(session, order).await,
            DtcMessage::CurrentPositionsRequest(req) => {
                // No positions are kept; answer with an empty book.
                let response = DtcMessage::PositionUpdate(PositionUpdate {
                    request_id: req.request_id,
                    total_number_messages: 1,
                    message_number: 1,
                    trade_account: req.trade_account,
                    no_positions: 1,
                    ..Default::default()
                });
                let _ = session.send(&response).await;
            }
            DtcMessage::Unknown { msg_type } => {
                debug!("[server] client {} sent unsupported message type {msg_type}", session.id);
            }
            other => {
                debug!(
                    "[server] client {} sent server-bound frame type {} out of role",
                    session.id,
                    other.type_code()
                );
            }
        }
    }

    async fn handle_logon(&self, session: &Arc<ClientSession>, req: LogonRequest) {
        session.set_state(SessionState::Authenticating);

        let mut response = LogonResponse {
            server_name: self.config.server_name.clone(),
            ..Default::default()
        };

        let password_ok = !self.config.require_authentication
            || self.config.password.as_deref() == Some(req.password.as_str());

        if req.username.is_empty() {
            response.result_text = "username required".into();
        } else if !password_ok {
            response.result_text = "invalid credentials".into();
        } else {
            let interval = if req.heartbeat_interval == 0 {
                DEFAULT_HEARTBEAT_SECS
            } else {
                req.heartbeat_interval
            };
            session.set_heartbeat_interval(interval as u64);
            session.set_username(&req.username);
            session.set_state(SessionState::Authenticated);
            response.result = 1;
            response.result_text = "logon successful".into();
            info!(
                "[server] client {} logged on as '{}' (client='{}', heartbeat={interval}s)",
                session.id, req.username, req.client_name
            );
        }

        if response.result == 0 {
            warn!("[server] client {} logon rejected: {}", session.id, response.result_text);
            session.set_state(SessionState::Disconnecting);
        }
        // Sent in both outcomes; a rejected client reads the reason before
        // the close lands.
        let _ = session.send(&DtcMessage::LogonResponse(response)).await;
    }

    async fn handle_market_data(&self, session: &Arc<ClientSession>, req: MarketDataRequest) {
        if !session.state().is_authenticated() {
            self.reject_market_data(session, req.symbol_id, "not authenticated").await;
            return;
        }

        match req.request_action {
            RequestAction::Subscribe => {
                let canonical = canonical_symbol(&req.symbol);
                if !self.registry.contains(&canonical) {
                    self.reject_market_data(
                        session,
                        req.symbol_id,
                        &format!("unknown symbol: {}", req.symbol),
                    )
                    .await;
                    return;
                }
                let local_id = match session.allocate_symbol(&canonical) {
                    Ok(id) => id,
                    Err(e) => {
                        self.reject_market_data(session, req.symbol_id, &e.to_string()).await;
                        return;
                    }
                };
                if session.add_subscription(&canonical) {
                    self.ensure_feed_subscription(&canonical, &req.exchange).await;
                }
                session.set_state(SessionState::Subscribed);
                debug!(
                    "[server] client {} subscribed to {canonical} as local id {local_id}",
                    session.id
                );
            }
            RequestAction::Unsubscribe => {
                let canonical = canonical_symbol(&req.symbol);
                if session.remove_subscription(&canonical) {
                    self.release_feed_subscription(&canonical).await;
                    debug!("[server] client {} unsubscribed from {canonical}", session.id);
                }
            }
            RequestAction::Snapshot => {
                self.reject_market_data(session, req.symbol_id, "snapshots not available").await;
            }
            RequestAction::Unspecified => {
                self.reject_market_data(session, req.symbol_id, "unsupported request action").await;
            }
        }
    }

    async fn reject_market_data(&self, session: &Arc<ClientSession>, symbol_id: u16, text: &str) {
        let reject = DtcMessage::MarketDataReject(MarketDataReject {
            symbol_id,
            reject_text: text.to_string(),
        });
        let _ = session.send(&reject).await;
    }

    async fn handle_security_definition(
        &self,
        session: &Arc<ClientSession>,
        req: SecurityDefinitionForSymbolRequest,
    ) {
        let canonical = canonical_symbol(&req.symbol);
        let response = self.registry.security_definition(req.request_id, &canonical).unwrap_or_else(
            || dtc_core::dtc::SecurityDefinitionResponse {
                request_id: req.request_id,
                symbol: req.symbol.clone(),
                description: "unknown symbol".into(),
                ..Default::default()
            },
        );
        let _ = session.send(&DtcMessage::SecurityDefinitionResponse(Box::new(response))).await;
    }

    async fn handle_symbol_search(&self, session: &Arc<ClientSession>, req: SymbolSearchRequest) {
        let matches = self.registry.search(&req.search_text);
        debug!(
            "[server] client {} search '{}' matched {} symbol(s)",
            session.id,
            req.search_text,
            matches.len()
        );
        for info in matches {
            if let Some(def) = self.registry.security_definition(req.request_id, &info.canonical) {
                if session.send(&DtcMessage::SecurityDefinitionResponse(Box::new(def))).await.is_err() {
                    return;
                }
            }
        }
    }

    async fn handle_submit_order(&self, session: &Arc<ClientSession>, order: SubmitNewSingleOrder) {
        // Order entry is not routed anywhere; every order is rejected.
        let update = OrderUpdate {
            total_num_messages: 1,
            message_number: 1,
            symbol: order.symbol,
            exchange: order.exchange,
            client_order_id: order.client_order_id,
            order_status: OrderStatus::Rejected,
            order_type: order.order_type,
            buy_sell: order.buy_sell,
            price1: order.price1,
            price2: order.price2,
            order_quantity: order.quantity,
            remaining_quantity: order.quantity,
            time_in_force: order.time_in_force,
            trade_account: order.trade_account,
            info_text: "order entry is not supported by this server".into(),
            order_received_date_time: time_util::now_secs(),
            ..Default::default()
        };
        let _ = session.send(&DtcMessage::OrderUpdate(Box::new(update))).await;
    }

    // -----------------------------------------------------------------------
    // Feed subscription refcounting
    // -----------------------------------------------------------------------

    /// First subscriber for a symbol triggers the upstream subscribe.
    async fn ensure_feed_subscription(&self, canonical: &str, exchange: &str) {
        let newly = {
            let mut refs = self.feed_refs.lock().expect("feed refs lock poisoned");
            let count = refs.entry(canonical.to_string()).or_insert(0);
            *count += 1;
            *count == 1
        };
        if newly {
            let normalized = normalized_symbol(canonical);
            if let Err(e) = self.aggregator.subscribe_symbol(&normalized, exchange).await {
                warn!("[server] upstream subscribe for {canonical} failed: {e}");
            }
        }
    }

    /// Last unsubscriber for a symbol garbage-collects the upstream
    /// subscription.
    async fn release_feed_subscription(&self, canonical: &str) {
        let emptied = {
            let mut refs = self.feed_refs.lock().expect("feed refs lock poisoned");
            match refs.get_mut(canonical) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    false
                }
                Some(_) => {
                    refs.remove(canonical);
                    true
                }
                None => false,
            }
        };
        if emptied {
            let normalized = normalized_symbol(canonical);
            if let Err(e) = self.aggregator.unsubscribe_symbol(&normalized, "").await {
                warn!("[server] upstream unsubscribe for {canonical} failed: {e}");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Monitor & fan-out
    // -----------------------------------------------------------------------

    async fn heartbeat_monitor(self: Arc<Self>) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => return,
                _ = tick.tick() => {}
            }
            let now = time_util::now_ms();
            let sessions: Vec<Arc<ClientSession>> =
                self.sessions.lock().expect("sessions lock poisoned").values().cloned().collect();
            for session in sessions {
                if session.is_heartbeat_expired(now) {
                    warn!("[server] client {} heartbeat timeout", session.id);
                    self.close_session(&session).await;
                } else if session.take_heartbeat_due(now) {
                    let heartbeat = DtcMessage::Heartbeat(Heartbeat {
                        num_drops: 0,
                        current_date_time: time_util::now_secs(),
                    });
                    if session.send(&heartbeat).await.is_err() {
                        self.close_session(&session).await;
                    }
                }
            }
        }
    }

    async fn fanout_loop(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<FeedEvent>) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            let event = tokio::select! {
                _ = shutdown_rx.changed() => return,
                event = events.recv() => event,
            };
            match event {
                None => return,
                Some(FeedEvent::Trade(trade)) => self.fan_out_trade(&trade).await,
                Some(FeedEvent::Quote(quote)) => self.fan_out_quote(&quote).await,
                Some(FeedEvent::Connection { exchange, connected }) => {
                    info!("[server] feed '{exchange}' {}", if connected { "up" } else { "down" });
                }
                Some(FeedEvent::Error { exchange, message }) => {
                    warn!("[server] feed '{exchange}': {message}");
                }
            }
        }
    }

    /// Sessions subscribed to the event's symbol, snapshot under the lock.
    fn subscribers_of(&self, canonical: &str) -> Vec<Arc<ClientSession>> {
        self.sessions
            .lock()
            .expect("sessions lock poisoned")
            .values()
            .filter(|s| s.is_subscribed(canonical))
            .cloned()
            .collect()
    }

    async fn fan_out_trade(&self, trade: &NormalizedTrade) {
        let canonical = canonical_symbol(&trade.symbol);
        for session in self.subscribers_of(&canonical) {
            let Some(symbol_id) = session.symbol_id(&canonical) else {
                continue;
            };
            let update = DtcMessage::MarketDataUpdateTrade(MarketDataUpdateTrade {
                symbol_id,
                at_bid_or_ask: trade.side.at_bid_or_ask(),
                price: trade.price,
                volume: trade.size,
                date_time: trade.timestamp_ns,
            });
            if session.send(&update).await.is_err() {
                warn!("[server] client {} send failed, closing", session.id);
                self.close_session(&session).await;
            }
        }
    }

    async fn fan_out_quote(&self, quote: &NormalizedQuote) {
        let canonical = canonical_symbol(&quote.symbol);
        for session in self.subscribers_of(&canonical) {
            let Some(symbol_id) = session.symbol_id(&canonical) else {
                continue;
            };
            let update = DtcMessage::MarketDataUpdateBidAsk(MarketDataUpdateBidAsk {
                symbol_id,
                bid_price: quote.bid_price,
                bid_quantity: quote.bid_size as f32,
                ask_price: quote.ask_price,
                ask_quantity: quote.ask_size as f32,
                date_time: quote.timestamp_ns,
                is_bid_change: 1,
                is_ask_change: 1,
            });
            if session.send(&update).await.is_err() {
                warn!("[server] client {} send failed, closing", session.id);
                self.close_session(&session).await;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Session teardown
    // -----------------------------------------------------------------------

    /// Push a session into Disconnecting and unblock its reader.
    async fn close_session(&self, session: &Arc<ClientSession>) {
        session.set_state(SessionState::Disconnecting);
        session.notify_close();
        session.shutdown_writer().await;
    }

    /// Final teardown, run by the reader task on its way out.
    async fn remove_session(&self, session: &Arc<ClientSession>) {
        let removed =
            self.sessions.lock().expect("sessions lock poisoned").remove(&session.id).is_some();
        if !removed {
            return;
        }
        session.set_state(SessionState::Disconnected);
        session.shutdown_writer().await;
        for canonical in session.subscriptions() {
            self.release_feed_subscription(&canonical).await;
        }
        info!("[server] client {} disconnected", session.id);
    }
}
