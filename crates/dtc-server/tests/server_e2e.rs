//! End-to-end tests over loopback TCP: a real `DtcServer` wired to a mock
//! feed, exercised by a raw DTC client speaking the binary protocol.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dtc_core::config::ServerConfig;
use dtc_core::dtc::{
    self, DtcMessage, Heartbeat, Logoff, LogonRequest, MarketDataRequest, RequestAction,
    SymbolSearchRequest,
};
use dtc_core::{NormalizedTrade, TradeSide};
use dtc_feed::aggregator::FeedAggregator;
use dtc_feed::mock::{MockFeed, MockFeedHandle};
use dtc_server::registry::SymbolRegistry;
use dtc_server::server::DtcServer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

async fn start_server(
    configure: impl FnOnce(&mut ServerConfig),
) -> (Arc<DtcServer>, SocketAddr, MockFeedHandle) {
    let (aggregator, events) = FeedAggregator::new();
    let feed = MockFeed::new("coinbase");
    let handle = feed.handle();
    aggregator.add_exchange(Arc::new(feed)).await.unwrap();

    let registry = Arc::new(SymbolRegistry::with_defaults());
    registry.allocate("BTC-USD").unwrap();
    registry.allocate("ETH-USD").unwrap();

    let mut config = ServerConfig::default();
    config.bind_address = "127.0.0.1".into();
    config.port = 0;
    config.server_name = "test-bridge".into();
    configure(&mut config);

    let server = DtcServer::new(config, registry, aggregator);
    let addr = server.start(events).await.unwrap();
    (server, addr, handle)
}

/// Raw DTC client with its own reassembly buffer.
struct TestClient {
    stream: TcpStream,
    buf: Vec<u8>,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        Self { stream, buf: Vec::new() }
    }

    async fn send(&mut self, msg: &DtcMessage) {
        self.stream.write_all(&dtc::encode(msg)).await.unwrap();
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    /// Next decoded frame, or `None` on timeout / EOF.
    async fn recv(&mut self, timeout: Duration) -> Option<DtcMessage> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(size) = dtc::frame_size(&self.buf) {
                if (size as usize) >= 4 && self.buf.len() >= size as usize {
                    let (msg, consumed) = dtc::decode(&self.buf[..size as usize]).unwrap();
                    self.buf.drain(..consumed);
                    return Some(msg);
                }
            }
            let mut chunk = [0u8; 4096];
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            match tokio::time::timeout(remaining, self.stream.read(&mut chunk)).await {
                Ok(Ok(0)) | Err(_) => return None,
                Ok(Ok(n)) => self.buf.extend_from_slice(&chunk[..n]),
                Ok(Err(_)) => return None,
            }
        }
    }

    /// True once the server closes the connection.
    async fn wait_for_eof(&mut self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let mut chunk = [0u8; 4096];
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match tokio::time::timeout(remaining, self.stream.read(&mut chunk)).await {
                Ok(Ok(0)) => return true,
                Ok(Ok(_)) => continue, // drain whatever is in flight
                Ok(Err(_)) => return true,
                Err(_) => return false,
            }
        }
    }

    async fn logon(&mut self, username: &str, heartbeat: u8) -> DtcMessage {
        self.send(&DtcMessage::LogonRequest(LogonRequest {
            username: username.into(),
            password: "x".into(),
            heartbeat_interval: heartbeat,
            client_name: "T".into(),
            ..Default::default()
        }))
        .await;
        self.recv(Duration::from_secs(2)).await.expect("logon response")
    }

    async fn subscribe(&mut self, symbol: &str, symbol_id: u16) {
        self.send(&DtcMessage::MarketDataRequest(MarketDataRequest {
            request_action: RequestAction::Subscribe,
            symbol_id,
            symbol: symbol.into(),
            exchange: String::new(),
        }))
        .await;
    }

    /// Round-trip a request the server always answers, proving every frame
    /// sent before it has been processed. Only safe while no market data
    /// is in flight for this client.
    async fn sync(&mut self) {
        self.send(&DtcMessage::SecurityDefinitionForSymbolRequest(
            dtc_core::dtc::SecurityDefinitionForSymbolRequest {
                request_id: 999_999,
                symbol: "BTC-USDC".into(),
                exchange: String::new(),
            },
        ))
        .await;
        loop {
            match self.recv(Duration::from_secs(2)).await.expect("sync reply") {
                DtcMessage::SecurityDefinitionResponse(def) if def.request_id == 999_999 => return,
                _ => continue,
            }
        }
    }

    async fn unsubscribe(&mut self, symbol: &str) {
        self.send(&DtcMessage::MarketDataRequest(MarketDataRequest {
            request_action: RequestAction::Unsubscribe,
            symbol_id: 0,
            symbol: symbol.into(),
            exchange: String::new(),
        }))
        .await;
    }
}

fn sample_trade(ts: u64) -> NormalizedTrade {
    NormalizedTrade {
        symbol: "BTC/USD".into(),
        exchange: String::new(),
        timestamp_ns: ts,
        price: 50_000.0,
        size: 0.01,
        side: TradeSide::Sell,
    }
}

/// Wait until the mock feed has seen `n` subscribe calls for a product.
async fn wait_for_subscribe(handle: &MockFeedHandle, product: &str, n: usize) {
    for _ in 0..100 {
        if handle.subscribe_calls().iter().filter(|p| p.as_str() == product).count() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("mock feed never saw subscribe #{n} for {product}");
}

// ---------------------------------------------------------------------------
// E1 — logon
// ---------------------------------------------------------------------------

#[tokio::test]
async fn logon_succeeds_with_server_identity() {
    let (server, addr, _handle) = start_server(|_| {}).await;
    let mut client = TestClient::connect(addr).await;

    match client.logon("alice", 10).await {
        DtcMessage::LogonResponse(response) => {
            assert_eq!(response.result, 1);
            assert_eq!(response.server_name, "test-bridge");
            assert_eq!(response.protocol_version, 8);
        }
        other => panic!("unexpected reply: {other:?}"),
    }
    assert_eq!(server.client_count(), 1);
    server.shutdown().await;
}

#[tokio::test]
async fn logon_without_username_is_rejected_and_closed() {
    let (server, addr, _handle) = start_server(|_| {}).await;
    let mut client = TestClient::connect(addr).await;

    match client.logon("", 10).await {
        DtcMessage::LogonResponse(response) => {
            assert_eq!(response.result, 0);
            assert!(!response.result_text.is_empty());
        }
        other => panic!("unexpected reply: {other:?}"),
    }
    assert!(client.wait_for_eof(Duration::from_secs(2)).await);
    server.shutdown().await;
}

#[tokio::test]
async fn logon_with_wrong_password_is_rejected() {
    let (server, addr, _handle) = start_server(|config| {
        config.require_authentication = true;
        config.password = Some("secret".into());
    })
    .await;
    let mut client = TestClient::connect(addr).await;

    // The helper always sends password "x".
    match client.logon("alice", 10).await {
        DtcMessage::LogonResponse(response) => assert_eq!(response.result, 0),
        other => panic!("unexpected reply: {other:?}"),
    }
    assert!(client.wait_for_eof(Duration::from_secs(2)).await);
    server.shutdown().await;
}

// ---------------------------------------------------------------------------
// E2 — subscribe / broadcast
// ---------------------------------------------------------------------------

#[tokio::test]
async fn subscribed_client_receives_injected_trade() {
    let (server, addr, handle) = start_server(|_| {}).await;
    let mut client = TestClient::connect(addr).await;
    client.logon("alice", 10).await;

    client.subscribe("BTC-USD", 0).await;
    wait_for_subscribe(&handle, "BTC-USD", 1).await;

    let ts = 1_700_000_000_000_000_000u64;
    handle.inject_trade(sample_trade(ts));

    match client.recv(Duration::from_secs(2)).await.expect("trade update") {
        DtcMessage::MarketDataUpdateTrade(update) => {
            assert_eq!(update.price, 50_000.0);
            assert_eq!(update.volume, 0.01);
            assert_eq!(update.date_time, ts);
            assert!(update.symbol_id >= 1);
            assert_eq!(update.at_bid_or_ask, 1.0); // sell prints at the bid
        }
        other => panic!("unexpected message: {other:?}"),
    }
    server.shutdown().await;
}

/// Property 3: the session-local id assigned to a symbol survives
/// unsubscribe / resubscribe.
#[tokio::test]
async fn symbol_id_is_stable_across_resubscribe() {
    let (server, addr, handle) = start_server(|_| {}).await;
    let mut client = TestClient::connect(addr).await;
    client.logon("alice", 10).await;

    client.subscribe("BTC-USD", 0).await;
    wait_for_subscribe(&handle, "BTC-USD", 1).await;
    handle.inject_trade(sample_trade(1));
    let first_id = match client.recv(Duration::from_secs(2)).await.unwrap() {
        DtcMessage::MarketDataUpdateTrade(update) => update.symbol_id,
        other => panic!("unexpected message: {other:?}"),
    };

    client.unsubscribe("BTC-USD").await;
    client.subscribe("BTC-USD", 0).await;
    wait_for_subscribe(&handle, "BTC-USD", 2).await;
    handle.inject_trade(sample_trade(2));
    let second_id = match client.recv(Duration::from_secs(2)).await.unwrap() {
        DtcMessage::MarketDataUpdateTrade(update) => update.symbol_id,
        other => panic!("unexpected message: {other:?}"),
    };

    assert_eq!(first_id, second_id);
    server.shutdown().await;
}

/// Property 4: every subscribed session gets exactly one copy; others get
/// nothing.
#[tokio::test]
async fn fan_out_covers_subscribers_only() {
    let (server, addr, handle) = start_server(|_| {}).await;

    let mut alice = TestClient::connect(addr).await;
    alice.logon("alice", 10).await;
    alice.subscribe("BTC-USD", 0).await;

    let mut bob = TestClient::connect(addr).await;
    bob.logon("bob", 10).await;
    bob.subscribe("BTC-USD", 0).await;

    let mut carol = TestClient::connect(addr).await;
    carol.logon("carol", 10).await;
    carol.subscribe("ETH-USD", 0).await;

    wait_for_subscribe(&handle, "BTC-USD", 1).await;
    wait_for_subscribe(&handle, "ETH-USD", 1).await;
    // Bob's and Carol's subscriptions don't reach the mock (refcounted),
    // so prove their frames were processed with a round-trip each.
    bob.sync().await;
    carol.sync().await;

    handle.inject_trade(sample_trade(7));

    for client in [&mut alice, &mut bob] {
        match client.recv(Duration::from_secs(2)).await.expect("update") {
            DtcMessage::MarketDataUpdateTrade(update) => assert_eq!(update.date_time, 7),
            other => panic!("unexpected message: {other:?}"),
        }
        // Exactly one copy.
        assert!(client.recv(Duration::from_millis(300)).await.is_none());
    }
    // Carol is subscribed to a different symbol.
    assert!(carol.recv(Duration::from_millis(300)).await.is_none());
    server.shutdown().await;
}

// ---------------------------------------------------------------------------
// E3 — heartbeat timeout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn silent_client_is_disconnected() {
    let (server, addr, _handle) = start_server(|_| {}).await;
    let mut client = TestClient::connect(addr).await;
    client.logon("alice", 2).await;

    // Send nothing; the 2 s interval expires twice and the server closes
    // the socket well inside 5 s.
    assert!(client.wait_for_eof(Duration::from_secs(5)).await);
    server.shutdown().await;
}

#[tokio::test]
async fn server_emits_heartbeats_to_live_clients() {
    let (server, addr, _handle) = start_server(|_| {}).await;
    let mut client = TestClient::connect(addr).await;
    client.logon("alice", 1).await;

    // Stay chatty and collect what the server pushes.
    let mut saw_heartbeat = false;
    for _ in 0..12 {
        client
            .send(&DtcMessage::Heartbeat(Heartbeat { num_drops: 0, current_date_time: 0 }))
            .await;
        if let Some(DtcMessage::Heartbeat(_)) = client.recv(Duration::from_millis(250)).await {
            saw_heartbeat = true;
            break;
        }
    }
    assert!(saw_heartbeat, "no server heartbeat within ~3 s at a 1 s interval");
    server.shutdown().await;
}

// ---------------------------------------------------------------------------
// E4 — unknown symbol
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_symbol_subscription_is_rejected() {
    let (server, addr, _handle) = start_server(|_| {}).await;
    let mut client = TestClient::connect(addr).await;
    client.logon("alice", 10).await;

    client.subscribe("ZZZ-USD", 42).await;
    match client.recv(Duration::from_secs(2)).await.expect("reject") {
        DtcMessage::MarketDataReject(reject) => {
            assert_eq!(reject.symbol_id, 42);
            assert!(!reject.reject_text.is_empty());
        }
        other => panic!("unexpected message: {other:?}"),
    }
    server.shutdown().await;
}

#[tokio::test]
async fn unauthenticated_market_data_request_is_rejected() {
    let (server, addr, _handle) = start_server(|_| {}).await;
    let mut client = TestClient::connect(addr).await;

    client.subscribe("BTC-USD", 5).await;
    match client.recv(Duration::from_secs(2)).await.expect("reject") {
        DtcMessage::MarketDataReject(reject) => assert_eq!(reject.symbol_id, 5),
        other => panic!("unexpected message: {other:?}"),
    }
    server.shutdown().await;
}

// ---------------------------------------------------------------------------
// E6 — framing boundary
// ---------------------------------------------------------------------------

#[tokio::test]
async fn partial_frames_reassemble_across_reads() {
    let (server, addr, handle) = start_server(|_| {}).await;
    let mut client = TestClient::connect(addr).await;

    let logon = dtc::encode(&DtcMessage::LogonRequest(LogonRequest {
        username: "alice".into(),
        password: "x".into(),
        heartbeat_interval: 10,
        client_name: "T".into(),
        ..Default::default()
    }));
    let subscribe = dtc::encode(&DtcMessage::MarketDataRequest(MarketDataRequest {
        request_action: RequestAction::Subscribe,
        symbol_id: 0,
        symbol: "BTC-USD".into(),
        exchange: String::new(),
    }));

    // One write carries the full logon plus half the subscribe.
    let mut first = logon.clone();
    first.extend_from_slice(&subscribe[..subscribe.len() / 2]);
    client.send_raw(&first).await;

    match client.recv(Duration::from_secs(2)).await.expect("logon response") {
        DtcMessage::LogonResponse(response) => assert_eq!(response.result, 1),
        other => panic!("unexpected message: {other:?}"),
    }

    // The remainder completes the subscribe; nothing lost, nothing doubled.
    tokio::time::sleep(Duration::from_millis(100)).await;
    client.send_raw(&subscribe[subscribe.len() / 2..]).await;
    wait_for_subscribe(&handle, "BTC-USD", 1).await;

    handle.inject_trade(sample_trade(9));
    match client.recv(Duration::from_secs(2)).await.expect("trade update") {
        DtcMessage::MarketDataUpdateTrade(update) => assert_eq!(update.date_time, 9),
        other => panic!("unexpected message: {other:?}"),
    }
    server.shutdown().await;
}

#[tokio::test]
async fn repeated_malformed_frames_close_the_session() {
    let (server, addr, _handle) = start_server(|_| {}).await;
    let mut client = TestClient::connect(addr).await;
    client.logon("alice", 10).await;

    // Logoff frame whose string has no NUL terminator.
    let mut garbage = 8u16.to_le_bytes().to_vec();
    garbage.extend_from_slice(&5u16.to_le_bytes());
    garbage.extend_from_slice(b"oops");

    let mut closed = false;
    for _ in 0..10 {
        client.send_raw(&garbage).await;
        if client.wait_for_eof(Duration::from_millis(200)).await {
            closed = true;
            break;
        }
    }
    assert!(closed, "session survived repeated malformed frames");
    server.shutdown().await;
}

// ---------------------------------------------------------------------------
// Ancillary surfaces
// ---------------------------------------------------------------------------

#[tokio::test]
async fn security_definitions_and_search_answer_from_the_registry() {
    let (server, addr, _handle) = start_server(|_| {}).await;
    let mut client = TestClient::connect(addr).await;
    client.logon("alice", 10).await;

    client
        .send(&DtcMessage::SecurityDefinitionForSymbolRequest(
            dtc_core::dtc::SecurityDefinitionForSymbolRequest {
                request_id: 21,
                symbol: "BTC-USDC".into(),
                exchange: "coinbase".into(),
            },
        ))
        .await;
    match client.recv(Duration::from_secs(2)).await.expect("definition") {
        DtcMessage::SecurityDefinitionResponse(def) => {
            assert_eq!(def.request_id, 21);
            assert_eq!(def.symbol, "BTC-USDC");
            assert_eq!(def.currency, "USDC");
        }
        other => panic!("unexpected message: {other:?}"),
    }

    client
        .send(&DtcMessage::SymbolSearchRequest(SymbolSearchRequest {
            request_id: 22,
            search_text: "SOL".into(),
            exchange: String::new(),
        }))
        .await;
    match client.recv(Duration::from_secs(2)).await.expect("search hit") {
        DtcMessage::SecurityDefinitionResponse(def) => {
            assert_eq!(def.request_id, 22);
            assert_eq!(def.symbol, "SOL-USDC");
        }
        other => panic!("unexpected message: {other:?}"),
    }
    server.shutdown().await;
}

#[tokio::test]
async fn orders_are_rejected_and_positions_come_back_empty() {
    let (server, addr, _handle) = start_server(|_| {}).await;
    let mut client = TestClient::connect(addr).await;
    client.logon("alice", 10).await;

    client
        .send(&DtcMessage::SubmitNewSingleOrder(dtc_core::dtc::SubmitNewSingleOrder {
            symbol: "BTC-USDC".into(),
            client_order_id: "c-1".into(),
            quantity: 0.5,
            ..Default::default()
        }))
        .await;
    match client.recv(Duration::from_secs(2)).await.expect("order update") {
        DtcMessage::OrderUpdate(update) => {
            assert_eq!(update.order_status, dtc_core::dtc::OrderStatus::Rejected);
            assert_eq!(update.client_order_id, "c-1");
            assert!(!update.info_text.is_empty());
        }
        other => panic!("unexpected message: {other:?}"),
    }

    client
        .send(&DtcMessage::CurrentPositionsRequest(dtc_core::dtc::CurrentPositionsRequest {
            request_id: 31,
            trade_account: String::new(),
        }))
        .await;
    match client.recv(Duration::from_secs(2)).await.expect("positions") {
        DtcMessage::PositionUpdate(update) => {
            assert_eq!(update.request_id, 31);
            assert_eq!(update.no_positions, 1);
        }
        other => panic!("unexpected message: {other:?}"),
    }
    server.shutdown().await;
}

#[tokio::test]
async fn excess_clients_are_turned_away_with_an_alert() {
    let (server, addr, _handle) = start_server(|config| config.max_clients = 1).await;

    let mut first = TestClient::connect(addr).await;
    first.logon("alice", 10).await;

    let mut second = TestClient::connect(addr).await;
    match second.recv(Duration::from_secs(2)).await.expect("alert") {
        DtcMessage::AlertMessage(alert) => assert!(!alert.message_text.is_empty()),
        other => panic!("unexpected message: {other:?}"),
    }
    assert!(second.wait_for_eof(Duration::from_secs(2)).await);
    server.shutdown().await;
}

#[tokio::test]
async fn logoff_releases_feed_subscriptions() {
    let (server, addr, handle) = start_server(|_| {}).await;
    let mut alice = TestClient::connect(addr).await;
    alice.logon("alice", 10).await;
    alice.subscribe("BTC-USD", 0).await;
    wait_for_subscribe(&handle, "BTC-USD", 1).await;

    // A second session holds the same symbol, so the adapter subscription
    // must survive the first logoff.
    let mut bob = TestClient::connect(addr).await;
    bob.logon("bob", 10).await;
    bob.subscribe("BTC-USD", 0).await;
    bob.sync().await;

    alice
        .send(&DtcMessage::Logoff(Logoff { reason: "done".into(), do_not_reconnect: 1 }))
        .await;
    assert!(alice.wait_for_eof(Duration::from_secs(2)).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(handle.unsubscribe_calls().is_empty());

    bob.send(&DtcMessage::Logoff(Logoff::default())).await;
    assert!(bob.wait_for_eof(Duration::from_secs(2)).await);

    // Refcount hit zero: the adapter subscription is garbage-collected.
    for _ in 0..50 {
        if !handle.unsubscribe_calls().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(handle.unsubscribe_calls(), vec!["BTC-USD".to_string()]);
    server.shutdown().await;
}
