//! Per-client session state.
//!
//! A [`Session`] owns everything the server knows about one connected DTC
//! client: the state machine, the serialized send path, heartbeat
//! bookkeeping, the session-local symbol table, and the set of subscribed
//! canonical symbols. The receive path runs in the server's per-session
//! task and feeds inbound bytes through [`drain_frames`].

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use ahash::AHashSet;
use dtc_core::dtc::{self, DecodeError, DtcMessage, HEADER_LEN};
use dtc_core::error::BridgeError;
use dtc_core::time_util;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;

use crate::symbol_table::SymbolTable;

/// Client session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Socket accepted, no logon yet.
    Connected,
    /// Logon received, being validated.
    Authenticating,
    Authenticated,
    /// Authenticated with at least one market-data subscription.
    Subscribed,
    /// Close requested; pending frames flush, then the socket drops.
    Disconnecting,
    Disconnected,
}

impl SessionState {
    /// States in which market-data requests are accepted.
    pub fn is_authenticated(self) -> bool {
        matches!(self, Self::Authenticated | Self::Subscribed)
    }
}

/// Server-side state for one DTC client.
pub struct Session<W> {
    /// Monotonically increasing client id.
    pub id: u64,
    writer: tokio::sync::Mutex<W>,
    state: Mutex<SessionState>,
    username: Mutex<String>,
    pub connect_time_ms: u64,
    last_heartbeat_ms: AtomicU64,
    last_server_heartbeat_ms: AtomicU64,
    /// Negotiated at logon; 0 until then.
    heartbeat_interval_s: AtomicU64,
    symbols: Mutex<SymbolTable>,
    subscriptions: Mutex<AHashSet<String>>,
    malformed_streak: AtomicU32,
    close_notify: Notify,
}

impl<W: AsyncWrite + Unpin + Send> Session<W> {
    pub fn new(id: u64, writer: W) -> Self {
        let now = time_util::now_ms();
        Self {
            id,
            writer: tokio::sync::Mutex::new(writer),
            state: Mutex::new(SessionState::Connected),
            username: Mutex::new(String::new()),
            connect_time_ms: now,
            last_heartbeat_ms: AtomicU64::new(now),
            last_server_heartbeat_ms: AtomicU64::new(now),
            heartbeat_interval_s: AtomicU64::new(0),
            symbols: Mutex::new(SymbolTable::new()),
            subscriptions: Mutex::new(AHashSet::new()),
            malformed_streak: AtomicU32::new(0),
            close_notify: Notify::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Send path
    // -----------------------------------------------------------------------

    /// Encode and write one frame. The writer mutex serializes all senders;
    /// it is held only across this single write.
    pub async fn send(&self, msg: &DtcMessage) -> std::io::Result<()> {
        let bytes = dtc::encode(msg);
        let mut writer = self.writer.lock().await;
        writer.write_all(&bytes).await?;
        writer.flush().await
    }

    /// Half-close the socket so the peer sees EOF and the reader unblocks.
    pub async fn shutdown_writer(&self) {
        let _ = self.writer.lock().await.shutdown().await;
    }

    // -----------------------------------------------------------------------
    // State machine
    // -----------------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        *self.state.lock().expect("state lock poisoned")
    }

    pub fn set_state(&self, state: SessionState) {
        *self.state.lock().expect("state lock poisoned") = state;
    }

    pub fn username(&self) -> String {
        self.username.lock().expect("username lock poisoned").clone()
    }

    pub fn set_username(&self, username: &str) {
        *self.username.lock().expect("username lock poisoned") = username.to_string();
    }

    /// Wake anything blocked on this session (the reader task).
    pub fn notify_close(&self) {
        self.close_notify.notify_waiters();
    }

    pub async fn closed(&self) {
        self.close_notify.notified().await;
    }

    // -----------------------------------------------------------------------
    // Heartbeat bookkeeping
    // -----------------------------------------------------------------------

    /// Record inbound activity. Called for every frame, not only heartbeats.
    pub fn touch(&self) {
        self.last_heartbeat_ms.store(time_util::now_ms(), Ordering::SeqCst);
    }

    pub fn set_heartbeat_interval(&self, seconds: u64) {
        self.heartbeat_interval_s.store(seconds, Ordering::SeqCst);
        self.last_server_heartbeat_ms.store(time_util::now_ms(), Ordering::SeqCst);
    }

    pub fn heartbeat_interval(&self) -> u64 {
        self.heartbeat_interval_s.load(Ordering::SeqCst)
    }

    /// True once the client has been silent for 2× the negotiated interval.
    pub fn is_heartbeat_expired(&self, now_ms: u64) -> bool {
        let interval = self.heartbeat_interval();
        if interval == 0 {
            return false;
        }
        now_ms.saturating_sub(self.last_heartbeat_ms.load(Ordering::SeqCst)) > 2 * interval * 1_000
    }

    /// True when the server owes the client a heartbeat; marks it sent.
    pub fn take_heartbeat_due(&self, now_ms: u64) -> bool {
        let interval = self.heartbeat_interval();
        if interval == 0 || !self.state().is_authenticated() {
            return false;
        }
        let last = self.last_server_heartbeat_ms.load(Ordering::SeqCst);
        if now_ms.saturating_sub(last) >= interval * 1_000 {
            self.last_server_heartbeat_ms.store(now_ms, Ordering::SeqCst);
            return true;
        }
        false
    }

    // -----------------------------------------------------------------------
    // Symbols & subscriptions
    // -----------------------------------------------------------------------

    /// Session-local id for a canonical symbol, allocating on first use.
    pub fn allocate_symbol(&self, canonical: &str) -> Result<u16, BridgeError> {
        self.symbols.lock().expect("symbols lock poisoned").allocate(canonical)
    }

    pub fn symbol_id(&self, canonical: &str) -> Option<u16> {
        self.symbols.lock().expect("symbols lock poisoned").id_for(canonical)
    }

    pub fn add_subscription(&self, canonical: &str) -> bool {
        self.subscriptions
            .lock()
            .expect("subscriptions lock poisoned")
            .insert(canonical.to_string())
    }

    pub fn remove_subscription(&self, canonical: &str) -> bool {
        self.subscriptions.lock().expect("subscriptions lock poisoned").remove(canonical)
    }

    pub fn is_subscribed(&self, canonical: &str) -> bool {
        self.subscriptions.lock().expect("subscriptions lock poisoned").contains(canonical)
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().expect("subscriptions lock poisoned").iter().cloned().collect()
    }

    // -----------------------------------------------------------------------
    // Malformed-frame accounting
    // -----------------------------------------------------------------------

    /// Count one malformed frame; returns the current streak.
    pub fn record_malformed(&self) -> u32 {
        self.malformed_streak.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn reset_malformed(&self) {
        self.malformed_streak.store(0, Ordering::SeqCst);
    }
}

/// Frames a session closes after this many malformed frames in a row.
pub const MALFORMED_FRAME_LIMIT: u32 = 3;

/// Drain every complete frame from the reassembly buffer.
///
/// Incomplete trailing bytes stay buffered for the next read. On a
/// malformed frame the remaining buffer contents are dropped (the stream
/// position is unreliable past bad framing) and the error is returned
/// alongside the frames decoded before it.
pub fn drain_frames(buf: &mut Vec<u8>) -> (Vec<DtcMessage>, Option<DecodeError>) {
    let mut frames = Vec::new();
    loop {
        let Some(size) = dtc::frame_size(buf) else {
            return (frames, None);
        };
        if (size as usize) < HEADER_LEN {
            buf.clear();
            return (frames, Some(DecodeError::MalformedHeader { size }));
        }
        if buf.len() < size as usize {
            // Partial frame; wait for more bytes.
            return (frames, None);
        }
        match dtc::decode(&buf[..size as usize]) {
            Ok((msg, consumed)) => {
                buf.drain(..consumed);
                frames.push(msg);
            }
            Err(e) => {
                buf.clear();
                return (frames, Some(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtc_core::dtc::{Heartbeat, Logoff, MarketDataRequest, RequestAction, encode};

    fn heartbeat_frame() -> Vec<u8> {
        encode(&DtcMessage::Heartbeat(Heartbeat { num_drops: 0, current_date_time: 7 }))
    }

    #[test]
    fn drain_handles_split_delivery() {
        let first = heartbeat_frame();
        let second = encode(&DtcMessage::Logoff(Logoff { reason: "bye".into(), do_not_reconnect: 1 }));

        // One-and-a-half messages arrive in a single read.
        let mut buf = first.clone();
        buf.extend_from_slice(&second[..second.len() / 2]);

        let (frames, error) = drain_frames(&mut buf);
        assert!(error.is_none());
        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], DtcMessage::Heartbeat(_)));
        assert_eq!(buf.len(), second.len() / 2);

        // The rest completes the second frame; nothing lost or duplicated.
        buf.extend_from_slice(&second[second.len() / 2..]);
        let (frames, error) = drain_frames(&mut buf);
        assert!(error.is_none());
        assert_eq!(frames.len(), 1);
        assert!(matches!(&frames[0], DtcMessage::Logoff(l) if l.reason == "bye"));
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_decodes_back_to_back_frames() {
        let mut buf = heartbeat_frame();
        buf.extend_from_slice(&heartbeat_frame());
        buf.extend_from_slice(&encode(&DtcMessage::MarketDataRequest(MarketDataRequest {
            request_action: RequestAction::Subscribe,
            symbol_id: 0,
            symbol: "BTC-USD".into(),
            exchange: String::new(),
        })));

        let (frames, error) = drain_frames(&mut buf);
        assert!(error.is_none());
        assert_eq!(frames.len(), 3);
        assert!(buf.is_empty());
    }

    #[test]
    fn malformed_header_drops_the_buffer() {
        let mut buf = vec![2u8, 0, 3, 0, 0xFF]; // size=2 < header length
        let (frames, error) = drain_frames(&mut buf);
        assert!(frames.is_empty());
        assert!(matches!(error, Some(DecodeError::MalformedHeader { size: 2 })));
        assert!(buf.is_empty());
    }

    #[test]
    fn good_frames_before_a_bad_one_survive() {
        let mut buf = heartbeat_frame();
        buf.extend_from_slice(&[3u8, 0, 3, 0]); // malformed follower
        let (frames, error) = drain_frames(&mut buf);
        assert_eq!(frames.len(), 1);
        assert!(error.is_some());
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn send_writes_one_frame_and_touch_updates_liveness() {
        let (client, server) = tokio::io::duplex(1024);
        let session = Session::new(1, server);
        session
            .send(&DtcMessage::Heartbeat(Heartbeat { num_drops: 0, current_date_time: 1 }))
            .await
            .unwrap();

        let mut read_buf = vec![0u8; 64];
        use tokio::io::AsyncReadExt;
        let mut client = client;
        let n = client.read(&mut read_buf).await.unwrap();
        let (msg, consumed) = dtc::decode(&read_buf[..n]).unwrap();
        assert_eq!(consumed, n);
        assert!(matches!(msg, DtcMessage::Heartbeat(_)));

        session.set_heartbeat_interval(1);
        assert!(!session.is_heartbeat_expired(time_util::now_ms()));
        assert!(session.is_heartbeat_expired(time_util::now_ms() + 2_500));
    }

    #[test]
    fn state_machine_and_accounting() {
        let session = Session::new(9, tokio::io::sink());
        assert_eq!(session.state(), SessionState::Connected);
        assert!(!session.state().is_authenticated());

        session.set_state(SessionState::Authenticated);
        assert!(session.state().is_authenticated());

        assert_eq!(session.allocate_symbol("BTC-USD").unwrap(), 1);
        assert_eq!(session.allocate_symbol("BTC-USD").unwrap(), 1);
        assert!(session.add_subscription("BTC-USD"));
        assert!(session.is_subscribed("BTC-USD"));
        assert!(session.remove_subscription("BTC-USD"));
        // The id survives unsubscribe.
        assert_eq!(session.symbol_id("BTC-USD"), Some(1));

        assert_eq!(session.record_malformed(), 1);
        assert_eq!(session.record_malformed(), 2);
        session.reset_malformed();
        assert_eq!(session.record_malformed(), 1);
    }
}
