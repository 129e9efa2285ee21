//! Coinbase WebSocket JSON message parser.
//!
//! Parses feed messages into [`CoinbaseEvent`] variants, routed by the
//! top-level `type` field:
//!
//! - `match` / `last_match` → trade print
//! - `ticker` → best bid/offer
//! - `snapshot` / `l2update` → level2 book data
//! - `heartbeat`, `subscriptions` → liveness / acks
//! - `error` → upstream protocol error
//!
//! Prices and sizes arrive as decimal strings and are parsed to `f64`.

use dtc_core::{TradeSide, time_util};
use serde_json::Value;

/// One decoded feed message, still in exchange symbol format.
#[derive(Debug, Clone, PartialEq)]
pub enum CoinbaseEvent {
    Trade {
        product_id: String,
        price: f64,
        size: f64,
        side: TradeSide,
        timestamp_ns: u64,
    },
    Ticker {
        product_id: String,
        bid_price: f64,
        bid_size: f64,
        ask_price: f64,
        ask_size: f64,
        timestamp_ns: u64,
    },
    /// Full book snapshot; only the top level is surfaced.
    Snapshot {
        product_id: String,
        bid_price: f64,
        bid_size: f64,
        ask_price: f64,
        ask_size: f64,
    },
    /// Incremental book changes.
    L2Update {
        product_id: String,
        timestamp_ns: u64,
        changes: Vec<L2Change>,
    },
    Heartbeat {
        product_id: String,
    },
    /// Subscription acknowledgement.
    Subscriptions,
    Error {
        message: String,
    },
}

/// One side/price/size change from an `l2update`.
#[derive(Debug, Clone, PartialEq)]
pub struct L2Change {
    pub is_bid: bool,
    pub price: f64,
    pub size: f64,
}

/// Parse one feed message. Returns `None` for non-JSON payloads and
/// messages of no interest.
pub fn parse_message(text: &str) -> Option<CoinbaseEvent> {
    let v: Value = serde_json::from_str(text).ok()?;
    let msg_type = v.get("type")?.as_str()?;

    match msg_type {
        "match" | "last_match" => parse_match(&v),
        "ticker" => parse_ticker(&v),
        "snapshot" => parse_snapshot(&v),
        "l2update" => parse_l2update(&v),
        "heartbeat" => Some(CoinbaseEvent::Heartbeat {
            product_id: v.get("product_id")?.as_str()?.to_string(),
        }),
        "subscriptions" => Some(CoinbaseEvent::Subscriptions),
        "error" => Some(CoinbaseEvent::Error {
            message: v
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown feed error")
                .to_string(),
        }),
        _ => None,
    }
}

/// Build a `subscribe` request for one channel.
pub fn build_subscribe(channel: &str, product_ids: &[String]) -> String {
    serde_json::json!({
        "type": "subscribe",
        "channels": [{ "name": channel, "product_ids": product_ids }]
    })
    .to_string()
}

/// Build an `unsubscribe` request for one channel.
pub fn build_unsubscribe(channel: &str, product_ids: &[String]) -> String {
    serde_json::json!({
        "type": "unsubscribe",
        "channels": [{ "name": channel, "product_ids": product_ids }]
    })
    .to_string()
}

// ---------------------------------------------------------------------------
// Individual parsers
// ---------------------------------------------------------------------------

fn parse_match(v: &Value) -> Option<CoinbaseEvent> {
    Some(CoinbaseEvent::Trade {
        product_id: v.get("product_id")?.as_str()?.to_string(),
        price: parse_str_f64(v.get("price"))?,
        size: parse_str_f64(v.get("size"))?,
        side: match v.get("side").and_then(Value::as_str) {
            Some("buy") => TradeSide::Buy,
            Some("sell") => TradeSide::Sell,
            _ => TradeSide::Unknown,
        },
        timestamp_ns: parse_time_ns(v.get("time")),
    })
}

fn parse_ticker(v: &Value) -> Option<CoinbaseEvent> {
    Some(CoinbaseEvent::Ticker {
        product_id: v.get("product_id")?.as_str()?.to_string(),
        bid_price: parse_str_f64(v.get("best_bid"))?,
        bid_size: parse_str_f64(v.get("best_bid_size")).unwrap_or(0.0),
        ask_price: parse_str_f64(v.get("best_ask"))?,
        ask_size: parse_str_f64(v.get("best_ask_size")).unwrap_or(0.0),
        timestamp_ns: parse_time_ns(v.get("time")),
    })
}

fn parse_snapshot(v: &Value) -> Option<CoinbaseEvent> {
    let product_id = v.get("product_id")?.as_str()?.to_string();
    let bid0 = v.get("bids").and_then(Value::as_array).and_then(|b| b.first());
    let ask0 = v.get("asks").and_then(Value::as_array).and_then(|a| a.first());

    let (bid_price, bid_size) = parse_level(bid0).unwrap_or((0.0, 0.0));
    let (ask_price, ask_size) = parse_level(ask0).unwrap_or((0.0, 0.0));

    Some(CoinbaseEvent::Snapshot { product_id, bid_price, bid_size, ask_price, ask_size })
}

fn parse_l2update(v: &Value) -> Option<CoinbaseEvent> {
    let product_id = v.get("product_id")?.as_str()?.to_string();
    let timestamp_ns = parse_time_ns(v.get("time"));

    let changes = v
        .get("changes")?
        .as_array()?
        .iter()
        .filter_map(|change| {
            let change = change.as_array()?;
            Some(L2Change {
                is_bid: change.first()?.as_str()? == "buy",
                price: parse_str_f64(change.get(1))?,
                size: parse_str_f64(change.get(2))?,
            })
        })
        .collect();

    Some(CoinbaseEvent::L2Update { product_id, timestamp_ns, changes })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a `["price", "size", ...]` book level.
fn parse_level(level: Option<&Value>) -> Option<(f64, f64)> {
    let level = level?.as_array()?;
    Some((parse_str_f64(level.first())?, parse_str_f64(level.get(1))?))
}

/// Parse a JSON decimal-string (or number) field into `f64`.
fn parse_str_f64(v: Option<&Value>) -> Option<f64> {
    let v = v?;
    if let Some(s) = v.as_str() {
        return s.parse().ok();
    }
    v.as_f64()
}

/// Parse an RFC 3339 timestamp into nanoseconds since epoch; falls back to
/// the local clock when the field is absent or unparsable.
fn parse_time_ns(v: Option<&Value>) -> u64 {
    v.and_then(Value::as_str)
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .and_then(|dt| dt.timestamp_nanos_opt())
        .map(|ns| ns as u64)
        .unwrap_or_else(time_util::now_ns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_match_message() {
        let json = r#"{
            "type": "match", "trade_id": 12345, "side": "sell",
            "size": "0.01", "price": "50000.0", "product_id": "BTC-USD",
            "sequence": 10, "time": "2024-01-01T12:00:00.000000Z"
        }"#;
        match parse_message(json).unwrap() {
            CoinbaseEvent::Trade { product_id, price, size, side, timestamp_ns } => {
                assert_eq!(product_id, "BTC-USD");
                assert_eq!(price, 50_000.0);
                assert_eq!(size, 0.01);
                assert_eq!(side, TradeSide::Sell);
                assert_eq!(timestamp_ns, 1_704_110_400_000_000_000);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn parse_ticker_message() {
        let json = r#"{
            "type": "ticker", "product_id": "ETH-USD",
            "best_bid": "2999.5", "best_bid_size": "3.2",
            "best_ask": "3000.1", "best_ask_size": "1.1",
            "time": "2024-01-01T12:00:00Z"
        }"#;
        match parse_message(json).unwrap() {
            CoinbaseEvent::Ticker { product_id, bid_price, ask_price, ask_size, .. } => {
                assert_eq!(product_id, "ETH-USD");
                assert_eq!(bid_price, 2_999.5);
                assert_eq!(ask_price, 3_000.1);
                assert_eq!(ask_size, 1.1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn parse_snapshot_top_level() {
        let json = r#"{
            "type": "snapshot", "product_id": "BTC-USD",
            "bids": [["49999.0", "1.5"], ["49998.0", "2.0"]],
            "asks": [["50001.0", "0.7"]]
        }"#;
        match parse_message(json).unwrap() {
            CoinbaseEvent::Snapshot { bid_price, bid_size, ask_price, ask_size, .. } => {
                assert_eq!((bid_price, bid_size), (49_999.0, 1.5));
                assert_eq!((ask_price, ask_size), (50_001.0, 0.7));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn parse_l2update_changes() {
        let json = r#"{
            "type": "l2update", "product_id": "BTC-USD",
            "time": "2024-01-01T12:00:00Z",
            "changes": [["buy", "49999.0", "0"], ["sell", "50001.0", "0.9"]]
        }"#;
        match parse_message(json).unwrap() {
            CoinbaseEvent::L2Update { changes, .. } => {
                assert_eq!(changes.len(), 2);
                assert!(changes[0].is_bid);
                assert_eq!(changes[0].size, 0.0);
                assert!(!changes[1].is_bid);
                assert_eq!(changes[1].price, 50_001.0);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn acks_and_heartbeats_are_recognized() {
        assert_eq!(
            parse_message(r#"{"type":"subscriptions","channels":[]}"#),
            Some(CoinbaseEvent::Subscriptions)
        );
        assert_eq!(
            parse_message(r#"{"type":"heartbeat","product_id":"BTC-USD","sequence":1}"#),
            Some(CoinbaseEvent::Heartbeat { product_id: "BTC-USD".into() })
        );
    }

    #[test]
    fn errors_and_junk() {
        match parse_message(r#"{"type":"error","message":"Failed to subscribe"}"#).unwrap() {
            CoinbaseEvent::Error { message } => assert_eq!(message, "Failed to subscribe"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(parse_message("not json"), None);
        assert_eq!(parse_message(r#"{"type":"status"}"#), None);
    }

    #[test]
    fn subscribe_message_shape() {
        let msg = build_subscribe("matches", &["BTC-USD".to_string(), "ETH-USD".to_string()]);
        let v: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(v["type"], "subscribe");
        assert_eq!(v["channels"][0]["name"], "matches");
        assert_eq!(v["channels"][0]["product_ids"][1], "ETH-USD");

        let msg = build_unsubscribe("level2", &["BTC-USD".to_string()]);
        let v: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(v["type"], "unsubscribe");
    }
}
