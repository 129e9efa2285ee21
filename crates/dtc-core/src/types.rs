//! Normalized market-data events — the types flowing from the exchange
//! adapters through the aggregator to the server fan-out.
//!
//! # Symbol conventions
//!
//! Two symbol forms exist in the system:
//!
//! - **canonical** — `BASE-QUOTE` uppercase (e.g. `BTC-USD`); the form used
//!   on the DTC wire and in the symbol registry.
//! - **normalized** — `BASE/QUOTE` (e.g. `BTC/USD`); the exchange-agnostic
//!   form used internally by feed adapters.
//!
//! # Timestamp convention
//!
//! All event timestamps are in **nanoseconds since Unix epoch** and are
//! passed through to DTC `date_time` fields unchanged.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Trade side
// ---------------------------------------------------------------------------

/// Aggressor side of a trade, as reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    #[default]
    Unknown,
    Buy,
    Sell,
}

impl TradeSide {
    /// DTC `at_bid_or_ask` encoding: 1 = at bid (seller aggressor),
    /// 2 = at ask (buyer aggressor), 0 = unknown.
    pub fn at_bid_or_ask(self) -> f64 {
        match self {
            Self::Unknown => 0.0,
            Self::Buy => 2.0,
            Self::Sell => 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Normalized events
// ---------------------------------------------------------------------------

/// A single trade execution, normalized across exchanges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTrade {
    /// Normalized symbol (`BASE/QUOTE`).
    pub symbol: String,
    /// Originating exchange name (e.g. `"coinbase"`).
    pub exchange: String,
    /// Exchange event time, nanoseconds since Unix epoch.
    pub timestamp_ns: u64,
    pub price: f64,
    pub size: f64,
    pub side: TradeSide,
}

/// Best bid / best offer update, normalized across exchanges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedQuote {
    /// Normalized symbol (`BASE/QUOTE`).
    pub symbol: String,
    /// Originating exchange name.
    pub exchange: String,
    /// Exchange event time, nanoseconds since Unix epoch.
    pub timestamp_ns: u64,
    pub bid_price: f64,
    pub bid_size: f64,
    pub ask_price: f64,
    pub ask_size: f64,
}

/// A tagged union of feed events delivered from the aggregator to the server.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Trade(NormalizedTrade),
    Quote(NormalizedQuote),
    /// Feed connection state changed.
    Connection { exchange: String, connected: bool },
    /// A feed-level error (including `FeedDown` after reconnect exhaustion).
    Error { exchange: String, message: String },
}

// ---------------------------------------------------------------------------
// Symbol form conversions
// ---------------------------------------------------------------------------

/// Convert a normalized symbol to canonical form: `BTC/USD` → `BTC-USD`.
#[inline]
pub fn canonical_symbol(normalized: &str) -> String {
    normalized.replace('/', "-").to_ascii_uppercase()
}

/// Convert a canonical symbol to normalized form: `BTC-USD` → `BTC/USD`.
#[inline]
pub fn normalized_symbol(canonical: &str) -> String {
    canonical.replace('-', "/").to_ascii_uppercase()
}

/// Split a canonical symbol into `(base, quote)`. Returns `None` when the
/// symbol does not contain exactly one separator.
pub fn split_canonical(canonical: &str) -> Option<(&str, &str)> {
    let mut parts = canonical.split('-');
    let base = parts.next()?;
    let quote = parts.next()?;
    if base.is_empty() || quote.is_empty() || parts.next().is_some() {
        return None;
    }
    Some((base, quote))
}
