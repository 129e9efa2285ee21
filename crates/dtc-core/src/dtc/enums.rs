//! Enumerations of the DTC v8 wire protocol.
//!
//! The discriminant values are fixed by the protocol and must not change.
//! Field-level enums decode leniently: a value outside the declared domain
//! maps to the `Unspecified`/`Unset` variant instead of failing the frame,
//! because the surrounding message is still useful.

// ---------------------------------------------------------------------------
// Message types
// ---------------------------------------------------------------------------

/// DTC message type codes carried in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageType {
    // Logon / connection
    LogonRequest = 1,
    LogonResponse = 2,
    Heartbeat = 3,
    Logoff = 5,

    // Market data
    MarketDataRequest = 101,
    MarketDataReject = 103,
    MarketDataUpdateTrade = 107,
    MarketDataUpdateBidAsk = 108,

    // Trading
    SubmitNewSingleOrder = 208,
    OrderUpdate = 210,

    // Account / positions
    CurrentPositionsRequest = 400,
    PositionUpdate = 401,
    CurrentPositionsReject = 402,

    // Symbol / security
    SecurityDefinitionForSymbolRequest = 501,
    SecurityDefinitionResponse = 502,
    SymbolSearchRequest = 503,
    SymbolSearchResponse = 504,

    // System
    GeneralLogMessage = 700,
    AlertMessage = 701,
}

impl MessageType {
    /// Look up a wire code. Returns `None` for codes outside the catalog;
    /// callers route those to the default reject path.
    pub fn from_u16(code: u16) -> Option<Self> {
        Some(match code {
            1 => Self::LogonRequest,
            2 => Self::LogonResponse,
            3 => Self::Heartbeat,
            5 => Self::Logoff,
            101 => Self::MarketDataRequest,
            103 => Self::MarketDataReject,
            107 => Self::MarketDataUpdateTrade,
            108 => Self::MarketDataUpdateBidAsk,
            208 => Self::SubmitNewSingleOrder,
            210 => Self::OrderUpdate,
            400 => Self::CurrentPositionsRequest,
            401 => Self::PositionUpdate,
            402 => Self::CurrentPositionsReject,
            501 => Self::SecurityDefinitionForSymbolRequest,
            502 => Self::SecurityDefinitionResponse,
            503 => Self::SymbolSearchRequest,
            504 => Self::SymbolSearchResponse,
            700 => Self::GeneralLogMessage,
            701 => Self::AlertMessage,
            _ => return None,
        })
    }
}

// ---------------------------------------------------------------------------
// Field-level enums (lenient decode)
// ---------------------------------------------------------------------------

/// Action of a `MarketDataRequest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum RequestAction {
    #[default]
    Unspecified = 0,
    Subscribe = 1,
    Unsubscribe = 2,
    Snapshot = 3,
}

impl RequestAction {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Subscribe,
            2 => Self::Unsubscribe,
            3 => Self::Snapshot,
            _ => Self::Unspecified,
        }
    }
}

/// Order lifecycle state reported in `OrderUpdate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum OrderStatus {
    #[default]
    Unspecified = 0,
    OrderSent = 1,
    PendingOpen = 2,
    PendingChild = 3,
    Open = 4,
    Filled = 5,
    Canceled = 6,
    Rejected = 7,
    PartiallyFilled = 8,
}

impl OrderStatus {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::OrderSent,
            2 => Self::PendingOpen,
            3 => Self::PendingChild,
            4 => Self::Open,
            5 => Self::Filled,
            6 => Self::Canceled,
            7 => Self::Rejected,
            8 => Self::PartiallyFilled,
            _ => Self::Unspecified,
        }
    }
}

/// Order type of `SubmitNewSingleOrder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum OrderType {
    #[default]
    Unset = 0,
    Market = 1,
    Limit = 2,
    Stop = 3,
    StopLimit = 4,
    MarketIfTouched = 5,
}

impl OrderType {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Market,
            2 => Self::Limit,
            3 => Self::Stop,
            4 => Self::StopLimit,
            5 => Self::MarketIfTouched,
            _ => Self::Unset,
        }
    }
}

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum BuySell {
    #[default]
    Unset = 0,
    Buy = 1,
    Sell = 2,
}

impl BuySell {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Buy,
            2 => Self::Sell,
            _ => Self::Unset,
        }
    }
}

/// Time-in-force of `SubmitNewSingleOrder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum TimeInForce {
    #[default]
    Unset = 0,
    Day = 1,
    GoodTillCanceled = 2,
    GoodTillDateTime = 3,
    ImmediateOrCancel = 4,
    FillOrKill = 5,
    GoodTillCrossing = 6,
}

impl TimeInForce {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Day,
            2 => Self::GoodTillCanceled,
            3 => Self::GoodTillDateTime,
            4 => Self::ImmediateOrCancel,
            5 => Self::FillOrKill,
            6 => Self::GoodTillCrossing,
            _ => Self::Unset,
        }
    }
}
