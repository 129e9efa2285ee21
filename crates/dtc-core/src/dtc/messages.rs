//! The DTC v8 message catalog.
//!
//! One struct per message type plus the [`DtcMessage`] sum type used by the
//! codec. Field order in each struct matches the wire layout; the codec
//! serializes fields in declaration order.

use super::PROTOCOL_VERSION;
use super::enums::*;

// ---------------------------------------------------------------------------
// Logon / connection
// ---------------------------------------------------------------------------

/// Type 1 — client logon.
#[derive(Debug, Clone, PartialEq)]
pub struct LogonRequest {
    pub protocol_version: u16,
    pub username: String,
    pub password: String,
    pub general_text_data: String,
    pub integer_1: String,
    pub integer_2: String,
    /// Requested keepalive cadence in seconds; 0 lets the server choose.
    pub heartbeat_interval: u8,
    pub unused_1: u8,
    pub trade_account: String,
    pub hardware_identifier: String,
    pub client_name: String,
}

impl Default for LogonRequest {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            username: String::new(),
            password: String::new(),
            general_text_data: String::new(),
            integer_1: String::new(),
            integer_2: String::new(),
            heartbeat_interval: 0,
            unused_1: 0,
            trade_account: String::new(),
            hardware_identifier: String::new(),
            client_name: String::new(),
        }
    }
}

/// Type 2 — server logon reply. `result` is 1 on success, 0 on failure.
///
/// The trailing flag bytes advertise server capabilities; the defaults
/// mirror what this bridge actually supports.
#[derive(Debug, Clone, PartialEq)]
pub struct LogonResponse {
    pub protocol_version: u16,
    pub result: u8,
    pub result_text: String,
    pub reconnect_address: String,
    pub integer_1: u16,
    pub server_name: String,
    pub market_depth_updates_best_bid_and_ask: u8,
    pub trading_is_supported: u8,
    pub order_cancel_replace_supported: u8,
    pub symbol_exchange_delimiter: String,
    pub security_definitions_supported: u8,
    pub historical_price_data_supported: u8,
    pub resubscribe_when_market_data_feed_available: u8,
    pub market_depth_is_supported: u8,
    pub one_historical_price_data_request_per_connection: u8,
    pub use_integer_price_order_messages: u8,
    pub bracket_order_supported: u8,
    pub use_lookup_table_for_order_id: u8,
}

impl Default for LogonResponse {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            result: 0,
            result_text: String::new(),
            reconnect_address: String::new(),
            integer_1: 0,
            server_name: String::new(),
            market_depth_updates_best_bid_and_ask: 1,
            trading_is_supported: 1,
            order_cancel_replace_supported: 1,
            symbol_exchange_delimiter: String::new(),
            security_definitions_supported: 1,
            historical_price_data_supported: 0,
            resubscribe_when_market_data_feed_available: 1,
            market_depth_is_supported: 1,
            one_historical_price_data_request_per_connection: 0,
            use_integer_price_order_messages: 0,
            bracket_order_supported: 0,
            use_lookup_table_for_order_id: 0,
        }
    }
}

/// Type 3 — keepalive, sent in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Heartbeat {
    pub num_drops: u32,
    pub current_date_time: u64,
}

/// Type 5 — orderly disconnect.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Logoff {
    pub reason: String,
    pub do_not_reconnect: u8,
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// Type 101 — subscribe / unsubscribe / snapshot request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MarketDataRequest {
    pub request_action: RequestAction,
    /// Client-chosen id echoed back in every update for this symbol.
    pub symbol_id: u16,
    pub symbol: String,
    pub exchange: String,
}

/// Type 103 — subscription rejected.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MarketDataReject {
    pub symbol_id: u16,
    pub reject_text: String,
}

/// Type 107 — trade tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MarketDataUpdateTrade {
    pub symbol_id: u16,
    /// 1 = at bid, 2 = at ask, 0 = unknown. Carried as `f64` for
    /// compatibility with the upstream producer of this feed.
    pub at_bid_or_ask: f64,
    pub price: f64,
    pub volume: f64,
    pub date_time: u64,
}

/// Type 108 — best bid/ask tick. Both quantities are `f32` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MarketDataUpdateBidAsk {
    pub symbol_id: u16,
    pub bid_price: f64,
    pub bid_quantity: f32,
    pub ask_price: f64,
    pub ask_quantity: f32,
    pub date_time: u64,
    pub is_bid_change: u8,
    pub is_ask_change: u8,
}

// ---------------------------------------------------------------------------
// Trading
// ---------------------------------------------------------------------------

/// Type 208 — order entry. This bridge decodes it and answers with a
/// rejecting [`OrderUpdate`]; it never routes orders upstream.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubmitNewSingleOrder {
    pub symbol: String,
    pub exchange: String,
    pub trade_account: String,
    pub client_order_id: String,
    pub order_type: OrderType,
    pub buy_sell: BuySell,
    pub price1: f64,
    /// Second price for stop-limit orders.
    pub price2: f64,
    pub quantity: f64,
    pub time_in_force: TimeInForce,
    pub good_till_date_time: u64,
    pub is_automated_order: u8,
    pub is_parent_order: u8,
    pub free_form_text: String,
}

/// Type 210 — order state report.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OrderUpdate {
    pub request_id: u32,
    pub total_num_messages: i32,
    pub message_number: i32,
    pub symbol: String,
    pub exchange: String,
    pub previous_server_order_id: String,
    pub server_order_id: String,
    pub client_order_id: String,
    pub exchange_order_id: String,
    pub order_status: OrderStatus,
    pub order_type: OrderType,
    pub buy_sell: BuySell,
    pub price1: f64,
    pub price2: f64,
    pub order_quantity: f64,
    pub filled_quantity: f64,
    pub remaining_quantity: f64,
    pub average_fill_price: f64,
    pub last_fill_price: f64,
    pub last_fill_quantity: f64,
    pub last_fill_date_time: u64,
    pub order_received_date_time: u64,
    pub time_in_force: TimeInForce,
    pub good_till_date_time: u64,
    pub order_update_sequence_number: u32,
    pub free_form_text: String,
    pub order_id: String,
    pub trade_account: String,
    pub info_text: String,
    pub no_orders: u8,
    pub parent_server_order_id: String,
    pub oco_linked_order_server_order_id: String,
}

// ---------------------------------------------------------------------------
// Account / positions
// ---------------------------------------------------------------------------

/// Type 400 — position snapshot request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CurrentPositionsRequest {
    pub request_id: u32,
    pub trade_account: String,
}

/// Type 401 — one position (or `no_positions = 1` for an empty book).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PositionUpdate {
    pub request_id: u32,
    pub total_number_messages: i32,
    pub message_number: i32,
    pub symbol: String,
    pub exchange: String,
    pub quantity: f64,
    pub average_price: f64,
    pub position_identifier: String,
    pub trade_account: String,
    pub no_positions: u8,
    pub unsolicited: u8,
}

/// Type 402 — position request rejected.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CurrentPositionsReject {
    pub request_id: u32,
    pub reject_text: String,
}

// ---------------------------------------------------------------------------
// Symbol / security definitions
// ---------------------------------------------------------------------------

/// Type 501 — security definition request for one symbol.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SecurityDefinitionForSymbolRequest {
    pub request_id: u32,
    pub symbol: String,
    pub exchange: String,
}

/// Type 502 — security definition reply. Also used to answer symbol
/// searches, one frame per match.
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityDefinitionResponse {
    pub request_id: u32,
    pub symbol: String,
    pub exchange: String,
    /// 0 = unknown, 1 = future, 2 = stock, 3 = forex, 4 = index, 5 = option.
    pub security_type: u8,
    pub description: String,
    pub min_price_increment: f32,
    pub price_display_format: u8,
    pub currency_value_per_increment: f32,
    pub has_market_depth_data: u8,
    pub display_price_multiplier: f32,
    pub exchange_symbol: String,
    pub initial_margin_requirement: f32,
    pub maintenance_margin_requirement: f32,
    pub currency: String,
    pub contract_size: f32,
    pub open_interest: u32,
    pub roll_over_date: u64,
    pub is_delayed: u8,
}

impl Default for SecurityDefinitionResponse {
    fn default() -> Self {
        Self {
            request_id: 0,
            symbol: String::new(),
            exchange: String::new(),
            security_type: 0,
            description: String::new(),
            min_price_increment: 0.0,
            price_display_format: 0,
            currency_value_per_increment: 0.0,
            has_market_depth_data: 1,
            display_price_multiplier: 1.0,
            exchange_symbol: String::new(),
            initial_margin_requirement: 0.0,
            maintenance_margin_requirement: 0.0,
            currency: String::new(),
            contract_size: 1.0,
            open_interest: 0,
            roll_over_date: 0,
            is_delayed: 0,
        }
    }
}

/// Type 503 — free-text symbol search. Matches come back as type 502
/// frames sharing the request id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SymbolSearchRequest {
    pub request_id: u32,
    pub search_text: String,
    pub exchange: String,
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

/// Type 700 — textual log line pushed to the client.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeneralLogMessage {
    pub message_text: String,
}

/// Type 701 — textual alert pushed to the client.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AlertMessage {
    pub message_text: String,
}

// ---------------------------------------------------------------------------
// Sum type
// ---------------------------------------------------------------------------

/// All DTC messages this bridge speaks, plus a passthrough for codes
/// outside the catalog.
#[derive(Debug, Clone, PartialEq)]
pub enum DtcMessage {
    LogonRequest(LogonRequest),
    LogonResponse(LogonResponse),
    Heartbeat(Heartbeat),
    Logoff(Logoff),
    MarketDataRequest(MarketDataRequest),
    MarketDataReject(MarketDataReject),
    MarketDataUpdateTrade(MarketDataUpdateTrade),
    MarketDataUpdateBidAsk(MarketDataUpdateBidAsk),
    SubmitNewSingleOrder(SubmitNewSingleOrder),
    OrderUpdate(Box<OrderUpdate>),
    CurrentPositionsRequest(CurrentPositionsRequest),
    PositionUpdate(PositionUpdate),
    CurrentPositionsReject(CurrentPositionsReject),
    SecurityDefinitionForSymbolRequest(SecurityDefinitionForSymbolRequest),
    SecurityDefinitionResponse(Box<SecurityDefinitionResponse>),
    SymbolSearchRequest(SymbolSearchRequest),
    GeneralLogMessage(GeneralLogMessage),
    AlertMessage(AlertMessage),
    /// Recognized framing, unknown or unhandled type code. The body is
    /// dropped; the raw code is kept for the reject path.
    Unknown { msg_type: u16 },
}

impl DtcMessage {
    /// The wire type code for this message.
    pub fn type_code(&self) -> u16 {
        match self {
            Self::LogonRequest(_) => MessageType::LogonRequest as u16,
            Self::LogonResponse(_) => MessageType::LogonResponse as u16,
            Self::Heartbeat(_) => MessageType::Heartbeat as u16,
            Self::Logoff(_) => MessageType::Logoff as u16,
            Self::MarketDataRequest(_) => MessageType::MarketDataRequest as u16,
            Self::MarketDataReject(_) => MessageType::MarketDataReject as u16,
            Self::MarketDataUpdateTrade(_) => MessageType::MarketDataUpdateTrade as u16,
            Self::MarketDataUpdateBidAsk(_) => MessageType::MarketDataUpdateBidAsk as u16,
            Self::SubmitNewSingleOrder(_) => MessageType::SubmitNewSingleOrder as u16,
            Self::OrderUpdate(_) => MessageType::OrderUpdate as u16,
            Self::CurrentPositionsRequest(_) => MessageType::CurrentPositionsRequest as u16,
            Self::PositionUpdate(_) => MessageType::PositionUpdate as u16,
            Self::CurrentPositionsReject(_) => MessageType::CurrentPositionsReject as u16,
            Self::SecurityDefinitionForSymbolRequest(_) => {
                MessageType::SecurityDefinitionForSymbolRequest as u16
            }
            Self::SecurityDefinitionResponse(_) => MessageType::SecurityDefinitionResponse as u16,
            Self::SymbolSearchRequest(_) => MessageType::SymbolSearchRequest as u16,
            Self::GeneralLogMessage(_) => MessageType::GeneralLogMessage as u16,
            Self::AlertMessage(_) => MessageType::AlertMessage as u16,
            Self::Unknown { msg_type } => *msg_type,
        }
    }
}
