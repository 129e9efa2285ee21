//! Binary encoder/decoder for DTC v8 frames.
//!
//! Framing is stream-oriented: [`decode`] consumes exactly the advertised
//! frame size and reports it back, so a reassembly buffer can drain complete
//! frames and keep the residue. All numeric fields are little-endian and
//! packed without padding; strings are NUL-terminated UTF-8.

use thiserror::Error;

use super::enums::*;
use super::messages::*;

/// Frame header length: `u16` size + `u16` type.
pub const HEADER_LEN: usize = 4;

/// Frame decode failures.
///
/// `ShortFrame` at the buffer boundary means "wait for more bytes"; every
/// other variant means the peer sent garbage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Advertised size below the 4-byte minimum.
    #[error("malformed header: advertised size {size}")]
    MalformedHeader { size: u16 },

    /// Advertised size exceeds the bytes on hand.
    #[error("short frame: advertised {advertised} bytes, {available} available")]
    ShortFrame { advertised: usize, available: usize },

    /// A fixed-width field runs past the advertised frame end.
    #[error("truncated field in message type {msg_type}")]
    TruncatedField { msg_type: u16 },

    /// A string field has no NUL terminator within the frame body.
    #[error("unterminated string in message type {msg_type}")]
    UnterminatedString { msg_type: u16 },
}

/// Peek the advertised frame size from a reassembly buffer.
///
/// Returns `None` until the 4-byte header has arrived.
#[inline]
pub fn frame_size(buf: &[u8]) -> Option<u16> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    Some(u16::from_le_bytes([buf[0], buf[1]]))
}

// ---------------------------------------------------------------------------
// Body writer
// ---------------------------------------------------------------------------

/// Accumulates a frame body behind a 4-byte header placeholder; `finish`
/// patches in the final size so the framing invariant holds by construction.
struct FrameWriter {
    buf: Vec<u8>,
}

impl FrameWriter {
    fn new() -> Self {
        Self { buf: vec![0u8; HEADER_LEN] }
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn cstr(&mut self, s: &str) {
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
    }

    fn finish(mut self, msg_type: u16) -> Vec<u8> {
        debug_assert!(self.buf.len() <= u16::MAX as usize, "frame exceeds u16 size field");
        let size = self.buf.len() as u16;
        self.buf[0..2].copy_from_slice(&size.to_le_bytes());
        self.buf[2..4].copy_from_slice(&msg_type.to_le_bytes());
        self.buf
    }
}

// ---------------------------------------------------------------------------
// Body reader
// ---------------------------------------------------------------------------

/// Cursor over one frame body. All reads are bounds-checked against the
/// advertised size.
struct FrameReader<'a> {
    body: &'a [u8],
    pos: usize,
    msg_type: u16,
}

impl<'a> FrameReader<'a> {
    fn new(body: &'a [u8], msg_type: u16) -> Self {
        Self { body, pos: 0, msg_type }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.pos + n > self.body.len() {
            return Err(DecodeError::TruncatedField { msg_type: self.msg_type });
        }
        let slice = &self.body[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().expect("length checked")))
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().expect("length checked")))
    }

    fn i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().expect("length checked")))
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().expect("length checked")))
    }

    fn f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().expect("length checked")))
    }

    fn f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().expect("length checked")))
    }

    /// Bounded NUL search within the remaining body. Non-UTF-8 bytes are
    /// replaced rather than failing the frame.
    fn cstr(&mut self) -> Result<String, DecodeError> {
        let rest = &self.body[self.pos..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(DecodeError::UnterminatedString { msg_type: self.msg_type })?;
        let s = String::from_utf8_lossy(&rest[..nul]).into_owned();
        self.pos += nul + 1;
        Ok(s)
    }
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Serialize a message into one framed byte vector.
///
/// The header size field always equals the returned length.
pub fn encode(msg: &DtcMessage) -> Vec<u8> {
    let mut w = FrameWriter::new();
    match msg {
        DtcMessage::LogonRequest(m) => {
            w.u16(m.protocol_version);
            w.cstr(&m.username);
            w.cstr(&m.password);
            w.cstr(&m.general_text_data);
            w.cstr(&m.integer_1);
            w.cstr(&m.integer_2);
            w.u8(m.heartbeat_interval);
            w.u8(m.unused_1);
            w.cstr(&m.trade_account);
            w.cstr(&m.hardware_identifier);
            w.cstr(&m.client_name);
        }
        DtcMessage::LogonResponse(m) => {
            w.u16(m.protocol_version);
            w.u8(m.result);
            w.cstr(&m.result_text);
            w.cstr(&m.reconnect_address);
            w.u16(m.integer_1);
            w.cstr(&m.server_name);
            w.u8(m.market_depth_updates_best_bid_and_ask);
            w.u8(m.trading_is_supported);
            w.u8(m.order_cancel_replace_supported);
            w.cstr(&m.symbol_exchange_delimiter);
            w.u8(m.security_definitions_supported);
            w.u8(m.historical_price_data_supported);
            w.u8(m.resubscribe_when_market_data_feed_available);
            w.u8(m.market_depth_is_supported);
            w.u8(m.one_historical_price_data_request_per_connection);
            w.u8(m.use_integer_price_order_messages);
            w.u8(m.bracket_order_supported);
            w.u8(m.use_lookup_table_for_order_id);
        }
        DtcMessage::Heartbeat(m) => {
            w.u32(m.num_drops);
            w.u64(m.current_date_time);
        }
        DtcMessage::Logoff(m) => {
            w.cstr(&m.reason);
            w.u8(m.do_not_reconnect);
        }
        DtcMessage::MarketDataRequest(m) => {
            w.u8(m.request_action as u8);
            w.u16(m.symbol_id);
            w.cstr(&m.symbol);
            w.cstr(&m.exchange);
        }
        DtcMessage::MarketDataReject(m) => {
            w.u16(m.symbol_id);
            w.cstr(&m.reject_text);
        }
        DtcMessage::MarketDataUpdateTrade(m) => {
            w.u16(m.symbol_id);
            w.f64(m.at_bid_or_ask);
            w.f64(m.price);
            w.f64(m.volume);
            w.u64(m.date_time);
        }
        DtcMessage::MarketDataUpdateBidAsk(m) => {
            w.u16(m.symbol_id);
            w.f64(m.bid_price);
            w.f32(m.bid_quantity);
            w.f64(m.ask_price);
            w.f32(m.ask_quantity);
            w.u64(m.date_time);
            w.u8(m.is_bid_change);
            w.u8(m.is_ask_change);
        }
        DtcMessage::SubmitNewSingleOrder(m) => {
            w.cstr(&m.symbol);
            w.cstr(&m.exchange);
            w.cstr(&m.trade_account);
            w.cstr(&m.client_order_id);
            w.u8(m.order_type as u8);
            w.u8(m.buy_sell as u8);
            w.f64(m.price1);
            w.f64(m.price2);
            w.f64(m.quantity);
            w.u8(m.time_in_force as u8);
            w.u64(m.good_till_date_time);
            w.u8(m.is_automated_order);
            w.u8(m.is_parent_order);
            w.cstr(&m.free_form_text);
        }
        DtcMessage::OrderUpdate(m) => {
            w.u32(m.request_id);
            w.i32(m.total_num_messages);
            w.i32(m.message_number);
            w.cstr(&m.symbol);
            w.cstr(&m.exchange);
            w.cstr(&m.previous_server_order_id);
            w.cstr(&m.server_order_id);
            w.cstr(&m.client_order_id);
            w.cstr(&m.exchange_order_id);
            w.u8(m.order_status as u8);
            w.u8(m.order_type as u8);
            w.u8(m.buy_sell as u8);
            w.f64(m.price1);
            w.f64(m.price2);
            w.f64(m.order_quantity);
            w.f64(m.filled_quantity);
            w.f64(m.remaining_quantity);
            w.f64(m.average_fill_price);
            w.f64(m.last_fill_price);
            w.f64(m.last_fill_quantity);
            w.u64(m.last_fill_date_time);
            w.u64(m.order_received_date_time);
            w.u8(m.time_in_force as u8);
            w.u64(m.good_till_date_time);
            w.u32(m.order_update_sequence_number);
            w.cstr(&m.free_form_text);
            w.cstr(&m.order_id);
            w.cstr(&m.trade_account);
            w.cstr(&m.info_text);
            w.u8(m.no_orders);
            w.cstr(&m.parent_server_order_id);
            w.cstr(&m.oco_linked_order_server_order_id);
        }
        DtcMessage::CurrentPositionsRequest(m) => {
            w.u32(m.request_id);
            w.cstr(&m.trade_account);
        }
        DtcMessage::PositionUpdate(m) => {
            w.u32(m.request_id);
            w.i32(m.total_number_messages);
            w.i32(m.message_number);
            w.cstr(&m.symbol);
            w.cstr(&m.exchange);
            w.f64(m.quantity);
            w.f64(m.average_price);
            w.cstr(&m.position_identifier);
            w.cstr(&m.trade_account);
            w.u8(m.no_positions);
            w.u8(m.unsolicited);
        }
        DtcMessage::CurrentPositionsReject(m) => {
            w.u32(m.request_id);
            w.cstr(&m.reject_text);
        }
        DtcMessage::SecurityDefinitionForSymbolRequest(m) => {
            w.u32(m.request_id);
            w.cstr(&m.symbol);
            w.cstr(&m.exchange);
        }
        DtcMessage::SecurityDefinitionResponse(m) => {
            w.u32(m.request_id);
            w.cstr(&m.symbol);
            w.cstr(&m.exchange);
            w.u8(m.security_type);
            w.cstr(&m.description);
            w.f32(m.min_price_increment);
            w.u8(m.price_display_format);
            w.f32(m.currency_value_per_increment);
            w.u8(m.has_market_depth_data);
            w.f32(m.display_price_multiplier);
            w.cstr(&m.exchange_symbol);
            w.f32(m.initial_margin_requirement);
            w.f32(m.maintenance_margin_requirement);
            w.cstr(&m.currency);
            w.f32(m.contract_size);
            w.u32(m.open_interest);
            w.u64(m.roll_over_date);
            w.u8(m.is_delayed);
        }
        DtcMessage::SymbolSearchRequest(m) => {
            w.u32(m.request_id);
            w.cstr(&m.search_text);
            w.cstr(&m.exchange);
        }
        DtcMessage::GeneralLogMessage(m) => {
            w.cstr(&m.message_text);
        }
        DtcMessage::AlertMessage(m) => {
            w.cstr(&m.message_text);
        }
        // Header-only frame; nothing sensible to put in the body.
        DtcMessage::Unknown { .. } => {}
    }
    w.finish(msg.type_code())
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Decode one frame from the front of `bytes`.
///
/// On success returns the message and the number of bytes consumed (the
/// advertised frame size); callers keep any residue for the next call.
pub fn decode(bytes: &[u8]) -> Result<(DtcMessage, usize), DecodeError> {
    if bytes.len() < HEADER_LEN {
        return Err(DecodeError::ShortFrame { advertised: HEADER_LEN, available: bytes.len() });
    }
    let size = u16::from_le_bytes([bytes[0], bytes[1]]);
    let msg_type = u16::from_le_bytes([bytes[2], bytes[3]]);
    if (size as usize) < HEADER_LEN {
        return Err(DecodeError::MalformedHeader { size });
    }
    if size as usize > bytes.len() {
        return Err(DecodeError::ShortFrame { advertised: size as usize, available: bytes.len() });
    }

    let body = &bytes[HEADER_LEN..size as usize];
    let mut r = FrameReader::new(body, msg_type);

    let msg = match MessageType::from_u16(msg_type) {
        Some(MessageType::LogonRequest) => DtcMessage::LogonRequest(LogonRequest {
            protocol_version: r.u16()?,
            username: r.cstr()?,
            password: r.cstr()?,
            general_text_data: r.cstr()?,
            integer_1: r.cstr()?,
            integer_2: r.cstr()?,
            heartbeat_interval: r.u8()?,
            unused_1: r.u8()?,
            trade_account: r.cstr()?,
            hardware_identifier: r.cstr()?,
            client_name: r.cstr()?,
        }),
        Some(MessageType::LogonResponse) => DtcMessage::LogonResponse(LogonResponse {
            protocol_version: r.u16()?,
            result: r.u8()?,
            result_text: r.cstr()?,
            reconnect_address: r.cstr()?,
            integer_1: r.u16()?,
            server_name: r.cstr()?,
            market_depth_updates_best_bid_and_ask: r.u8()?,
            trading_is_supported: r.u8()?,
            order_cancel_replace_supported: r.u8()?,
            symbol_exchange_delimiter: r.cstr()?,
            security_definitions_supported: r.u8()?,
            historical_price_data_supported: r.u8()?,
            resubscribe_when_market_data_feed_available: r.u8()?,
            market_depth_is_supported: r.u8()?,
            one_historical_price_data_request_per_connection: r.u8()?,
            use_integer_price_order_messages: r.u8()?,
            bracket_order_supported: r.u8()?,
            use_lookup_table_for_order_id: r.u8()?,
        }),
        Some(MessageType::Heartbeat) => DtcMessage::Heartbeat(Heartbeat {
            num_drops: r.u32()?,
            current_date_time: r.u64()?,
        }),
        Some(MessageType::Logoff) => DtcMessage::Logoff(Logoff {
            reason: r.cstr()?,
            do_not_reconnect: r.u8()?,
        }),
        Some(MessageType::MarketDataRequest) => DtcMessage::MarketDataRequest(MarketDataRequest {
            request_action: RequestAction::from_u8(r.u8()?),
            symbol_id: r.u16()?,
            symbol: r.cstr()?,
            exchange: r.cstr()?,
        }),
        Some(MessageType::MarketDataReject) => DtcMessage::MarketDataReject(MarketDataReject {
            symbol_id: r.u16()?,
            reject_text: r.cstr()?,
        }),
        Some(MessageType::MarketDataUpdateTrade) => {
            DtcMessage::MarketDataUpdateTrade(MarketDataUpdateTrade {
                symbol_id: r.u16()?,
                at_bid_or_ask: r.f64()?,
                price: r.f64()?,
                volume: r.f64()?,
                date_time: r.u64()?,
            })
        }
        Some(MessageType::MarketDataUpdateBidAsk) => {
            DtcMessage::MarketDataUpdateBidAsk(MarketDataUpdateBidAsk {
                symbol_id: r.u16()?,
                bid_price: r.f64()?,
                bid_quantity: r.f32()?,
                ask_price: r.f64()?,
                ask_quantity: r.f32()?,
                date_time: r.u64()?,
                is_bid_change: r.u8()?,
                is_ask_change: r.u8()?,
            })
        }
        Some(MessageType::SubmitNewSingleOrder) => {
            DtcMessage::SubmitNewSingleOrder(SubmitNewSingleOrder {
                symbol: r.cstr()?,
                exchange: r.cstr()?,
                trade_account: r.cstr()?,
                client_order_id: r.cstr()?,
                order_type: OrderType::from_u8(r.u8()?),
                buy_sell: BuySell::from_u8(r.u8()?),
                price1: r.f64()?,
                price2: r.f64()?,
                quantity: r.f64()?,
                time_in_force: TimeInForce::from_u8(r.u8()?),
                good_till_date_time: r.u64()?,
                is_automated_order: r.u8()?,
                is_parent_order: r.u8()?,
                free_form_text: r.cstr()?,
            })
        }
        Some(MessageType::OrderUpdate) => DtcMessage::OrderUpdate(Box::new(OrderUpdate {
            request_id: r.u32()?,
            total_num_messages: r.i32()?,
            message_number: r.i32()?,
            symbol: r.cstr()?,
            exchange: r.cstr()?,
            previous_server_order_id: r.cstr()?,
            server_order_id: r.cstr()?,
            client_order_id: r.cstr()?,
            exchange_order_id: r.cstr()?,
            order_status: OrderStatus::from_u8(r.u8()?),
            order_type: OrderType::from_u8(r.u8()?),
            buy_sell: BuySell::from_u8(r.u8()?),
            price1: r.f64()?,
            price2: r.f64()?,
            order_quantity: r.f64()?,
            filled_quantity: r.f64()?,
            remaining_quantity: r.f64()?,
            average_fill_price: r.f64()?,
            last_fill_price: r.f64()?,
            last_fill_quantity: r.f64()?,
            last_fill_date_time: r.u64()?,
            order_received_date_time: r.u64()?,
            time_in_force: TimeInForce::from_u8(r.u8()?),
            good_till_date_time: r.u64()?,
            order_update_sequence_number: r.u32()?,
            free_form_text: r.cstr()?,
            order_id: r.cstr()?,
            trade_account: r.cstr()?,
            info_text: r.cstr()?,
            no_orders: r.u8()?,
            parent_server_order_id: r.cstr()?,
            oco_linked_order_server_order_id: r.cstr()?,
        })),
        Some(MessageType::CurrentPositionsRequest) => {
            DtcMessage::CurrentPositionsRequest(CurrentPositionsRequest {
                request_id: r.u32()?,
                trade_account: r.cstr()?,
            })
        }
        Some(MessageType::PositionUpdate) => DtcMessage::PositionUpdate(PositionUpdate {
            request_id: r.u32()?,
            total_number_messages: r.i32()?,
            message_number: r.i32()?,
            symbol: r.cstr()?,
            exchange: r.cstr()?,
            quantity: r.f64()?,
            average_price: r.f64()?,
            position_identifier: r.cstr()?,
            trade_account: r.cstr()?,
            no_positions: r.u8()?,
            unsolicited: r.u8()?,
        }),
        Some(MessageType::CurrentPositionsReject) => {
            DtcMessage::CurrentPositionsReject(CurrentPositionsReject {
                request_id: r.u32()?,
                reject_text: r.cstr()?,
            })
        }
        Some(MessageType::SecurityDefinitionForSymbolRequest) => {
            DtcMessage::SecurityDefinitionForSymbolRequest(SecurityDefinitionForSymbolRequest {
                request_id: r.u32()?,
                symbol: r.cstr()?,
                exchange: r.cstr()?,
            })
        }
        Some(MessageType::SecurityDefinitionResponse) => {
            DtcMessage::SecurityDefinitionResponse(Box::new(SecurityDefinitionResponse {
                request_id: r.u32()?,
                symbol: r.cstr()?,
                exchange: r.cstr()?,
                security_type: r.u8()?,
                description: r.cstr()?,
                min_price_increment: r.f32()?,
                price_display_format: r.u8()?,
                currency_value_per_increment: r.f32()?,
                has_market_depth_data: r.u8()?,
                display_price_multiplier: r.f32()?,
                exchange_symbol: r.cstr()?,
                initial_margin_requirement: r.f32()?,
                maintenance_margin_requirement: r.f32()?,
                currency: r.cstr()?,
                contract_size: r.f32()?,
                open_interest: r.u32()?,
                roll_over_date: r.u64()?,
                is_delayed: r.u8()?,
            }))
        }
        Some(MessageType::SymbolSearchRequest) => {
            DtcMessage::SymbolSearchRequest(SymbolSearchRequest {
                request_id: r.u32()?,
                search_text: r.cstr()?,
                exchange: r.cstr()?,
            })
        }
        Some(MessageType::GeneralLogMessage) => {
            DtcMessage::GeneralLogMessage(GeneralLogMessage { message_text: r.cstr()? })
        }
        Some(MessageType::AlertMessage) => {
            DtcMessage::AlertMessage(AlertMessage { message_text: r.cstr()? })
        }
        // 504 is server→client only; inbound it falls through with the
        // other unhandled codes.
        Some(MessageType::SymbolSearchResponse) | None => DtcMessage::Unknown { msg_type },
    };

    Ok((msg, size as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(msg: DtcMessage) {
        let bytes = encode(&msg);
        // Framing invariant: first two bytes carry the total length.
        assert_eq!(frame_size(&bytes), Some(bytes.len() as u16));
        let (decoded, consumed) = decode(&bytes).expect("decode");
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, msg);
        // Re-encoding is byte-stable.
        assert_eq!(encode(&decoded), bytes);
    }

    #[test]
    fn logon_request_round_trip() {
        round_trip(DtcMessage::LogonRequest(LogonRequest {
            username: "alice".into(),
            password: "x".into(),
            heartbeat_interval: 10,
            client_name: "T".into(),
            ..Default::default()
        }));
    }

    #[test]
    fn logon_response_round_trip() {
        round_trip(DtcMessage::LogonResponse(LogonResponse {
            result: 1,
            result_text: "ok".into(),
            server_name: "dtc-bridge".into(),
            ..Default::default()
        }));
    }

    #[test]
    fn heartbeat_round_trip() {
        round_trip(DtcMessage::Heartbeat(Heartbeat {
            num_drops: 3,
            current_date_time: 1_700_000_000,
        }));
    }

    #[test]
    fn logoff_round_trip() {
        round_trip(DtcMessage::Logoff(Logoff {
            reason: "client shutdown".into(),
            do_not_reconnect: 1,
        }));
    }

    #[test]
    fn market_data_request_round_trip() {
        round_trip(DtcMessage::MarketDataRequest(MarketDataRequest {
            request_action: RequestAction::Subscribe,
            symbol_id: 7,
            symbol: "BTC-USD".into(),
            exchange: "coinbase".into(),
        }));
    }

    #[test]
    fn market_data_reject_round_trip() {
        round_trip(DtcMessage::MarketDataReject(MarketDataReject {
            symbol_id: 2,
            reject_text: "unknown symbol".into(),
        }));
    }

    #[test]
    fn trade_update_round_trip() {
        round_trip(DtcMessage::MarketDataUpdateTrade(MarketDataUpdateTrade {
            symbol_id: 1,
            at_bid_or_ask: 2.0,
            price: 50_000.0,
            volume: 0.01,
            date_time: 1_700_000_000_000_000_000,
        }));
    }

    #[test]
    fn bid_ask_update_round_trip() {
        round_trip(DtcMessage::MarketDataUpdateBidAsk(MarketDataUpdateBidAsk {
            symbol_id: 4,
            bid_price: 49_999.5,
            bid_quantity: 1.25,
            ask_price: 50_000.5,
            ask_quantity: 0.5,
            date_time: 1_700_000_000_000_000_000,
            is_bid_change: 1,
            is_ask_change: 0,
        }));
    }

    #[test]
    fn bid_ask_quantities_are_f32() {
        let bytes = encode(&DtcMessage::MarketDataUpdateBidAsk(MarketDataUpdateBidAsk::default()));
        // header 4 + u16 + f64 + f32 + f64 + f32 + u64 + 2×u8
        assert_eq!(bytes.len(), 4 + 2 + 8 + 4 + 8 + 4 + 8 + 2);
    }

    #[test]
    fn order_messages_round_trip() {
        round_trip(DtcMessage::SubmitNewSingleOrder(SubmitNewSingleOrder {
            symbol: "BTC-USD".into(),
            exchange: "coinbase".into(),
            client_order_id: "c-42".into(),
            order_type: OrderType::Limit,
            buy_sell: BuySell::Buy,
            price1: 48_000.0,
            quantity: 0.5,
            time_in_force: TimeInForce::GoodTillCanceled,
            ..Default::default()
        }));
        round_trip(DtcMessage::OrderUpdate(Box::new(OrderUpdate {
            symbol: "BTC-USD".into(),
            client_order_id: "c-42".into(),
            order_status: OrderStatus::Rejected,
            info_text: "order entry not supported".into(),
            total_num_messages: 1,
            message_number: 1,
            ..Default::default()
        })));
    }

    #[test]
    fn position_messages_round_trip() {
        round_trip(DtcMessage::CurrentPositionsRequest(CurrentPositionsRequest {
            request_id: 9,
            trade_account: "acct".into(),
        }));
        round_trip(DtcMessage::PositionUpdate(PositionUpdate {
            request_id: 9,
            total_number_messages: 1,
            message_number: 1,
            no_positions: 1,
            ..Default::default()
        }));
        round_trip(DtcMessage::CurrentPositionsReject(CurrentPositionsReject {
            request_id: 9,
            reject_text: "no trade account".into(),
        }));
    }

    #[test]
    fn security_definition_round_trip() {
        round_trip(DtcMessage::SecurityDefinitionForSymbolRequest(
            SecurityDefinitionForSymbolRequest {
                request_id: 11,
                symbol: "ETH-USDC".into(),
                exchange: "coinbase".into(),
            },
        ));
        round_trip(DtcMessage::SecurityDefinitionResponse(Box::new(
            SecurityDefinitionResponse {
                request_id: 11,
                symbol: "ETH-USDC".into(),
                exchange: "coinbase".into(),
                description: "ETH/USDC".into(),
                min_price_increment: 0.01,
                currency: "USDC".into(),
                ..Default::default()
            },
        )));
        round_trip(DtcMessage::SymbolSearchRequest(SymbolSearchRequest {
            request_id: 12,
            search_text: "BTC".into(),
            exchange: String::new(),
        }));
    }

    #[test]
    fn system_messages_round_trip() {
        round_trip(DtcMessage::GeneralLogMessage(GeneralLogMessage {
            message_text: "feed connected".into(),
        }));
        round_trip(DtcMessage::AlertMessage(AlertMessage {
            message_text: "server full".into(),
        }));
    }

    #[test]
    fn empty_strings_are_legal() {
        round_trip(DtcMessage::Logoff(Logoff::default()));
        round_trip(DtcMessage::MarketDataRequest(MarketDataRequest::default()));
    }

    #[test]
    fn header_below_minimum_is_malformed() {
        for size in [0u16, 1, 3] {
            let mut bytes = size.to_le_bytes().to_vec();
            bytes.extend_from_slice(&3u16.to_le_bytes());
            assert_eq!(decode(&bytes), Err(DecodeError::MalformedHeader { size }));
        }
    }

    #[test]
    fn advertised_size_beyond_buffer_is_short_frame() {
        let full = encode(&DtcMessage::Heartbeat(Heartbeat::default()));
        let truncated = &full[..full.len() - 1];
        assert!(matches!(decode(truncated), Err(DecodeError::ShortFrame { .. })));
        // Fewer than header bytes is also a short frame.
        assert!(matches!(decode(&full[..2]), Err(DecodeError::ShortFrame { .. })));
    }

    #[test]
    fn field_past_frame_end_is_truncated() {
        // Heartbeat advertises a 6-byte frame but its body needs 12 bytes.
        let mut bytes = 6u16.to_le_bytes().to_vec();
        bytes.extend_from_slice(&(MessageType::Heartbeat as u16).to_le_bytes());
        bytes.extend_from_slice(&[0, 0]);
        assert_eq!(decode(&bytes), Err(DecodeError::TruncatedField { msg_type: 3 }));
    }

    #[test]
    fn missing_nul_is_unterminated() {
        // Logoff whose reason string runs to the end of the frame un-terminated.
        let mut bytes = 8u16.to_le_bytes().to_vec();
        bytes.extend_from_slice(&(MessageType::Logoff as u16).to_le_bytes());
        bytes.extend_from_slice(b"oops");
        assert_eq!(decode(&bytes), Err(DecodeError::UnterminatedString { msg_type: 5 }));
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        let mut bytes = 6u16.to_le_bytes().to_vec();
        bytes.extend_from_slice(&999u16.to_le_bytes());
        bytes.extend_from_slice(&[0xAA, 0xBB]);
        let (msg, consumed) = decode(&bytes).unwrap();
        assert_eq!(msg, DtcMessage::Unknown { msg_type: 999 });
        assert_eq!(consumed, 6);
    }

    #[test]
    fn out_of_domain_action_decodes_leniently() {
        let mut bytes = encode(&DtcMessage::MarketDataRequest(MarketDataRequest {
            request_action: RequestAction::Subscribe,
            symbol_id: 1,
            symbol: "BTC-USD".into(),
            exchange: String::new(),
        }));
        bytes[HEADER_LEN] = 200; // clobber the action byte
        let (msg, _) = decode(&bytes).unwrap();
        match msg {
            DtcMessage::MarketDataRequest(m) => {
                assert_eq!(m.request_action, RequestAction::Unspecified);
                assert_eq!(m.symbol, "BTC-USD");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn residue_after_frame_is_left_alone() {
        let mut stream = encode(&DtcMessage::Heartbeat(Heartbeat::default()));
        let second = encode(&DtcMessage::Logoff(Logoff::default()));
        stream.extend_from_slice(&second[..3]); // partial second frame
        let (msg, consumed) = decode(&stream).unwrap();
        assert!(matches!(msg, DtcMessage::Heartbeat(_)));
        assert_eq!(stream.len() - consumed, 3);
    }
}
