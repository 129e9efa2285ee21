//! DTC (Data and Trading Communications) wire protocol, version 8.
//!
//! Every frame is a length-prefixed record: a 4-byte header (`u16` total
//! size including the header, `u16` message type, both little-endian)
//! followed by a type-specific body. Variable-length strings are raw UTF-8
//! bytes terminated by a single NUL.
//!
//! The message catalog is closed, so it is modeled as one sum type
//! ([`DtcMessage`]) with free [`encode`]/[`decode`] functions dispatched on
//! the discriminant rather than per-type virtual serializers.

mod codec;
mod enums;
mod messages;

pub use codec::{DecodeError, HEADER_LEN, decode, encode, frame_size};
pub use enums::*;
pub use messages::*;

/// DTC protocol version implemented by this crate.
pub const PROTOCOL_VERSION: u16 = 8;
