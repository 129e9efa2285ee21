//! # dtc-core
//!
//! Core crate for the DTC market-data bridge, providing:
//!
//! - **Wire protocol** (`dtc`) — DTC v8 binary framing, message catalog, codec
//! - **Types** (`types`) — normalized market-data events shared by all crates
//! - **Configuration** (`config`) — JSON config deserialization + defaults
//! - **Error types** (`error`) — domain-specific `BridgeError` via thiserror
//! - **Time utilities** (`time_util`) — high-precision timestamps
//! - **Logging** (`logging`) — tracing-based structured logging with profiles

pub mod config;
pub mod dtc;
pub mod error;
pub mod logging;
pub mod time_util;
pub mod types;

// Re-export the event types at crate root for convenience.
pub use types::*;
