//! # dtc-server
//!
//! The DTC-facing half of the bridge:
//!
//! - [`registry`] — global symbol catalog shared by every session
//! - [`symbol_table`] — per-session `u16` symbol-id aliasing
//! - [`session`] — per-client state machine, send path, frame reassembly
//! - [`server`] — accept loop, heartbeat monitor, market-data fan-out
//!
//! The server consumes normalized events from a
//! [`dtc_feed::aggregator::FeedAggregator`] and speaks DTC v8 to clients.

pub mod registry;
pub mod server;
pub mod session;
pub mod symbol_table;

pub use registry::{SymbolInfo, SymbolRegistry};
pub use server::DtcServer;
