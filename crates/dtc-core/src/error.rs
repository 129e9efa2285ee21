//! Typed error definitions for the bridge.
//!
//! Provides [`BridgeError`] for domain-specific errors that are more
//! informative than plain `anyhow::Error` strings. All variants implement
//! `std::error::Error` via `thiserror`, so they integrate seamlessly with
//! `anyhow::Result` at the application boundary.
//!
//! Propagation rules: session errors stay inside the owning session, feed
//! errors surface only to the aggregator, and REST errors return to the
//! administrative caller. Only the runner may turn a `BridgeError` into a
//! process exit.

use thiserror::Error;

use crate::dtc::DecodeError;

/// Domain-specific errors for the DTC bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A frame failed to decode (bad header, truncated body, missing NUL).
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] DecodeError),

    /// Recognized framing but a message type the server does not handle.
    #[error("unsupported message type {0}")]
    UnsupportedMessage(u16),

    /// Logon or upstream authentication failure (bad credentials, 401/403).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// An exchange feed exhausted its reconnect budget.
    #[error("feed down: {0}")]
    FeedDown(String),

    /// Transient network failure, eligible for retry.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Upstream rate limit (HTTP 429).
    #[error("rate limited, retry after {retry_after_ms} ms")]
    RateLimited { retry_after_ms: u64 },

    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// Response body did not match the expected shape.
    #[error("parse error: {0}")]
    Parse(String),

    /// Broken invariant. Logged FATAL; aborts the affected session, never
    /// the process.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}
