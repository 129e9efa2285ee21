//! # dtc-rest
//!
//! Authenticated access to the Coinbase Advanced Trade (CDP) REST API.
//!
//! - [`credentials`] — CDP key material from env vars or JSON key files
//! - [`jwt`] — ES256 JWT signing with caching and refresh-window handling
//! - [`client`] — typed endpoints with retry/backoff
//! - [`types`] — response shapes (accounts, portfolios, products)
//!
//! REST calls are administrative: they block the caller and never sit on
//! the market-data hot path.

pub mod client;
pub mod credentials;
pub mod jwt;
pub mod types;

pub use client::RestClient;
pub use credentials::CdpCredentials;
pub use jwt::JwtSigner;
