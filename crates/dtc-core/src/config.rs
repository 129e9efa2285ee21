//! Configuration parsing for the bridge server.
//!
//! Settings come from a single JSON config file plus CLI overrides applied by
//! the runner. The file mirrors [`ServerConfig`]; every field is optional in
//! the file and falls back to the defaults below.
//!
//! # Example config
//!
//! ```json
//! {
//!   "bind_address": "0.0.0.0",
//!   "port": 11099,
//!   "server_name": "dtc-bridge",
//!   "max_clients": 100,
//!   "exchanges": [{
//!     "name": "coinbase",
//!     "websocket_url": "wss://ws-feed.exchange.coinbase.com/",
//!     "api_url": "https://api.coinbase.com"
//!   }]
//! }
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::BridgeError;

/// Default DTC listen port.
pub const DEFAULT_PORT: u16 = 11099;

/// Heartbeat interval used when a client negotiates 0 at logon.
pub const DEFAULT_HEARTBEAT_SECS: u8 = 10;

/// Top-level server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the DTC listener binds to.
    pub bind_address: String,
    /// DTC listen port.
    pub port: u16,
    /// Name reported in `LogonResponse.server_name`.
    pub server_name: String,
    /// Optional logon password. Checked only when `require_authentication`.
    pub password: Option<String>,
    /// Reject logons whose password does not match `password`.
    pub require_authentication: bool,
    /// Maximum concurrently connected clients; excess connections are
    /// turned away after an alert frame.
    pub max_clients: usize,
    /// Directory with CDP credential JSON files.
    pub secrets_dir: String,
    /// Upstream exchange feeds to attach at startup.
    pub exchanges: Vec<ExchangeConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            server_name: "dtc-bridge".to_string(),
            password: None,
            require_authentication: false,
            max_clients: 100,
            secrets_dir: "secrets".to_string(),
            exchanges: vec![ExchangeConfig::coinbase()],
        }
    }
}

impl ServerConfig {
    /// Validate cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.bind_address.is_empty() {
            return Err(BridgeError::Config("bind_address must not be empty".into()));
        }
        if self.port == 0 {
            return Err(BridgeError::Config("port must be non-zero".into()));
        }
        if self.max_clients == 0 {
            return Err(BridgeError::Config("max_clients must be at least 1".into()));
        }
        if self.require_authentication && self.password.as_deref().unwrap_or("").is_empty() {
            return Err(BridgeError::Config(
                "require_authentication is set but no password configured".into(),
            ));
        }
        Ok(())
    }
}

/// One upstream exchange connection.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    /// Exchange identifier (e.g. `"coinbase"`).
    pub name: String,
    /// Market-data WebSocket endpoint.
    pub websocket_url: String,
    /// REST API base URL.
    pub api_url: String,
}

impl ExchangeConfig {
    /// The default Coinbase exchange endpoints.
    pub fn coinbase() -> Self {
        Self {
            name: "coinbase".to_string(),
            websocket_url: "wss://ws-feed.exchange.coinbase.com/".to_string(),
            api_url: "https://api.coinbase.com".to_string(),
        }
    }
}

/// Load and parse a JSON config file.
pub fn load_config(path: &Path) -> Result<ServerConfig, BridgeError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| BridgeError::Config(format!("cannot read {}: {e}", path.display())))?;
    let config: ServerConfig = serde_json::from_str(&content)
        .map_err(|e| BridgeError::Config(format!("cannot parse {}: {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}
