//! Authenticated REST client for the Advanced Trade API.
//!
//! Every request is signed with a fresh-enough JWT (`Authorization: Bearer`)
//! over the full API path. Response policy:
//!
//! - `200` → typed parse
//! - `401` / `403` → [`BridgeError::AuthFailed`], no retry
//! - `429` → [`BridgeError::RateLimited`], retried with backoff
//! - `5xx` / transport error → [`BridgeError::TransientNetwork`], retried
//! - shape mismatch → [`BridgeError::Parse`] naming the endpoint
//!
//! Retries use exponential backoff from a 1000 ms base, 3 attempts total.

use std::sync::Mutex;
use std::time::Duration;

use dtc_core::error::BridgeError;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::credentials::CdpCredentials;
use crate::jwt::JwtSigner;
use crate::types::*;

/// Default API base; override with `COINBASE_API_URL`.
pub const DEFAULT_BASE_URL: &str = "https://api.coinbase.com";

const API_PREFIX: &str = "/api/v3/brokerage";

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(1_000);

/// Delay before retry `attempt` (1-based, counting the attempt just failed).
fn retry_delay(attempt: u32) -> Duration {
    BACKOFF_BASE * 2u32.saturating_pow(attempt.saturating_sub(1))
}

/// Typed Advanced Trade client. Public endpoints work without credentials;
/// authenticated endpoints fail fast in public mode.
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    signer: Option<Mutex<JwtSigner>>,
}

impl RestClient {
    /// Build a client. `credentials = None` selects public mode.
    pub fn new(
        base_url: impl Into<String>,
        credentials: Option<&CdpCredentials>,
    ) -> Result<Self, BridgeError> {
        let signer = match credentials {
            Some(creds) => Some(Mutex::new(JwtSigner::new(creds)?)),
            None => None,
        };
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            signer,
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.signer.is_some()
    }

    // -----------------------------------------------------------------------
    // Public endpoints
    // -----------------------------------------------------------------------

    pub async fn server_time(&self) -> Result<ServerTime, BridgeError> {
        self.request(Method::GET, "/time").await
    }

    pub async fn list_products(&self) -> Result<Vec<Product>, BridgeError> {
        let response: ProductsResponse = self.request(Method::GET, "/market/products").await?;
        Ok(response.products)
    }

    pub async fn product(&self, product_id: &str) -> Result<Product, BridgeError> {
        self.request(Method::GET, &format!("/market/products/{product_id}")).await
    }

    pub async fn product_book(&self, product_id: &str) -> Result<PriceBook, BridgeError> {
        let response: ProductBookResponse = self
            .request(Method::GET, &format!("/market/product_book?product_id={product_id}"))
            .await?;
        Ok(response.pricebook)
    }

    // -----------------------------------------------------------------------
    // Authenticated endpoints
    // -----------------------------------------------------------------------

    pub async fn list_accounts(&self) -> Result<Vec<AccountBalance>, BridgeError> {
        self.require_auth()?;
        let response: AccountsResponse = self.request(Method::GET, "/accounts").await?;
        Ok(response.accounts)
    }

    pub async fn list_portfolios(&self) -> Result<Vec<Portfolio>, BridgeError> {
        self.require_auth()?;
        let response: PortfoliosResponse = self.request(Method::GET, "/portfolios").await?;
        Ok(response.portfolios)
    }

    /// Accounts rolled up into a rough USD total (USD + USDC balances).
    pub async fn portfolio_summary(&self) -> Result<PortfolioSummary, BridgeError> {
        let balances = self.list_accounts().await?;
        let total_value_usd = balances
            .iter()
            .filter(|a| a.currency == "USD" || a.currency == "USDC")
            .map(|a| a.available_balance.amount())
            .sum();
        Ok(PortfolioSummary { balances, total_value_usd })
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn require_auth(&self) -> Result<(), BridgeError> {
        if self.signer.is_none() {
            return Err(BridgeError::AuthFailed(
                "endpoint requires CDP credentials (running in public mode)".into(),
            ));
        }
        Ok(())
    }

    /// One endpoint call with the retry policy applied. `suffix` is the
    /// path below the brokerage prefix, optionally carrying a query string.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        suffix: &str,
    ) -> Result<T, BridgeError> {
        let api_path = format!("{API_PREFIX}{suffix}");
        let url = format!("{}{api_path}", self.base_url);
        // The query string is not part of the signed uri claim.
        let sign_path = api_path.split('?').next().unwrap_or(&api_path).to_string();

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut request = self.http.request(method.clone(), &url);
            if let Some(signer) = &self.signer {
                let token = signer
                    .lock()
                    .expect("signer lock poisoned")
                    .token(method.as_str(), &sign_path)?;
                request = request.bearer_auth(token);
            }

            let error = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let text = response
                            .text()
                            .await
                            .map_err(|e| BridgeError::TransientNetwork(e.to_string()))?;
                        return serde_json::from_str(&text)
                            .map_err(|e| BridgeError::Parse(format!("{api_path}: {e}")));
                    }
                    match status {
                        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                            return Err(BridgeError::AuthFailed(format!(
                                "{api_path}: HTTP {status}"
                            )));
                        }
                        StatusCode::TOO_MANY_REQUESTS => BridgeError::RateLimited {
                            retry_after_ms: retry_delay(attempt).as_millis() as u64,
                        },
                        _ => BridgeError::TransientNetwork(format!("{api_path}: HTTP {status}")),
                    }
                }
                Err(e) => BridgeError::TransientNetwork(format!("{api_path}: {e}")),
            };

            if attempt >= MAX_ATTEMPTS {
                warn!("[rest] {api_path} failed after {attempt} attempts: {error}");
                return Err(error);
            }
            let delay = retry_delay(attempt);
            debug!("[rest] {api_path} attempt {attempt} failed ({error}), retrying in {delay:?}");
            tokio::time::sleep(delay).await;
        }
    }
}
