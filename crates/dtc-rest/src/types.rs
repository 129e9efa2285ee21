//! Typed response shapes for the Advanced Trade REST API.
//!
//! Monetary values arrive as decimal strings; `f64` accessors are provided
//! where the bridge needs numbers. Unknown fields are ignored so upstream
//! schema additions do not break parsing.

use serde::Deserialize;

/// A money amount with its currency.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Balance {
    pub value: String,
    pub currency: String,
}

impl Balance {
    /// Decimal-string value as `f64`; unparsable values read as 0.
    pub fn amount(&self) -> f64 {
        self.value.parse().unwrap_or(0.0)
    }
}

/// One account row from `GET /accounts`.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountBalance {
    pub uuid: String,
    pub name: String,
    pub currency: String,
    pub available_balance: Balance,
    #[serde(default)]
    pub hold: Option<Balance>,
    #[serde(default)]
    pub active: bool,
    #[serde(rename = "type", default)]
    pub account_type: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AccountsResponse {
    pub accounts: Vec<AccountBalance>,
}

/// One portfolio from `GET /portfolios`.
#[derive(Debug, Clone, Deserialize)]
pub struct Portfolio {
    pub uuid: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub portfolio_type: String,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PortfoliosResponse {
    pub portfolios: Vec<Portfolio>,
}

/// One product from `GET /market/products`.
#[derive(Debug, Clone, Deserialize)]
pub struct Product {
    pub product_id: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub base_increment: String,
    #[serde(default)]
    pub quote_increment: String,
    #[serde(default)]
    pub base_currency_id: String,
    #[serde(default)]
    pub quote_currency_id: String,
    #[serde(default)]
    pub status: String,
}

impl Product {
    pub fn is_online(&self) -> bool {
        self.status.eq_ignore_ascii_case("online")
    }

    pub fn price_increment(&self) -> f64 {
        self.quote_increment.parse().unwrap_or(0.01)
    }

    pub fn size_increment(&self) -> f64 {
        self.base_increment.parse().unwrap_or(1e-8)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProductsResponse {
    pub products: Vec<Product>,
}

/// One price level of a product book.
#[derive(Debug, Clone, Deserialize)]
pub struct BookLevel {
    pub price: String,
    pub size: String,
}

/// Order book snapshot from `GET /market/product_book`.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceBook {
    pub product_id: String,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProductBookResponse {
    pub pricebook: PriceBook,
}

/// Server clock from `GET /time`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerTime {
    pub iso: String,
    #[serde(rename = "epochSeconds")]
    pub epoch_seconds: String,
    #[serde(rename = "epochMillis", default)]
    pub epoch_millis: String,
}

/// Accounts rolled up into a rough USD total.
#[derive(Debug, Clone)]
pub struct PortfolioSummary {
    pub balances: Vec<AccountBalance>,
    /// Sum of available USD/USDC balances; other currencies are not priced.
    pub total_value_usd: f64,
}
