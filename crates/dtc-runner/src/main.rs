//! # dtc-runner
//!
//! Main entry point for the DTC market-data bridge.
//!
//! Loads the JSON configuration, applies CLI overrides, wires the symbol
//! registry, the exchange feeds, the aggregator, and the DTC server
//! together, then runs until Ctrl+C.
//!
//! # Usage
//!
//! ```bash
//! dtc-runner --port 11099 --log-profile advanced
//! dtc-runner --config bridge.json
//! ```
//!
//! Exit codes: 0 clean shutdown, 1 startup failure, 2 configuration error.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dtc_core::config::{self, ServerConfig};
use dtc_core::error::BridgeError;
use dtc_core::logging::{self, LogProfile};
use dtc_feed::ExchangeFeed;
use dtc_feed::aggregator::FeedAggregator;
use dtc_feed::coinbase::CoinbaseFeed;
use dtc_feed::mock::MockFeed;
use dtc_feed::transport::TlsConnector;
use dtc_rest::{CdpCredentials, RestClient};
use dtc_server::{DtcServer, SymbolRegistry};
use tracing::{error, info, warn};

/// DTC market-data bridge server.
#[derive(Parser)]
#[command(name = "dtc-runner", about = "DTC market-data bridge server")]
struct Cli {
    /// Listen address.
    #[arg(long)]
    bind: Option<String>,

    /// DTC listen port.
    #[arg(long)]
    port: Option<u16>,

    /// Name reported to clients at logon.
    #[arg(long)]
    server_name: Option<String>,

    /// Maximum concurrent clients.
    #[arg(long)]
    max_clients: Option<usize>,

    /// Log verbosity profile: std, advanced, or verbose.
    #[arg(long, default_value_t = LogProfile::Advanced)]
    log_profile: LogProfile,

    /// Configuration file path (JSON).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Optional log directory for file output.
    #[arg(long)]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.log_profile, cli.log_dir.as_deref(), "dtc_server");

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {e}");
            return ExitCode::from(2);
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("startup failed: {e:#}");
            ExitCode::from(1)
        }
    }
}

/// Config file merged with CLI overrides, then validated.
fn build_config(cli: &Cli) -> Result<ServerConfig, BridgeError> {
    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = &cli.bind {
        config.bind_address = bind.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(name) = &cli.server_name {
        config.server_name = name.clone();
    }
    if let Some(max) = cli.max_clients {
        config.max_clients = max;
    }
    config.validate()?;
    Ok(config)
}

async fn run(config: ServerConfig) -> Result<()> {
    // 1. Symbol catalog, seeded with the default product set.
    let registry = Arc::new(SymbolRegistry::with_defaults());

    // 2. REST access: credentials if present, public mode otherwise. A bad
    //    key is downgraded to public mode rather than blocking market data.
    let credentials = CdpCredentials::load(Path::new(&config.secrets_dir));
    let api_url = std::env::var("COINBASE_API_URL")
        .unwrap_or_else(|_| dtc_rest::client::DEFAULT_BASE_URL.to_string());
    let rest = match RestClient::new(&api_url, credentials.as_ref()) {
        Ok(rest) => rest,
        Err(e) => {
            warn!("credentials rejected ({e}), continuing in public mode");
            RestClient::new(&api_url, None).expect("public client needs no key material")
        }
    };

    let mock_mode = std::env::var("COINBASE_TEST_MODE").is_ok_and(|v| v == "mock");
    if !mock_mode {
        enrich_catalog(&rest, &registry).await;
        if rest.is_authenticated() {
            match rest.portfolio_summary().await {
                Ok(summary) => info!(
                    "account snapshot: {} account(s), ≈ {:.2} USD available",
                    summary.balances.len(),
                    summary.total_value_usd
                ),
                Err(e) => warn!("account query failed: {e}"),
            }
        }
    }

    // 3. Feeds behind the aggregator.
    let (aggregator, events) = FeedAggregator::new();
    for exchange in &config.exchanges {
        let feed: Arc<dyn ExchangeFeed> = if mock_mode {
            info!("COINBASE_TEST_MODE=mock — using the mock feed for '{}'", exchange.name);
            Arc::new(MockFeed::new(&exchange.name))
        } else {
            let catalog = registry.all().iter().map(|s| s.canonical.clone()).collect();
            Arc::new(CoinbaseFeed::new(
                &exchange.name,
                &exchange.websocket_url,
                Box::new(TlsConnector),
                catalog,
            ))
        };
        aggregator
            .add_exchange(feed)
            .await
            .with_context(|| format!("attach exchange '{}'", exchange.name))?;
    }

    // 4. The DTC server.
    let server = DtcServer::new(config, registry, aggregator);
    let addr = server.start(events).await?;
    info!("bridge ready on {addr} — press Ctrl+C to stop");

    tokio::signal::ctrl_c().await.context("wait for shutdown signal")?;
    info!("shutdown signal received");
    server.shutdown().await;
    info!("goodbye");
    Ok(())
}

/// Pull the live product list and register anything tradable the seed
/// missed. Best-effort: offline startup still works from the seed.
async fn enrich_catalog(rest: &RestClient, registry: &SymbolRegistry) {
    match rest.list_products().await {
        Ok(products) => {
            let mut added = 0usize;
            for product in products.iter().filter(|p| p.is_online()) {
                if registry.by_canonical(&product.product_id).is_none()
                    && registry.allocate(&product.product_id).is_ok()
                {
                    added += 1;
                }
            }
            info!("product catalog: {} symbol(s) ({added} discovered)", registry.len());
        }
        Err(e) => warn!("product catalog refresh failed ({e}), using the default seed"),
    }
}
