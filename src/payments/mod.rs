//! Payment rails: x402 paid fetch, treasury payouts and the price feed

pub mod price;
pub mod solana;
pub mod x402;

pub use price::PriceFeed;
pub use solana::{explorer_tx_url, PayoutRail, SolanaTreasury};
pub use x402::{PaidFetcher, PaidRequest, PaidResponse, PaymentHandler, SolanaExactHandler};

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::AppConfig;
use solana::{load_treasury_keypair, SolanaRpc};

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Payments not configured: {0}")]
    NotConfigured(String),
    #[error("Keypair error: {0}")]
    Keypair(String),
    #[error("Invalid public key: {0}")]
    InvalidPubkey(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("RPC error: {0}")]
    Rpc(String),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),
    #[error("Confirmation timed out for {0}")]
    ConfirmationTimeout(String),
    #[error("Unsupported payment requirements: {0}")]
    UnsupportedRequirements(String),
    #[error("Encoding error: {0}")]
    Encoding(String),
}

/// Payment components wired from config
pub struct Payments {
    pub fetcher: Arc<PaidFetcher>,
    pub rail: Option<Arc<dyn PayoutRail>>,
    pub price: PriceFeed,
    pub network: String,
}

impl Payments {
    /// Build the rails; a missing treasury keypair disables paying, not fetching
    pub fn from_config(config: &AppConfig, client: reqwest::Client) -> Self {
        let payments = &config.payments;
        let cluster = payments.cluster();
        let rpc = SolanaRpc::new(client.clone(), payments.effective_rpc_url());
        let price = PriceFeed::new(client.clone(), payments.price_api_url.clone());
        let mut fetcher = PaidFetcher::new(client);
        let mut rail: Option<Arc<dyn PayoutRail>> = None;

        match load_treasury_keypair(payments) {
            Ok(keypair) => {
                let keypair = Arc::new(keypair);
                info!(
                    payer = %keypair.pubkey(),
                    network = cluster.as_str(),
                    "Treasury keypair loaded"
                );
                match SolanaExactHandler::new(
                    rpc.clone(),
                    keypair.clone(),
                    cluster,
                    payments.usdc_mint.as_deref(),
                ) {
                    Ok(handler) => fetcher = fetcher.with_handler(Arc::new(handler)),
                    Err(e) => warn!(error = %e, "x402 payments disabled"),
                }
                rail = Some(Arc::new(SolanaTreasury::new(
                    rpc,
                    keypair,
                    cluster,
                    Duration::from_secs(payments.confirm_timeout_secs),
                )));
            }
            Err(e) => {
                warn!(error = %e, "No treasury keypair; payouts and x402 payments disabled");
            }
        }

        Self {
            fetcher: Arc::new(fetcher),
            rail,
            price,
            network: cluster.as_str().to_string(),
        }
    }

    /// Unpaid fetcher and no rail
    pub fn disabled(client: reqwest::Client, config: &AppConfig) -> Self {
        Self {
            fetcher: Arc::new(PaidFetcher::new(client.clone())),
            rail: None,
            price: PriceFeed::new(client, config.payments.price_api_url.clone()),
            network: config.payments.cluster().as_str().to_string(),
        }
    }
}
