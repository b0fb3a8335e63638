//! SOL/USD spot price for USD-denominated payouts

use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct PriceFeed {
    client: reqwest::Client,
    base_url: String,
}

impl PriceFeed {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Current SOL price in USD; `None` on any failure
    pub async fn sol_price_usd(&self) -> Option<f64> {
        let url = format!("{}/simple/price?ids=solana&vs_currencies=usd", self.base_url);
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Price request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(status = %response.status(), "Price request rejected");
            return None;
        }
        let body: Value = response.json().await.ok()?;
        body.pointer("/solana/usd").and_then(Value::as_f64)
    }

    /// Convert USD to SOL at the current price
    pub async fn usd_to_sol(&self, usd: f64) -> Option<f64> {
        let price = self.sol_price_usd().await?;
        (price > 0.0).then(|| usd / price)
    }
}
