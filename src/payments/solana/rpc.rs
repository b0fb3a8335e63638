//! Minimal JSON-RPC client for the handful of cluster calls we make

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::payments::PaymentError;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ContextValue<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockhashValue {
    blockhash: String,
}

/// Entry of a `getSignatureStatuses` answer
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStatus {
    pub confirmation_status: Option<String>,
    pub err: Option<Value>,
}

impl SignatureStatus {
    pub fn is_confirmed(&self) -> bool {
        matches!(
            self.confirmation_status.as_deref(),
            Some("confirmed") | Some("finalized")
        )
    }
}

#[derive(Debug, Clone)]
pub struct SolanaRpc {
    client: reqwest::Client,
    url: String,
    poll_interval: Duration,
}

impl SolanaRpc {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, PaymentError> {
        let body = json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params});
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PaymentError::Http(format!("{method}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PaymentError::Rpc(format!("{method} returned {status}: {text}")));
        }

        let parsed: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| PaymentError::Rpc(format!("{method}: invalid response: {e}")))?;
        if let Some(error) = parsed.error {
            return Err(PaymentError::Rpc(format!(
                "{method} failed ({}): {}",
                error.code, error.message
            )));
        }
        parsed
            .result
            .ok_or_else(|| PaymentError::Rpc(format!("{method}: missing result")))
    }

    pub async fn get_latest_blockhash(&self) -> Result<[u8; 32], PaymentError> {
        let answer: ContextValue<BlockhashValue> = self
            .call("getLatestBlockhash", json!([{"commitment": "confirmed"}]))
            .await?;
        decode_blockhash(&answer.value.blockhash)
    }

    pub async fn get_block_height(&self) -> Result<u64, PaymentError> {
        self.call("getBlockHeight", json!([])).await
    }

    /// Submit a signed transaction, returning its signature
    pub async fn send_transaction(&self, wire: &[u8]) -> Result<String, PaymentError> {
        self.call(
            "sendTransaction",
            json!([
                STANDARD.encode(wire),
                {"encoding": "base64", "preflightCommitment": "confirmed"}
            ]),
        )
        .await
    }

    pub async fn get_signature_status(
        &self,
        signature: &str,
    ) -> Result<Option<SignatureStatus>, PaymentError> {
        let answer: ContextValue<Vec<Option<SignatureStatus>>> = self
            .call("getSignatureStatuses", json!([[signature]]))
            .await?;
        Ok(answer.value.into_iter().next().flatten())
    }

    /// Poll until the signature is confirmed, failed, or `timeout` elapses
    pub async fn confirm_signature(
        &self,
        signature: &str,
        timeout: Duration,
    ) -> Result<(), PaymentError> {
        let started = Instant::now();
        loop {
            match self.get_signature_status(signature).await {
                Ok(Some(status)) => {
                    if let Some(err) = status.err {
                        return Err(PaymentError::TransactionFailed(format!(
                            "{signature}: {err}"
                        )));
                    }
                    if status.is_confirmed() {
                        debug!(signature, "Transaction confirmed");
                        return Ok(());
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(signature, error = %e, "Signature status poll failed"),
            }

            if started.elapsed() >= timeout {
                return Err(PaymentError::ConfirmationTimeout(signature.to_string()));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn decode_blockhash(encoded: &str) -> Result<[u8; 32], PaymentError> {
    bs58::decode(encoded)
        .into_vec()
        .ok()
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| PaymentError::Rpc(format!("invalid blockhash {encoded}")))
}
