//! HTTP 402 payment negotiation
//!
//! [`PaidFetcher`] sends a request and, when the server answers
//! `402 Payment Required` with an x402 requirements body, asks the registered
//! [`PaymentHandler`]s for a payment, then retries once with the `X-PAYMENT`
//! header attached.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::solana::{
    associated_token_address, transfer_checked, Keypair, Message, Pubkey, SolanaRpc, Transaction,
};
use super::PaymentError;
use crate::config::Cluster;

pub const PAYMENT_HEADER: &str = "X-PAYMENT";
pub const PAYMENT_RESPONSE_HEADER: &str = "X-PAYMENT-RESPONSE";

const DEVNET_USDC_MINT: &str = "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU";
const MAINNET_USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qrzrWiHpJkXaXw1Ekpnk8Ngm4V";

/// One acceptable way to pay, as advertised by the server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: String,
    pub network: String,
    pub max_amount_required: String,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub mime_type: String,
    pub pay_to: String,
    #[serde(default)]
    pub max_timeout_seconds: u64,
    #[serde(default)]
    pub asset: String,
    #[serde(default)]
    pub extra: Option<Value>,
}

impl PaymentRequirements {
    fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.as_ref()?.get(key)?.as_str()
    }
}

/// Body of a 402 answer
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    pub x402_version: u32,
    #[serde(default)]
    pub accepts: Vec<PaymentRequirements>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Produces payment payloads for the requirements it understands
#[async_trait]
pub trait PaymentHandler: Send + Sync {
    fn name(&self) -> &str;

    fn accepts(&self, requirements: &PaymentRequirements) -> bool;

    /// Scheme-specific payload placed under `payload` in the header
    async fn create_payment(&self, requirements: &PaymentRequirements) -> Result<Value, PaymentError>;
}

/// Request description that can be replayed after paying
#[derive(Debug, Clone)]
pub struct PaidRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl PaidRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }
}

/// Fully read response
#[derive(Debug, Clone)]
pub struct PaidResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Bytes,
    /// Settlement receipt returned by the server after a paid retry
    pub payment_response: Option<String>,
    pub paid: bool,
}

impl PaidResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("text/html"))
    }
}

/// HTTP client that settles x402 challenges
pub struct PaidFetcher {
    client: reqwest::Client,
    handlers: Vec<Arc<dyn PaymentHandler>>,
}

impl PaidFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            handlers: Vec::new(),
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn PaymentHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn handler_names(&self) -> Vec<String> {
        self.handlers.iter().map(|h| h.name().to_string()).collect()
    }

    pub async fn send(&self, request: PaidRequest) -> Result<PaidResponse, PaymentError> {
        let first = self.execute(&request, None).await?;
        if first.status != StatusCode::PAYMENT_REQUIRED || self.handlers.is_empty() {
            return Ok(first);
        }

        let challenge: PaymentRequired = match first.json() {
            Ok(challenge) => challenge,
            Err(e) => {
                debug!(url = %request.url, error = %e, "402 without x402 body");
                return Ok(first);
            }
        };

        let Some((handler, requirements)) = self.select(&challenge.accepts) else {
            info!(
                url = %request.url,
                offered = challenge.accepts.len(),
                "No payment handler accepts the offered requirements"
            );
            return Ok(first);
        };

        let payload = match handler.create_payment(requirements).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(url = %request.url, handler = handler.name(), error = %e, "Payment creation failed");
                return Ok(first);
            }
        };

        let header = encode_payment_header(challenge.x402_version, requirements, payload)?;
        info!(
            url = %request.url,
            handler = handler.name(),
            network = %requirements.network,
            amount = %requirements.max_amount_required,
            "Retrying with x402 payment"
        );

        let mut retried = self.execute(&request, Some(header)).await?;
        retried.paid = true;
        Ok(retried)
    }

    fn select<'a>(
        &'a self,
        offered: &'a [PaymentRequirements],
    ) -> Option<(&'a Arc<dyn PaymentHandler>, &'a PaymentRequirements)> {
        offered.iter().find_map(|requirements| {
            self.handlers
                .iter()
                .find(|handler| handler.accepts(requirements))
                .map(|handler| (handler, requirements))
        })
    }

    async fn execute(
        &self,
        request: &PaidRequest,
        payment: Option<String>,
    ) -> Result<PaidResponse, PaymentError> {
        let mut builder = self.client.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(payment) = payment {
            builder = builder.header(PAYMENT_HEADER, payment);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| PaymentError::Http(e.to_string()))?;
        let status = response.status();
        let header_str = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header_str(reqwest::header::CONTENT_TYPE.as_str());
        let payment_response = header_str(PAYMENT_RESPONSE_HEADER);
        let body = response
            .bytes()
            .await
            .map_err(|e| PaymentError::Http(e.to_string()))?;

        Ok(PaidResponse {
            status,
            content_type,
            body,
            payment_response,
            paid: false,
        })
    }
}

/// base64 of `{x402Version, scheme, network, payload}`
pub fn encode_payment_header(
    x402_version: u32,
    requirements: &PaymentRequirements,
    payload: Value,
) -> Result<String, PaymentError> {
    let envelope = json!({
        "x402Version": x402_version,
        "scheme": requirements.scheme,
        "network": requirements.network,
        "payload": payload,
    });
    let raw = serde_json::to_vec(&envelope).map_err(|e| PaymentError::Encoding(e.to_string()))?;
    Ok(STANDARD.encode(raw))
}

/// USDC mint for a cluster, if one is known
pub fn default_usdc_mint(cluster: Cluster) -> Option<&'static str> {
    match cluster {
        Cluster::Devnet => Some(DEVNET_USDC_MINT),
        Cluster::MainnetBeta => Some(MAINNET_USDC_MINT),
        Cluster::Testnet => None,
    }
}

/// Pays `exact` requirements with an SPL TransferChecked from the treasury
pub struct SolanaExactHandler {
    rpc: SolanaRpc,
    keypair: Arc<Keypair>,
    cluster: Cluster,
    mint: Pubkey,
}

impl SolanaExactHandler {
    pub fn new(
        rpc: SolanaRpc,
        keypair: Arc<Keypair>,
        cluster: Cluster,
        mint_override: Option<&str>,
    ) -> Result<Self, PaymentError> {
        let mint = mint_override
            .or_else(|| default_usdc_mint(cluster))
            .ok_or_else(|| {
                PaymentError::NotConfigured(format!("no USDC mint known for {}", cluster.as_str()))
            })?;
        Ok(Self {
            rpc,
            keypair,
            cluster,
            mint: Pubkey::from_str(mint)?,
        })
    }

    pub fn mint(&self) -> Pubkey {
        self.mint
    }

    fn network_matches(&self, network: &str) -> bool {
        let cluster = self.cluster.as_str();
        network == cluster
            || network.strip_prefix("solana-") == Some(cluster)
            || (network == "solana" && self.cluster == Cluster::MainnetBeta)
    }
}

#[async_trait]
impl PaymentHandler for SolanaExactHandler {
    fn name(&self) -> &str {
        "solana-exact"
    }

    fn accepts(&self, requirements: &PaymentRequirements) -> bool {
        requirements.scheme == "exact"
            && self.network_matches(&requirements.network)
            && (requirements.asset.is_empty() || requirements.asset == self.mint.to_string())
    }

    async fn create_payment(&self, requirements: &PaymentRequirements) -> Result<Value, PaymentError> {
        let amount: u64 = requirements
            .max_amount_required
            .parse()
            .map_err(|_| {
                PaymentError::UnsupportedRequirements(format!(
                    "amount {}",
                    requirements.max_amount_required
                ))
            })?;
        let pay_to = Pubkey::from_str(&requirements.pay_to)?;
        let decimals = requirements
            .extra
            .as_ref()
            .and_then(|extra| extra.get("decimals"))
            .and_then(Value::as_u64)
            .and_then(|d| u8::try_from(d).ok())
            .unwrap_or(6);

        let payer = self.keypair.pubkey();
        let fee_payer = match requirements.extra_str("feePayer") {
            Some(key) => Pubkey::from_str(key)?,
            None => payer,
        };
        let blockhash = match requirements.extra_str("recentBlockhash") {
            Some(hash) => bs58::decode(hash)
                .into_vec()
                .ok()
                .and_then(|bytes| bytes.try_into().ok())
                .ok_or_else(|| PaymentError::UnsupportedRequirements(format!("blockhash {hash}")))?,
            None => self.rpc.get_latest_blockhash().await?,
        };

        let missing_ata = || PaymentError::Encoding("associated token address not found".to_string());
        let source = associated_token_address(&payer, &self.mint).ok_or_else(missing_ata)?;
        let destination = associated_token_address(&pay_to, &self.mint).ok_or_else(missing_ata)?;

        let ix = transfer_checked(&source, &self.mint, &destination, &payer, amount, decimals);
        let message = Message::compile(&[ix], &fee_payer, blockhash)?;
        let mut tx = Transaction::new_unsigned(message);
        tx.partial_sign(&[self.keypair.as_ref()])?;

        debug!(
            pay_to = %pay_to,
            amount,
            fee_payer = %fee_payer,
            "Built x402 transfer"
        );
        Ok(json!({ "transaction": STANDARD.encode(tx.serialize()) }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct RecordingHandler {
        network: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PaymentHandler for RecordingHandler {
        fn name(&self) -> &str {
            "recording"
        }

        fn accepts(&self, requirements: &PaymentRequirements) -> bool {
            requirements.network == self.network
        }

        async fn create_payment(&self, _requirements: &PaymentRequirements) -> Result<Value, PaymentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"proof": "ok"}))
        }
    }

    fn requirements(network: &str) -> Value {
        json!({
            "x402Version": 1,
            "accepts": [{
                "scheme": "exact",
                "network": network,
                "maxAmountRequired": "1000",
                "resource": "https://paid.example/data",
                "payTo": "11111111111111111111111111111111",
                "asset": DEVNET_USDC_MINT
            }]
        })
    }

    async fn paywalled(network: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .and(header_exists(PAYMENT_HEADER))
            .respond_with(ResponseTemplate::new(200).set_body_string("paid content"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(402).set_body_json(requirements(network)))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_retries_with_payment_header() {
        let server = paywalled("solana-devnet").await;
        let handler = Arc::new(RecordingHandler {
            network: "solana-devnet".to_string(),
            calls: AtomicUsize::new(0),
        });
        let fetcher = PaidFetcher::new(reqwest::Client::new()).with_handler(handler.clone());

        let response = fetcher
            .send(PaidRequest::get(format!("{}/data", server.uri())))
            .await
            .unwrap();
        assert!(response.is_success());
        assert!(response.paid);
        assert_eq!(response.text(), "paid content");
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
        let header = requests[1].headers.get(PAYMENT_HEADER).unwrap().to_str().unwrap();
        let decoded: Value = serde_json::from_slice(&STANDARD.decode(header).unwrap()).unwrap();
        assert_eq!(decoded["x402Version"], 1);
        assert_eq!(decoded["scheme"], "exact");
        assert_eq!(decoded["network"], "solana-devnet");
        assert_eq!(decoded["payload"]["proof"], "ok");
    }

    #[tokio::test]
    async fn test_unmatched_402_is_returned_unchanged() {
        let server = paywalled("base-sepolia").await;
        let handler = Arc::new(RecordingHandler {
            network: "solana-devnet".to_string(),
            calls: AtomicUsize::new(0),
        });
        let fetcher = PaidFetcher::new(reqwest::Client::new()).with_handler(handler.clone());

        let response = fetcher
            .send(PaidRequest::get(format!("{}/data", server.uri())))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::PAYMENT_REQUIRED);
        assert!(!response.paid);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_handlers_passes_402_through() {
        let server = paywalled("solana-devnet").await;
        let fetcher = PaidFetcher::new(reqwest::Client::new());
        let response = fetcher
            .send(PaidRequest::get(format!("{}/data", server.uri())))
            .await
            .unwrap();
        assert_eq!(response.status.as_u16(), 402);
    }

    #[tokio::test]
    async fn test_second_402_is_not_retried_again() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(402).set_body_json(requirements("solana-devnet")))
            .mount(&server)
            .await;
        let handler = Arc::new(RecordingHandler {
            network: "solana-devnet".to_string(),
            calls: AtomicUsize::new(0),
        });
        let fetcher = PaidFetcher::new(reqwest::Client::new()).with_handler(handler.clone());

        let response = fetcher.send(PaidRequest::get(server.uri())).await.unwrap();
        assert_eq!(response.status.as_u16(), 402);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    fn exact_handler(cluster: Cluster) -> SolanaExactHandler {
        SolanaExactHandler::new(
            SolanaRpc::new(reqwest::Client::new(), "http://127.0.0.1:9"),
            Arc::new(Keypair::from_secret(&[31u8; 32])),
            cluster,
            None,
        )
        .unwrap()
    }

    fn offer(network: &str, extra: Option<Value>) -> PaymentRequirements {
        PaymentRequirements {
            scheme: "exact".to_string(),
            network: network.to_string(),
            max_amount_required: "2500".to_string(),
            resource: String::new(),
            description: String::new(),
            mime_type: String::new(),
            pay_to: Keypair::from_secret(&[32u8; 32]).pubkey().to_string(),
            max_timeout_seconds: 60,
            asset: DEVNET_USDC_MINT.to_string(),
            extra,
        }
    }

    #[test]
    fn test_network_matching() {
        let handler = exact_handler(Cluster::Devnet);
        assert!(handler.accepts(&offer("devnet", None)));
        assert!(handler.accepts(&offer("solana-devnet", None)));
        assert!(!handler.accepts(&offer("solana", None)));
        assert!(!handler.accepts(&offer("base", None)));

        let mut upto = offer("devnet", None);
        upto.scheme = "upto".to_string();
        assert!(!handler.accepts(&upto));
    }

    #[test]
    fn test_testnet_needs_explicit_mint() {
        let result = SolanaExactHandler::new(
            SolanaRpc::new(reqwest::Client::new(), "http://127.0.0.1:9"),
            Arc::new(Keypair::from_secret(&[31u8; 32])),
            Cluster::Testnet,
            None,
        );
        assert!(matches!(result, Err(PaymentError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_exact_payment_leaves_fee_payer_slot_for_facilitator() {
        let handler = exact_handler(Cluster::Devnet);
        let facilitator = Keypair::from_secret(&[33u8; 32]).pubkey();
        let requirements = offer(
            "solana-devnet",
            Some(json!({
                "feePayer": facilitator.to_string(),
                "recentBlockhash": bs58::encode([3u8; 32]).into_string(),
                "decimals": 6
            })),
        );

        let payload = handler.create_payment(&requirements).await.unwrap();
        let wire = STANDARD
            .decode(payload["transaction"].as_str().unwrap())
            .unwrap();

        // two signature slots: facilitator first and unsigned, then ours
        assert_eq!(wire[0], 2);
        assert_eq!(&wire[1..65], &[0u8; 64]);
        assert_ne!(&wire[65..129], &[0u8; 64]);
        // message starts with the header, fee payer is the first account key
        let message = &wire[129..];
        assert_eq!(message[0], 2);
        assert_eq!(&message[4..36], facilitator.as_bytes());
    }
}
