//! Treasury payouts on a Solana cluster

pub mod keys;
pub mod rpc;
pub mod transaction;

pub use keys::{associated_token_address, load_treasury_keypair, Keypair, Pubkey};
pub use rpc::{SignatureStatus, SolanaRpc};
pub use transaction::{system_transfer, transfer_checked, Instruction, Message, Transaction};

use async_trait::async_trait;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::Cluster;
use crate::payments::PaymentError;

pub const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// Whole lamports for a SOL amount, rounded down
pub fn sol_to_lamports(amount_sol: f64) -> u64 {
    if !amount_sol.is_finite() || amount_sol <= 0.0 {
        return 0;
    }
    (amount_sol * LAMPORTS_PER_SOL).floor() as u64
}

pub fn explorer_tx_url(signature: &str, network: &str) -> String {
    format!("https://explorer.solana.com/tx/{signature}?cluster={network}")
}

/// Something that can move SOL to a recipient
#[async_trait]
pub trait PayoutRail: Send + Sync {
    /// Network name recorded on payment rows
    fn network(&self) -> &str;

    /// Send `amount_sol` to `recipient`, returning the confirmed signature
    async fn transfer_sol(&self, recipient: &str, amount_sol: f64) -> Result<String, PaymentError>;
}

/// Treasury wallet paying out through JSON-RPC
pub struct SolanaTreasury {
    rpc: SolanaRpc,
    keypair: Arc<Keypair>,
    cluster: Cluster,
    confirm_timeout: Duration,
}

impl SolanaTreasury {
    pub fn new(rpc: SolanaRpc, keypair: Arc<Keypair>, cluster: Cluster, confirm_timeout: Duration) -> Self {
        Self {
            rpc,
            keypair,
            cluster,
            confirm_timeout,
        }
    }

    pub fn payer(&self) -> Pubkey {
        self.keypair.pubkey()
    }
}

#[async_trait]
impl PayoutRail for SolanaTreasury {
    fn network(&self) -> &str {
        self.cluster.as_str()
    }

    async fn transfer_sol(&self, recipient: &str, amount_sol: f64) -> Result<String, PaymentError> {
        let to = Pubkey::from_str(recipient)?;
        let lamports = sol_to_lamports(amount_sol);
        if lamports == 0 {
            return Err(PaymentError::InvalidAmount(format!("{amount_sol} SOL")));
        }

        let payer = self.keypair.pubkey();
        let blockhash = self.rpc.get_latest_blockhash().await?;
        let message = Message::compile(&[system_transfer(&payer, &to, lamports)], &payer, blockhash)?;
        let mut tx = Transaction::new_unsigned(message);
        tx.partial_sign(&[self.keypair.as_ref()])?;

        let signature = self.rpc.send_transaction(&tx.serialize()).await?;
        self.rpc
            .confirm_signature(&signature, self.confirm_timeout)
            .await?;

        info!(
            recipient,
            lamports,
            signature = %signature,
            network = self.cluster.as_str(),
            "Payout confirmed"
        );
        Ok(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_lamports_round_down() {
        assert_eq!(sol_to_lamports(1.0), 1_000_000_000);
        assert_eq!(sol_to_lamports(0.000_000_001_9), 1);
        assert_eq!(sol_to_lamports(0.0), 0);
        assert_eq!(sol_to_lamports(-2.0), 0);
        assert_eq!(sol_to_lamports(f64::NAN), 0);
    }

    proptest! {
        #[test]
        fn prop_lamports_never_exceed_amount(amount in 0.0f64..1_000.0) {
            let lamports = sol_to_lamports(amount);
            prop_assert!(lamports as f64 <= amount * LAMPORTS_PER_SOL);
        }
    }

    #[test]
    fn test_explorer_link() {
        assert_eq!(
            explorer_tx_url("abc", "devnet"),
            "https://explorer.solana.com/tx/abc?cluster=devnet"
        );
    }

    async fn mount_rpc(server: &MockServer) {
        let hash = bs58::encode([8u8; 32]).into_string();
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "getLatestBlockhash"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "result": {"context": {"slot": 1}, "value": {"blockhash": hash, "lastValidBlockHeight": 1}}
            })))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "sendTransaction"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "result": "5ignature"
            })))
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "getSignatureStatuses"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "result": {"context": {"slot": 2}, "value": [{"confirmationStatus": "finalized", "err": null}]}
            })))
            .mount(server)
            .await;
    }

    fn treasury(server: &MockServer) -> SolanaTreasury {
        let rpc = SolanaRpc::new(reqwest::Client::new(), server.uri())
            .with_poll_interval(Duration::from_millis(10));
        SolanaTreasury::new(
            rpc,
            Arc::new(Keypair::from_secret(&[21u8; 32])),
            Cluster::Devnet,
            Duration::from_secs(2),
        )
    }

    #[tokio::test]
    async fn test_transfer_sol_sends_and_confirms() {
        let server = MockServer::start().await;
        mount_rpc(&server).await;
        let recipient = Keypair::from_secret(&[22u8; 32]).pubkey().to_string();

        let signature = treasury(&server).transfer_sol(&recipient, 0.25).await.unwrap();
        assert_eq!(signature, "5ignature");
    }

    #[tokio::test]
    async fn test_transfer_rejects_bad_inputs_without_rpc() {
        let server = MockServer::start().await;
        let treasury = treasury(&server);
        assert!(matches!(
            treasury.transfer_sol("not a key", 1.0).await,
            Err(PaymentError::InvalidPubkey(_))
        ));
        let recipient = Keypair::from_secret(&[22u8; 32]).pubkey().to_string();
        assert!(matches!(
            treasury.transfer_sol(&recipient, 0.0).await,
            Err(PaymentError::InvalidAmount(_))
        ));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }
}
