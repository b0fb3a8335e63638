//! Treasury payout after a completed task

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};

use crate::config::AppConfig;
use crate::notify::Notifier;
use crate::observability::metrics;
use crate::payments::{explorer_tx_url, PayoutRail, PriceFeed};
use crate::payout_span;
use crate::store::{NewPayment, PaymentPatch, PaymentStatus, Store, Task};

/// Smallest payout sent when converting from USD
const MIN_CONVERTED_SOL: f64 = 0.000_001;

/// How much to pay per completed task
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PayoutPolicy {
    pub payout_sol: f64,
    pub payout_usd: f64,
}

impl PayoutPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            payout_sol: config.payments.payout_sol,
            payout_usd: config.payments.payout_usd,
        }
    }

    /// Fixed SOL amount, else the USD amount at the current price, else 0
    pub async fn amount_sol(&self, price: &PriceFeed) -> f64 {
        if self.payout_sol > 0.0 {
            return self.payout_sol;
        }
        if self.payout_usd > 0.0 {
            return match price.usd_to_sol(self.payout_usd).await {
                Some(sol) => sol.max(MIN_CONVERTED_SOL),
                None => 0.0,
            };
        }
        0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PayoutOutcome {
    Paid { signature: String, amount_sol: f64 },
    Skipped(&'static str),
    Failed(String),
}

pub struct PayoutService {
    rail: Option<Arc<dyn PayoutRail>>,
    price: PriceFeed,
    policy: PayoutPolicy,
    recipient: Option<String>,
    store: Arc<Store>,
    notifier: Arc<Notifier>,
    agent_name: String,
}

impl PayoutService {
    pub fn new(
        rail: Option<Arc<dyn PayoutRail>>,
        price: PriceFeed,
        policy: PayoutPolicy,
        recipient: Option<String>,
        store: Arc<Store>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            rail,
            price,
            policy,
            recipient,
            store,
            notifier,
            agent_name: "AgenX".to_string(),
        }
    }

    pub fn with_agent_name(mut self, name: impl Into<String>) -> Self {
        self.agent_name = name.into();
        self
    }

    /// Pay the agent wallet for `task`; failures are logged, never raised
    pub async fn settle(&self, task: &Task, label: &str) -> PayoutOutcome {
        let span = payout_span!(task_id = %task.id);
        self.settle_inner(task, label).instrument(span).await
    }

    async fn settle_inner(&self, task: &Task, label: &str) -> PayoutOutcome {
        let Some(recipient) = self.recipient.as_deref().filter(|r| !r.is_empty()) else {
            return skipped("no recipient wallet");
        };
        let Some(rail) = self.rail.as_ref() else {
            return skipped("payout rail not configured");
        };
        if self.already_paid(task, recipient).await {
            return skipped("agent already paid");
        }
        let amount_sol = self.policy.amount_sol(&self.price).await;
        if amount_sol <= 0.0 {
            return skipped("payout amount is zero");
        }

        let name = &self.agent_name;
        self.notifier
            .notify_user(
                task.created_by_id,
                &format!("{name}: Initiating payment of {amount_sol} SOL for \"{label}\"…"),
            )
            .await;
        info!(amount_sol, recipient, "Payout begin");

        let signature = match rail.transfer_sol(recipient, amount_sol).await {
            Ok(signature) => signature,
            Err(e) => {
                metrics().payout_failed();
                error!(error = %e, "Payout error");
                return PayoutOutcome::Failed(e.to_string());
            }
        };
        metrics().payout_sent();
        info!(signature = %signature, "Payout success");

        let network = rail.network().to_string();
        let recorded = self
            .store
            .create_payment(
                task.id,
                NewPayment {
                    payer_user_id: task.created_by_id,
                    amount: amount_sol.to_string(),
                    currency: "SOL".to_string(),
                    network: network.clone(),
                    mint: None,
                    status: PaymentStatus::Success,
                    tx_hash: Some(signature.clone()),
                },
            )
            .await;
        match recorded {
            Ok(payment) => {
                let patch = PaymentPatch {
                    payee_wallet_address: Some(recipient.to_string()),
                    settled_at: Some(Utc::now()),
                    ..Default::default()
                };
                if let Err(e) = self.store.update_payment(payment.id, patch).await {
                    warn!(error = %e, "Could not mark payout settled");
                }
            }
            Err(e) => error!(error = %e, "Payout sent but payment row not recorded"),
        }

        self.notifier
            .notify_user(
                task.created_by_id,
                &format!(
                    "{name}: Payment successful for \"{label}\". Tx: {signature}\n{}",
                    explorer_tx_url(&signature, &network)
                ),
            )
            .await;

        PayoutOutcome::Paid {
            signature,
            amount_sol,
        }
    }

    /// A successful payout to `recipient` is already recorded for the task
    async fn already_paid(&self, task: &Task, recipient: &str) -> bool {
        self.store.list_payments(task.id).await.iter().any(|p| {
            p.status == PaymentStatus::Success && p.payee_wallet_address.as_deref() == Some(recipient)
        })
    }
}

fn skipped(reason: &'static str) -> PayoutOutcome {
    metrics().payout_skipped();
    info!(reason, "Payout skipped");
    PayoutOutcome::Skipped(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::DiscordClient;
    use crate::store::{NewTask, TaskType};
    use crate::testing::mocks::MockPayoutRail;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn silent_notifier(store: &Arc<Store>) -> Arc<Notifier> {
        Arc::new(Notifier::new(
            DiscordClient::new(reqwest::Client::new(), "http://127.0.0.1:9"),
            store.clone(),
            None,
            None,
            false,
        ))
    }

    fn unreachable_price() -> PriceFeed {
        PriceFeed::new(reqwest::Client::new(), "http://127.0.0.1:9")
    }

    async fn seeded_task(store: &Store) -> Task {
        store
            .create_task(NewTask::posted(TaskType::Summarization, uuid::Uuid::new_v4()), None)
            .await
    }

    #[tokio::test]
    async fn test_policy_prefers_fixed_sol() {
        let policy = PayoutPolicy {
            payout_sol: 0.25,
            payout_usd: 10.0,
        };
        assert_eq!(policy.amount_sol(&unreachable_price()).await, 0.25);
        assert_eq!(PayoutPolicy::default().amount_sol(&unreachable_price()).await, 0.0);
    }

    #[tokio::test]
    async fn test_policy_converts_usd_with_floor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"solana": {"usd": 100.0}})))
            .mount(&server)
            .await;
        let price = PriceFeed::new(reqwest::Client::new(), server.uri());

        let policy = PayoutPolicy {
            payout_sol: 0.0,
            payout_usd: 5.0,
        };
        assert!((policy.amount_sol(&price).await - 0.05).abs() < 1e-12);

        let tiny = PayoutPolicy {
            payout_sol: 0.0,
            payout_usd: 0.000_000_01,
        };
        assert_eq!(tiny.amount_sol(&price).await, MIN_CONVERTED_SOL);
    }

    #[tokio::test]
    async fn test_usd_without_price_pays_nothing() {
        let policy = PayoutPolicy {
            payout_sol: 0.0,
            payout_usd: 5.0,
        };
        assert_eq!(policy.amount_sol(&unreachable_price()).await, 0.0);
    }

    #[tokio::test]
    async fn test_settle_records_payment_and_notifies() {
        let discord = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/chan-1/messages"))
            .and(body_partial_json(json!({"content": "AgenX: Initiating payment of 0.01 SOL for \"Label\"…"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "1"})))
            .expect(1)
            .mount(&discord)
            .await;
        Mock::given(method("POST"))
            .and(path("/channels/chan-1/messages"))
            .and(body_partial_json(json!({
                "content": "AgenX: Payment successful for \"Label\". Tx: mock-sig-1\nhttps://explorer.solana.com/tx/mock-sig-1?cluster=devnet"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "2"})))
            .expect(1)
            .mount(&discord)
            .await;

        let store = Arc::new(Store::new());
        let notifier = Arc::new(Notifier::new(
            DiscordClient::new(reqwest::Client::new(), discord.uri()),
            store.clone(),
            Some("bot-token".to_string()),
            Some("chan-1".to_string()),
            false,
        ));
        let rail = Arc::new(MockPayoutRail::new());
        let service = PayoutService::new(
            Some(rail.clone() as Arc<dyn PayoutRail>),
            unreachable_price(),
            PayoutPolicy {
                payout_sol: 0.01,
                payout_usd: 0.0,
            },
            Some("AgentWallet111".to_string()),
            store.clone(),
            notifier,
        );

        let task = seeded_task(&store).await;
        let outcome = service.settle(&task, "Label").await;
        assert_eq!(
            outcome,
            PayoutOutcome::Paid {
                signature: "mock-sig-1".to_string(),
                amount_sol: 0.01
            }
        );
        assert_eq!(rail.transfers(), vec![("AgentWallet111".to_string(), 0.01)]);

        let payments = store.list_payments(task.id).await;
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].status, PaymentStatus::Success);
        assert_eq!(payments[0].amount, "0.01");
        assert_eq!(payments[0].network, "devnet");
        assert_eq!(payments[0].tx_hash.as_deref(), Some("mock-sig-1"));
        assert_eq!(payments[0].payee_wallet_address.as_deref(), Some("AgentWallet111"));
        assert!(payments[0].settled_at.is_some());
    }

    #[tokio::test]
    async fn test_settle_pays_a_task_once() {
        let store = Arc::new(Store::new());
        let rail = Arc::new(MockPayoutRail::new());
        let service = PayoutService::new(
            Some(rail.clone() as Arc<dyn PayoutRail>),
            unreachable_price(),
            PayoutPolicy {
                payout_sol: 0.01,
                payout_usd: 0.0,
            },
            Some("AgentWallet111".to_string()),
            store.clone(),
            silent_notifier(&store),
        );
        let task = seeded_task(&store).await;

        assert!(matches!(service.settle(&task, "t").await, PayoutOutcome::Paid { .. }));
        assert_eq!(
            service.settle(&task, "t").await,
            PayoutOutcome::Skipped("agent already paid")
        );
        assert_eq!(rail.transfers().len(), 1);
        assert_eq!(store.list_payments(task.id).await.len(), 1);

        let other = seeded_task(&store).await;
        assert!(matches!(service.settle(&other, "t").await, PayoutOutcome::Paid { .. }));
        assert_eq!(rail.transfers().len(), 2);
    }

    #[tokio::test]
    async fn test_settle_skips_and_failures() {
        let store = Arc::new(Store::new());
        let task = seeded_task(&store).await;
        let policy = PayoutPolicy {
            payout_sol: 0.01,
            payout_usd: 0.0,
        };

        let no_recipient = PayoutService::new(
            Some(Arc::new(MockPayoutRail::new())),
            unreachable_price(),
            policy,
            None,
            store.clone(),
            silent_notifier(&store),
        );
        assert!(matches!(no_recipient.settle(&task, "t").await, PayoutOutcome::Skipped(_)));

        let no_rail = PayoutService::new(
            None,
            unreachable_price(),
            policy,
            Some("wallet".to_string()),
            store.clone(),
            silent_notifier(&store),
        );
        assert!(matches!(no_rail.settle(&task, "t").await, PayoutOutcome::Skipped(_)));

        let zero = PayoutService::new(
            Some(Arc::new(MockPayoutRail::new())),
            unreachable_price(),
            PayoutPolicy::default(),
            Some("wallet".to_string()),
            store.clone(),
            silent_notifier(&store),
        );
        assert_eq!(zero.settle(&task, "t").await, PayoutOutcome::Skipped("payout amount is zero"));

        let failing = PayoutService::new(
            Some(Arc::new(MockPayoutRail::with_failure())),
            unreachable_price(),
            policy,
            Some("wallet".to_string()),
            store.clone(),
            silent_notifier(&store),
        );
        assert!(matches!(failing.settle(&task, "t").await, PayoutOutcome::Failed(_)));
        assert!(store.list_payments(task.id).await.is_empty());
    }
}
