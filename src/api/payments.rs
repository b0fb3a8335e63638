//! x402-style payment challenge and settlement webhook

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::Filter;

use super::reply::{self, HandlerResult};
use super::{json_body, with_state, SharedState};
use crate::store::{PaymentPatch, PaymentStatus, TaskPatch, TaskStatus};

const CHALLENGE_BASE_URL: &str = "https://x402.example/challenge";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChallengeBody {
    payment_id: Uuid,
    amount: Option<String>,
    mint: Option<String>,
    network: Option<String>,
    callback_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookBody {
    challenge_id: Option<String>,
    tx: Option<String>,
    status: Option<String>,
    payer_wallet: Option<String>,
    payee_wallet: Option<String>,
    settled_at: Option<DateTime<Utc>>,
}

pub fn routes(state: SharedState) -> BoxedFilter<(Response,)> {
    let challenge = warp::path!("api" / "payments" / "challenge")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(json_body())
        .and_then(challenge);

    let webhook = warp::path!("api" / "payments" / "webhook")
        .and(warp::post())
        .and(with_state(state))
        .and(json_body())
        .and_then(webhook);

    challenge.or(webhook).unify().boxed()
}

pub fn challenge_url(payment_id: Uuid) -> String {
    format!("{CHALLENGE_BASE_URL}/{payment_id}")
}

async fn challenge(state: SharedState, body: Bytes) -> HandlerResult {
    let body: ChallengeBody = match reply::parse_body(&body, "Invalid request") {
        Ok(body) => body,
        Err(response) => return Ok(response),
    };
    if let Some(callback) = body.callback_url.as_deref() {
        if url::Url::parse(callback).is_err() {
            return Ok(reply::invalid_request());
        }
    }

    let patch = PaymentPatch {
        amount: body.amount,
        mint: body.mint,
        network: body.network,
        callback_url: body.callback_url,
        payment_request_url: Some(challenge_url(body.payment_id)),
        challenge_id: Some(body.payment_id.to_string()),
        ..Default::default()
    };
    let payment = match state.store.update_payment(body.payment_id, patch).await {
        Ok(payment) => payment,
        Err(_) => return Ok(reply::invalid_request()),
    };
    info!(payment_id = %payment.id, "Payment challenge issued");

    Ok(reply::json(&json!({
        "challenge": {
            "id": payment.challenge_id,
            "amount": payment.amount,
            "mint": payment.mint,
            "network": payment.network,
            "payee": payment.payee_wallet_address,
            "callbackUrl": payment.callback_url,
            "paymentRequestUrl": payment.payment_request_url,
        }
    })))
}

async fn webhook(state: SharedState, body: Bytes) -> HandlerResult {
    let body: WebhookBody = match reply::parse_body(&body, "Invalid request") {
        Ok(body) => body,
        Err(response) => return Ok(response),
    };
    let challenge_id = body.challenge_id.filter(|c| !c.is_empty());
    let tx = body.tx.filter(|t| !t.is_empty());
    let (Some(challenge_id), Some(tx)) = (challenge_id, tx) else {
        return Ok(reply::error(StatusCode::BAD_REQUEST, "Missing challengeId or tx"));
    };
    // The challenge id is the payment id
    let Ok(payment_id) = Uuid::parse_str(&challenge_id) else {
        return Ok(reply::invalid_request());
    };

    let status = if body.status.as_deref() == Some("FAILED") {
        PaymentStatus::Failed
    } else {
        PaymentStatus::Success
    };
    let patch = PaymentPatch {
        tx_hash: Some(tx.clone()),
        settlement_sig: Some(tx),
        status: Some(status),
        payer_wallet_address: body.payer_wallet,
        payee_wallet_address: body.payee_wallet,
        settled_at: Some(body.settled_at.unwrap_or_else(Utc::now)),
        ..Default::default()
    };
    let payment = match state.store.update_payment(payment_id, patch).await {
        Ok(payment) => payment,
        Err(e) => {
            warn!(%payment_id, error = %e, "Webhook for unknown payment");
            return Ok(reply::invalid_request());
        }
    };

    if payment.status == PaymentStatus::Success {
        if let Err(e) = state
            .store
            .update_task(payment.task_id, TaskPatch::status(TaskStatus::Paid))
            .await
        {
            warn!(task_id = %payment.task_id, error = %e, "Paid task missing");
            return Ok(reply::invalid_request());
        }
    }
    info!(%payment_id, status = ?payment.status, "Payment settled");

    Ok(reply::json(&json!({ "ok": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_url() {
        let id = Uuid::nil();
        assert_eq!(
            challenge_url(id),
            "https://x402.example/challenge/00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_webhook_body_parses_settled_at() {
        let body: WebhookBody = serde_json::from_str(
            r#"{"challengeId":"c","tx":"sig","settledAt":"2025-01-02T03:04:05Z"}"#,
        )
        .unwrap();
        assert_eq!(body.settled_at.unwrap().to_rfc3339(), "2025-01-02T03:04:05+00:00");
        assert!(body.status.is_none());
    }
}
