//! Task CRUD, accept and quick create

use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::Filter;

use super::reply::{self, HandlerResult};
use super::{authorization, json_body, with_state, SharedState};
use crate::agent::classify_task_type;
use crate::observability::metrics;
use crate::store::{
    NewPayment, NewTask, PaymentStatus, StoreError, TaskPatch, TaskStatus, TaskType,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskBody {
    #[serde(rename = "type")]
    task_type: TaskType,
    title: Option<String>,
    description: Option<String>,
    source_url: Option<String>,
    input_text: Option<String>,
    attachment_id: Option<String>,
    payout_amount: String,
    #[serde(default = "default_currency")]
    payout_currency: String,
    #[serde(default)]
    save_to_drive: bool,
}

fn default_currency() -> String {
    "SOL".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateTaskBody {
    status: Option<TaskStatus>,
    assigned_agent_id: Option<String>,
    title: Option<String>,
    description: Option<String>,
    result_text: Option<String>,
    result_drive_file_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuickTaskBody {
    prompt: Option<String>,
    attachment_id: Option<String>,
    #[serde(default)]
    save_to_drive: bool,
    deposit_tx_hash: Option<String>,
    deposit_amount_sol: Option<serde_json::Value>,
}

pub fn routes(state: SharedState) -> BoxedFilter<(Response,)> {
    let list = warp::path!("api" / "tasks")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(authorization())
        .and_then(list_tasks);

    let create = warp::path!("api" / "tasks")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(authorization())
        .and(json_body())
        .and_then(create_task);

    let quick = warp::path!("api" / "tasks" / "quick")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(authorization())
        .and(json_body())
        .and_then(quick_task);

    let detail = warp::path!("api" / "tasks" / Uuid)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(task_detail);

    let delete = warp::path!("api" / "tasks" / Uuid)
        .and(warp::delete())
        .and(with_state(state.clone()))
        .and(authorization())
        .and_then(delete_task);

    let update = warp::path!("api" / "tasks" / Uuid)
        .and(warp::patch())
        .and(with_state(state.clone()))
        .and(authorization())
        .and(json_body())
        .and_then(update_task);

    let accept = warp::path!("api" / "tasks" / Uuid / "accept")
        .and(warp::post())
        .and(with_state(state))
        .and(authorization())
        .and_then(accept_task);

    list.or(create)
        .unify()
        .or(quick)
        .unify()
        .or(detail)
        .unify()
        .or(delete)
        .unify()
        .or(update)
        .unify()
        .or(accept)
        .unify()
        .boxed()
}

/// Non-negative decimal, as the payout column accepts
fn valid_amount(amount: &str) -> bool {
    amount
        .trim()
        .parse::<f64>()
        .map(|v| v.is_finite() && v >= 0.0)
        .unwrap_or(false)
}

fn valid_source_url(source_url: Option<&str>) -> bool {
    source_url.map_or(true, |u| url::Url::parse(u).is_ok())
}

async fn list_tasks(state: SharedState, auth: Option<String>) -> HandlerResult {
    let Some(user) = state.session(auth.as_deref()) else {
        return Ok(reply::unauthorized());
    };
    let tasks = state.store.tasks_with_payments(user.id).await;
    Ok(reply::json(&json!({ "tasks": tasks })))
}

async fn create_task(state: SharedState, auth: Option<String>, body: Bytes) -> HandlerResult {
    let Some(user) = state.session(auth.as_deref()) else {
        return Ok(reply::unauthorized());
    };
    let body: CreateTaskBody = match reply::parse_body(&body, "Invalid request") {
        Ok(body) => body,
        Err(response) => return Ok(response),
    };
    if !valid_amount(&body.payout_amount) || !valid_source_url(body.source_url.as_deref()) {
        return Ok(reply::invalid_request());
    }

    let deposit = NewPayment {
        payer_user_id: user.id,
        amount: body.payout_amount.clone(),
        currency: body.payout_currency.clone(),
        network: "devnet".to_string(),
        mint: Some(body.payout_currency.clone()),
        status: PaymentStatus::Pending,
        tx_hash: None,
    };
    let new = NewTask {
        title: body.title,
        description: body.description,
        source_url: body.source_url,
        input_text: body.input_text,
        attachment_id: body.attachment_id,
        payout_amount: body.payout_amount,
        payout_currency: body.payout_currency,
        save_to_drive: body.save_to_drive,
        ..NewTask::posted(body.task_type, user.id)
    };
    let task = state.store.create_task(new, Some(deposit)).await;
    metrics().task_created();
    info!(task_id = %task.id, task_type = %task.task_type, "Task posted");

    let payments = state.store.list_payments(task.id).await;
    let mut body = json!({ "task": task });
    body["task"]["payments"] = json!(payments);
    Ok(reply::json(&body))
}

async fn task_detail(id: Uuid, state: SharedState) -> HandlerResult {
    match state.store.task_detail(id).await {
        Some(task) => Ok(reply::json(&json!({ "task": task }))),
        None => Ok(reply::not_found()),
    }
}

async fn delete_task(id: Uuid, state: SharedState, auth: Option<String>) -> HandlerResult {
    let Some(user) = state.session(auth.as_deref()) else {
        return Ok(reply::unauthorized());
    };
    let Some(task) = state.store.get_task(id).await else {
        return Ok(reply::not_found());
    };
    if task.created_by_id != user.id {
        return Ok(reply::error(StatusCode::FORBIDDEN, "Forbidden"));
    }
    match state.store.delete_task(id).await {
        Ok(()) => {
            info!(task_id = %id, "Task deleted");
            Ok(reply::json(&json!({ "ok": true })))
        }
        Err(e) => {
            warn!(task_id = %id, error = %e, "Task delete failed");
            Ok(reply::error(StatusCode::BAD_REQUEST, "Failed to delete task"))
        }
    }
}

async fn update_task(
    id: Uuid,
    state: SharedState,
    auth: Option<String>,
    body: Bytes,
) -> HandlerResult {
    if state.session(auth.as_deref()).is_none() {
        return Ok(reply::unauthorized());
    }
    let body: UpdateTaskBody = match reply::parse_body(&body, "Invalid request") {
        Ok(body) => body,
        Err(response) => return Ok(response),
    };
    let assigned_agent_id = match body.assigned_agent_id.as_deref().map(Uuid::parse_str) {
        None => None,
        Some(Ok(agent_id)) => Some(agent_id),
        Some(Err(_)) => return Ok(reply::invalid_request()),
    };

    let patch = TaskPatch {
        status: body.status,
        assigned_agent_id,
        title: body.title,
        description: body.description,
        result_text: body.result_text.map(Some),
        result_drive_file_id: body.result_drive_file_id,
    };
    match state.store.update_task(id, patch).await {
        Ok(task) => Ok(reply::json(&json!({ "task": task }))),
        Err(_) => Ok(reply::invalid_request()),
    }
}

async fn accept_task(id: Uuid, state: SharedState, auth: Option<String>) -> HandlerResult {
    let Some(user) = state.session(auth.as_deref()) else {
        return Ok(reply::unauthorized());
    };
    let Some(task) = state.store.get_task(id).await else {
        return Ok(reply::not_found());
    };
    if task.status != TaskStatus::Posted {
        return Ok(reply::error(StatusCode::BAD_REQUEST, "Task not available"));
    }

    let agent = state.store.get_or_create_agent(user.id).await;
    if let Err(e) = state.store.claim_task(id, agent.id).await {
        return Ok(match e {
            StoreError::NotFound(_) => reply::not_found(),
            StoreError::Conflict(_) => reply::error(StatusCode::BAD_REQUEST, "Task not available"),
        });
    }
    info!(task_id = %id, agent_id = %agent.id, "Task accepted");

    match state.store.task_detail(id).await {
        Some(detail) => Ok(reply::json(&json!({ "task": detail }))),
        None => Ok(reply::not_found()),
    }
}

/// Text form of a JSON scalar, as sent by form-style clients
fn scalar_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

async fn quick_task(state: SharedState, auth: Option<String>, body: Bytes) -> HandlerResult {
    let Some(user) = state.session(auth.as_deref()) else {
        return Ok(reply::unauthorized());
    };
    let body: QuickTaskBody = match reply::parse_body(&body, "Invalid request body") {
        Ok(body) => body,
        Err(response) => return Ok(response),
    };
    let prompt = body.prompt.filter(|p| !p.is_empty());
    let attachment_id = body.attachment_id.filter(|a| !a.is_empty());
    if prompt.is_none() && attachment_id.is_none() {
        return Ok(reply::error(
            StatusCode::BAD_REQUEST,
            "Provide a prompt or an attachment",
        ));
    }

    let task_type = classify_task_type(
        state.llm.as_deref(),
        &state.llm_settings.agent_model,
        prompt.as_deref().unwrap_or(""),
    )
    .await;

    let new = NewTask {
        description: prompt.clone(),
        input_text: prompt,
        attachment_id,
        save_to_drive: body.save_to_drive,
        ..NewTask::posted(task_type, user.id)
    };
    let task = state.store.create_task(new, None).await;
    metrics().task_created();
    info!(task_id = %task.id, task_type = %task_type, "Quick task posted");

    let deposit_amount = body.deposit_amount_sol.as_ref().and_then(scalar_text);
    if let (Some(tx_hash), Some(amount)) = (body.deposit_tx_hash.filter(|h| !h.is_empty()), deposit_amount) {
        let deposit = NewPayment {
            payer_user_id: user.id,
            amount,
            currency: "SOL".to_string(),
            network: state.network.clone(),
            mint: None,
            status: PaymentStatus::Success,
            tx_hash: Some(tx_hash),
        };
        if let Err(e) = state.store.create_payment(task.id, deposit).await {
            warn!(task_id = %task.id, error = %e, "Deposit not recorded");
        }
    }

    Ok(reply::json(&json!({
        "task": { "id": task.id, "type": task.task_type, "status": task.status },
        "inferred": { "type": task_type },
    })))
}
