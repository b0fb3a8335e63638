//! Task runs on demand and from the scheduler

use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use tracing::{error, info, warn};
use uuid::Uuid;
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::Filter;

use super::reply::{self, HandlerResult};
use super::{json_body, with_state, SharedState};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunBody {
    task_id: String,
}

pub fn routes(state: SharedState) -> BoxedFilter<(Response,)> {
    let run = warp::path!("api" / "agent" / "run")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(json_body())
        .and_then(run_agent);

    let tick = warp::path!("api" / "cron" / "agent-tick")
        .and(warp::get())
        .and(with_state(state))
        .and(warp::header::optional::<String>("x-cron-secret"))
        .and(warp::query::<HashMap<String, String>>())
        .and_then(agent_tick);

    run.or(tick).unify().boxed()
}

/// Internal failures answer 200 so dashboards keep polling
fn agent_failed() -> Response {
    reply::json(&json!({ "error": "Agent failed" }))
}

async fn run_agent(state: SharedState, body: Bytes) -> HandlerResult {
    let body: RunBody = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "Agent run body rejected");
            return Ok(agent_failed());
        }
    };
    let Ok(task_id) = Uuid::parse_str(body.task_id.trim()) else {
        return Ok(reply::error(StatusCode::NOT_FOUND, "Task not found"));
    };

    info!(%task_id, "Agent run requested");
    match state.runner.run(task_id).await {
        Ok(task) => Ok(reply::json(&json!({ "task": task }))),
        Err(AppError::NotFound(_)) => Ok(reply::error(StatusCode::NOT_FOUND, "Task not found")),
        Err(AppError::Conflict(_)) => {
            Ok(reply::error(StatusCode::CONFLICT, "Task already running"))
        }
        Err(e) => {
            error!(%task_id, error = %e, "Agent run failed");
            Ok(agent_failed())
        }
    }
}

/// A configured secret must arrive as the header or the `key` query value
fn tick_authorized(secret: Option<&str>, header: Option<&str>, key: Option<&str>) -> bool {
    match secret {
        None => true,
        Some(secret) => header == Some(secret) || key == Some(secret),
    }
}

async fn agent_tick(
    state: SharedState,
    header: Option<String>,
    query: HashMap<String, String>,
) -> HandlerResult {
    let authorized = tick_authorized(
        state.cron_secret.as_deref(),
        header.as_deref(),
        query.get("key").map(String::as_str),
    );
    if !authorized {
        return Ok(reply::unauthorized());
    }

    let queued = state.runner.run_batch(state.batch_size).await;
    Ok(reply::json(&json!({ "queued": queued })))
}
