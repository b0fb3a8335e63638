//! Public listing of open tasks

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;
use warp::filters::BoxedFilter;
use warp::reply::Response;
use warp::Filter;

use super::reply::{self, HandlerResult};
use super::{with_state, SharedState};
use crate::store::{Task, TaskType};

/// Market projection of a POSTED task
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketTask {
    pub id: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub payout_amount: String,
    pub payout_currency: String,
    pub created_at: DateTime<Utc>,
}

impl From<Task> for MarketTask {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            title: task.title,
            description: task.description,
            task_type: task.task_type,
            payout_amount: task.payout_amount,
            payout_currency: task.payout_currency,
            created_at: task.created_at,
        }
    }
}

pub fn routes(state: SharedState) -> BoxedFilter<(Response,)> {
    warp::path!("api" / "market")
        .and(warp::get())
        .and(with_state(state))
        .and_then(market)
        .boxed()
}

async fn market(state: SharedState) -> HandlerResult {
    let tasks: Vec<MarketTask> = state
        .store
        .list_posted_tasks()
        .await
        .into_iter()
        .map(MarketTask::from)
        .collect();
    Ok(reply::json(&json!({ "tasks": tasks })))
}
