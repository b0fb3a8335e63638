//! Health and metrics endpoints
//!
//! Mounted next to the marketplace API so orchestrators and operators can
//! probe the same port.

use crate::observability::metrics::metrics;
use serde::Serialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::{Filter, Reply};

const TASK_STALENESS_THRESHOLD_SECONDS: u64 = 3600;

/// Process health state shared with the task runner
pub struct HealthMonitor {
    service_name: String,
    ready: AtomicBool,
    last_task_run: AtomicU64,
    integrations: RwLock<HashMap<String, HealthCheck>>,
}

impl HealthMonitor {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ready: AtomicBool::new(false),
            last_task_run: AtomicU64::new(0),
            integrations: RwLock::new(HashMap::new()),
        }
    }

    /// Mark the service as accepting traffic
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    /// Record that a task run just finished
    pub fn record_task_run(&self) {
        self.last_task_run
            .store(current_timestamp(), Ordering::Relaxed);
    }

    /// Report whether an integration has its credentials
    pub async fn set_integration(&self, name: &str, configured: bool) {
        let check = if configured {
            HealthCheck::healthy("configured")
        } else {
            HealthCheck {
                status: "disabled".to_string(),
                message: Some("credentials missing, stage will be skipped".to_string()),
                last_check: current_timestamp(),
            }
        };
        self.integrations.write().await.insert(name.to_string(), check);
    }

    fn check_task_activity(&self) -> HealthCheck {
        let now = current_timestamp();
        let last = self.last_task_run.load(Ordering::Relaxed);

        if last == 0 {
            HealthCheck::healthy("No task runs yet")
        } else if now.saturating_sub(last) > TASK_STALENESS_THRESHOLD_SECONDS {
            HealthCheck {
                status: "stale".to_string(),
                message: Some(format!(
                    "No task runs for {} seconds",
                    now.saturating_sub(last)
                )),
                last_check: now,
            }
        } else {
            HealthCheck::healthy("Recent task activity")
        }
    }

    /// Overall status; disabled integrations do not degrade it
    pub async fn status(&self) -> HealthStatus {
        let mut checks = HashMap::new();
        checks.insert("task_runs".to_string(), self.check_task_activity());
        for (name, check) in self.integrations.read().await.iter() {
            checks.insert(name.clone(), check.clone());
        }

        let healthy = checks
            .values()
            .all(|c| c.status == "healthy" || c.status == "disabled");
        metrics().update_health_status(healthy);

        HealthStatus {
            status: if healthy { "healthy" } else { "degraded" }.to_string(),
            timestamp: current_timestamp(),
            service: self.service_name.clone(),
            uptime_seconds: metrics().get_metrics().uptime_seconds,
            checks,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: Option<String>,
    pub last_check: u64,
}

impl HealthCheck {
    fn healthy(message: &str) -> Self {
        Self {
            status: "healthy".to_string(),
            message: Some(message.to_string()),
            last_check: current_timestamp(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: u64,
    pub service: String,
    pub uptime_seconds: u64,
    pub checks: HashMap<String, HealthCheck>,
}

#[derive(Debug, Serialize)]
struct ReadinessResponse {
    ready: bool,
    timestamp: u64,
}

#[derive(Debug, Serialize)]
struct LivenessResponse {
    alive: bool,
    timestamp: u64,
}

/// `GET /health`, `/ready`, `/live` and `/metrics`
pub fn health_routes(monitor: Arc<HealthMonitor>) -> BoxedFilter<(warp::reply::Response,)> {
    let health_monitor = monitor.clone();
    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(move || {
            let monitor = health_monitor.clone();
            async move {
                let status = monitor.status().await;
                let code = if status.status == "healthy" {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                };
                Ok::<_, Infallible>(
                    warp::reply::with_status(warp::reply::json(&status), code).into_response(),
                )
            }
        });

    let ready_monitor = monitor;
    let ready = warp::path("ready")
        .and(warp::path::end())
        .and(warp::get())
        .map(move || {
            let ready = ready_monitor.is_ready();
            let code = if ready {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            let body = ReadinessResponse {
                ready,
                timestamp: current_timestamp(),
            };
            warp::reply::with_status(warp::reply::json(&body), code).into_response()
        });

    let live = warp::path("live")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| {
            warp::reply::json(&LivenessResponse {
                alive: true,
                timestamp: current_timestamp(),
            })
            .into_response()
        });

    let metrics_route = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| warp::reply::json(&metrics().get_metrics()).into_response());

    health
        .or(ready)
        .unify()
        .or(live)
        .unify()
        .or(metrics_route)
        .unify()
        .boxed()
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
