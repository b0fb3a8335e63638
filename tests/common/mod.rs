//! Shared setup for the HTTP integration tests
#![allow(dead_code)]

use agenx::api::{routes, AppState};
use agenx::config::AppConfig;
use agenx::llm::LlmProvider;
use agenx::payments::{Payments, PayoutRail};
use serde_json::{json, Value};
use std::sync::Arc;
use warp::http::StatusCode;

/// Every secret points at an unset variable and every vendor URL at a dead port
pub const BASE_CONFIG: &str = r#"
[llm]
api_key_env = "AGENX_IT_UNSET_OPENAI"

[auth]
jwt_secret_env = "AGENX_IT_UNSET_JWT"

[agent]
x402_demo = false

[research]
perplexity_api_key_env = "AGENX_IT_UNSET_PPLX"
tavily_api_key_env = "AGENX_IT_UNSET_TAVILY"

[tools]

[payments]
keypair_json_env = "AGENX_IT_UNSET_KP_JSON"
keypair_b64_env = "AGENX_IT_UNSET_KP_B64"
keypair_path = "missing/agenx-wallet.json"
agent_public_key_env = "AGENX_IT_UNSET_AGENT_KEY"
x402_demo_url = "http://127.0.0.1:9"
price_api_url = "http://127.0.0.1:9"

[discord]
bot_token_env = "AGENX_IT_UNSET_DISCORD_TOKEN"
fallback_channel_env = "AGENX_IT_UNSET_DISCORD_CHANNEL"
app_id_env = "AGENX_IT_UNSET_DISCORD_APP"
api_base_url = "http://127.0.0.1:9"

[cron]
secret_env = "AGENX_IT_UNSET_CRON"
"#;

pub fn config() -> AppConfig {
    AppConfig::from_toml_str(BASE_CONFIG).unwrap()
}

pub async fn state_with(
    config: &AppConfig,
    llm: Option<Arc<dyn LlmProvider>>,
    rail: Option<Arc<dyn PayoutRail>>,
) -> Arc<AppState> {
    let http = reqwest::Client::new();
    let mut payments = Payments::disabled(http.clone(), config);
    payments.rail = rail;
    Arc::new(AppState::assemble(config, http, llm, payments).await.unwrap())
}

pub async fn state() -> Arc<AppState> {
    state_with(&config(), None, None).await
}

pub struct Response {
    pub status: StatusCode,
    pub body: Value,
}

/// Send one request through the full route tree
pub async fn call(
    state: &Arc<AppState>,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Response {
    let mut request = warp::test::request().method(method).path(path);
    if let Some(token) = token {
        request = request.header("authorization", format!("Bearer {token}"));
    }
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.reply(&routes(state.clone())).await;
    let body = serde_json::from_slice(response.body()).unwrap_or(Value::Null);
    Response {
        status: response.status(),
        body,
    }
}

/// Register a user and return their token
pub async fn register(state: &Arc<AppState>, email: &str) -> String {
    let response = call(
        state,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({ "email": email, "password": "secret123", "name": "Test" })),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    response.body["token"].as_str().unwrap().to_string()
}

/// Post a summarization task and return its id
pub async fn post_task(state: &Arc<AppState>, token: &str, title: &str) -> String {
    let response = call(
        state,
        "POST",
        "/api/tasks",
        Some(token),
        Some(json!({
            "type": "SUMMARIZATION",
            "title": title,
            "inputText": "Rust is a systems programming language.",
            "payoutAmount": "0.1"
        })),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    response.body["task"]["id"].as_str().unwrap().to_string()
}
