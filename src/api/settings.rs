//! Per-user Discord channel and the bot integration helpers

use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::Filter;

use super::reply::{self, HandlerResult};
use super::{authorization, json_body, with_state, SharedState};
use crate::notify::{invite_url, NotifyError};

const TEST_MESSAGE: &str = "AgenX: test message";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelBody {
    channel_id: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TestMessageBody {
    content: Option<String>,
    bot_token: Option<String>,
    channel_id: Option<String>,
}

pub fn routes(state: SharedState) -> BoxedFilter<(Response,)> {
    let get_channel = warp::path!("api" / "settings" / "discord")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(authorization())
        .and_then(get_channel);

    let set_channel = warp::path!("api" / "settings" / "discord")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(authorization())
        .and(json_body())
        .and_then(set_channel);

    let invite = warp::path!("api" / "integrations" / "discord")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(invite);

    let test_message = warp::path!("api" / "integrations" / "discord")
        .and(warp::post())
        .and(with_state(state))
        .and(json_body())
        .and_then(send_test_message);

    get_channel
        .or(set_channel)
        .unify()
        .or(invite)
        .unify()
        .or(test_message)
        .unify()
        .boxed()
}

async fn get_channel(state: SharedState, auth: Option<String>) -> HandlerResult {
    let Some(user) = state.session(auth.as_deref()) else {
        return Ok(reply::unauthorized());
    };
    let channel = state
        .store
        .get_setting(user.id)
        .await
        .and_then(|s| s.discord_channel_id)
        .unwrap_or_default();
    Ok(reply::json(&json!({ "discordChannelId": channel })))
}

async fn set_channel(state: SharedState, auth: Option<String>, body: Bytes) -> HandlerResult {
    let Some(user) = state.session(auth.as_deref()) else {
        return Ok(reply::unauthorized());
    };
    let body: ChannelBody = match reply::parse_body(&body, "Invalid body") {
        Ok(body) => body,
        Err(response) => return Ok(response),
    };
    let channel = match body.channel_id {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };

    let saved = state
        .store
        .upsert_discord_channel(user.id, Some(channel))
        .await;
    info!(user_id = %user.id, "Discord channel saved");
    Ok(reply::json(&json!({
        "discordChannelId": saved.discord_channel_id.unwrap_or_default()
    })))
}

async fn invite(state: SharedState) -> HandlerResult {
    match state.discord_app_id.as_deref() {
        Some(app_id) => Ok(reply::json(&json!({ "inviteUrl": invite_url(app_id) }))),
        None => Ok(reply::json(&json!({
            "inviteUrl": null,
            "error": "DISCORD_APP_ID missing",
        }))),
    }
}

async fn send_test_message(state: SharedState, body: Bytes) -> HandlerResult {
    let body: TestMessageBody = serde_json::from_slice(&body).unwrap_or_default();
    let content = body
        .content
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| TEST_MESSAGE.to_string());
    let token = body
        .bot_token
        .filter(|t| !t.is_empty())
        .or_else(|| state.discord_bot_token.clone());
    let channel = body
        .channel_id
        .filter(|c| !c.is_empty())
        .or_else(|| state.discord_channel.clone());

    let (Some(token), Some(channel)) = (token, channel) else {
        return Ok(reply::error(
            StatusCode::BAD_REQUEST,
            "Missing DISCORD_BOT_TOKEN or DISCORD_CHANNEL_ID",
        ));
    };

    match state
        .notifier
        .client()
        .send_message(&token, &channel, &content, None)
        .await
    {
        Ok(sent) => Ok(reply::json(&sent)),
        Err(NotifyError::Api { status, body }) => {
            warn!(status, "Discord rejected test message");
            Ok(reply::error(
                StatusCode::BAD_REQUEST,
                &format!("Discord API {status}: {body}"),
            ))
        }
        Err(e) => Ok(reply::error(StatusCode::BAD_REQUEST, &e.to_string())),
    }
}
