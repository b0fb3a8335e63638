//! Status notifications to the task owner's Discord channel

pub mod discord;

pub use discord::{invite_url, DiscordClient};

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::observability::metrics;
use crate::store::Store;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Discord API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("HTTP error: {0}")]
    Http(String),
}

/// What happened to a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Sent,
    Skipped(&'static str),
    Failed(String),
}

pub struct Notifier {
    client: DiscordClient,
    store: Arc<Store>,
    bot_token: Option<String>,
    fallback_channel: Option<String>,
    debug: bool,
}

impl Notifier {
    pub fn new(
        client: DiscordClient,
        store: Arc<Store>,
        bot_token: Option<String>,
        fallback_channel: Option<String>,
        debug: bool,
    ) -> Self {
        Self {
            client,
            store,
            bot_token,
            fallback_channel,
            debug,
        }
    }

    pub fn from_config(config: &AppConfig, http: reqwest::Client, store: Arc<Store>) -> Self {
        Self::new(
            DiscordClient::new(http, config.discord.api_base_url.clone()),
            store,
            config.discord_bot_token(),
            config.discord_fallback_channel(),
            config.discord.debug,
        )
    }

    pub fn is_configured(&self) -> bool {
        self.bot_token.is_some()
    }

    pub fn client(&self) -> &DiscordClient {
        &self.client
    }

    /// Send `content` to the user's channel; never fails the caller
    pub async fn notify_user(&self, user_id: Uuid, content: &str) -> NotifyOutcome {
        let Some(token) = self.bot_token.as_deref() else {
            return self.skip(user_id, "bot token missing");
        };

        let channel = self
            .store
            .get_setting(user_id)
            .await
            .and_then(|setting| setting.discord_channel_id)
            .filter(|c| !c.trim().is_empty())
            .or_else(|| self.fallback_channel.clone());
        let Some(channel) = channel else {
            return self.skip(user_id, "no channel for user and no fallback channel");
        };

        match self.client.send_message(token, &channel, content, None).await {
            Ok(_) => {
                metrics().notification_sent();
                debug!(%user_id, channel = %channel, "Notification sent");
                NotifyOutcome::Sent
            }
            Err(e) => {
                metrics().notification_failed();
                if self.debug {
                    warn!(%user_id, channel = %channel, error = %e, "Notification failed");
                } else {
                    debug!(%user_id, channel = %channel, error = %e, "Notification failed");
                }
                NotifyOutcome::Failed(e.to_string())
            }
        }
    }

    fn skip(&self, user_id: Uuid, reason: &'static str) -> NotifyOutcome {
        metrics().notification_skipped();
        if self.debug {
            warn!(%user_id, reason, "Notification skipped");
        } else {
            debug!(%user_id, reason, "Notification skipped");
        }
        NotifyOutcome::Skipped(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notifier(server_uri: &str, store: Arc<Store>, token: Option<&str>, fallback: Option<&str>) -> Notifier {
        Notifier::new(
            DiscordClient::new(reqwest::Client::new(), server_uri),
            store,
            token.map(str::to_string),
            fallback.map(str::to_string),
            false,
        )
    }

    #[tokio::test]
    async fn test_skip_without_token_or_channel() {
        let store = Arc::new(Store::new());
        let user = Uuid::new_v4();

        let n = notifier("http://127.0.0.1:9", store.clone(), None, Some("1"));
        assert_eq!(n.notify_user(user, "x").await, NotifyOutcome::Skipped("bot token missing"));

        let n = notifier("http://127.0.0.1:9", store, Some("tok"), None);
        assert!(matches!(n.notify_user(user, "x").await, NotifyOutcome::Skipped(_)));
    }

    #[tokio::test]
    async fn test_user_channel_wins_over_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/user-chan/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "1"})))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(Store::new());
        let user = Uuid::new_v4();
        store
            .upsert_discord_channel(user, Some("user-chan".to_string()))
            .await;

        let n = notifier(&server.uri(), store, Some("tok"), Some("fallback"));
        assert_eq!(n.notify_user(user, "hello").await, NotifyOutcome::Sent);
    }

    #[tokio::test]
    async fn test_send_failures_are_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/fallback/messages"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let n = notifier(&server.uri(), Arc::new(Store::new()), Some("tok"), Some("fallback"));
        match n.notify_user(Uuid::new_v4(), "hello").await {
            NotifyOutcome::Failed(message) => assert!(message.contains("500")),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
