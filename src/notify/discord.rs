//! Discord REST client

use serde_json::{json, Value};

use super::NotifyError;

const INVITE_PERMISSIONS: u32 = 27648;

#[derive(Debug, Clone)]
pub struct DiscordClient {
    client: reqwest::Client,
    api_base_url: String,
}

impl DiscordClient {
    pub fn new(client: reqwest::Client, api_base_url: impl Into<String>) -> Self {
        Self {
            client,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Post a message to a channel as the bot
    pub async fn send_message(
        &self,
        bot_token: &str,
        channel_id: &str,
        content: &str,
        embeds: Option<Vec<Value>>,
    ) -> Result<Value, NotifyError> {
        let mut body = json!({ "content": content });
        if let Some(embeds) = embeds {
            body["embeds"] = Value::Array(embeds);
        }

        let response = self
            .client
            .post(format!("{}/channels/{channel_id}/messages", self.api_base_url))
            .header("Authorization", format!("Bot {bot_token}"))
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Http(e.to_string()))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(NotifyError::Api {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(serde_json::from_str(&text).unwrap_or_else(|_| json!({ "ok": true })))
    }
}

/// Bot invite link with view, send, embed and attach permissions
pub fn invite_url(app_id: &str) -> String {
    format!(
        "https://discord.com/oauth2/authorize?client_id={app_id}&permissions={INVITE_PERMISSIONS}&scope=bot%20applications.commands"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_invite_url() {
        assert_eq!(
            invite_url("123"),
            "https://discord.com/oauth2/authorize?client_id=123&permissions=27648&scope=bot%20applications.commands"
        );
    }

    #[tokio::test]
    async fn test_send_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/42/messages"))
            .and(header("authorization", "Bot tok"))
            .and(body_json(json!({"content": "hello"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "m1"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = DiscordClient::new(reqwest::Client::new(), server.uri());
        let sent = client.send_message("tok", "42", "hello", None).await.unwrap();
        assert_eq!(sent["id"], "m1");
    }

    #[tokio::test]
    async fn test_api_error_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Missing Access"))
            .mount(&server)
            .await;

        let client = DiscordClient::new(reqwest::Client::new(), server.uri());
        let err = client.send_message("tok", "42", "hi", None).await.unwrap_err();
        assert_eq!(err.to_string(), "Discord API error 403: Missing Access");
    }
}
