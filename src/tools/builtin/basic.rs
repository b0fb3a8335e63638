//! Small utility tools: naive page parse, document save, webhook notify

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use super::str_param;
use crate::research::ResearchClient;
use crate::store::{DocumentKind, Store, ToolKind};
use crate::tools::{Tool, ToolDescription, ToolError};

const PARSE_MAX_CHARS: usize = 20_000;

/// `parse_url`: tag-stripped page text; failures yield empty text
pub struct ParseUrlTool {
    research: Arc<ResearchClient>,
    max_chars: usize,
}

impl ParseUrlTool {
    pub fn new(research: Arc<ResearchClient>) -> Self {
        Self {
            research,
            max_chars: PARSE_MAX_CHARS,
        }
    }
}

#[async_trait]
impl Tool for ParseUrlTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: "parse_url".to_string(),
            description: "Fetch a URL and return extracted plain text (basic). Use for quick summaries."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {"url": {"type": "string", "format": "uri"}},
                "required": ["url"],
                "additionalProperties": false
            }),
        }
    }

    fn kind(&self) -> ToolKind {
        ToolKind::DocParser
    }

    async fn initialize(&mut self, config: Option<&Value>) -> Result<(), ToolError> {
        if let Some(max) = config.and_then(|c| c.get("max_chars")).and_then(Value::as_u64) {
            self.max_chars = max as usize;
        }
        Ok(())
    }

    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError> {
        let url = str_param(parameters, "url")?;
        let text = match self.research.fetch_plain_text(url, self.max_chars).await {
            Ok(text) => text,
            Err(e) => {
                debug!(url, error = %e, "parse_url failed");
                String::new()
            }
        };
        Ok(json!({"text": text}))
    }
}

/// `save_to_drive`: store the output as a TEXT document
pub struct SaveToDriveTool {
    store: Arc<Store>,
}

impl SaveToDriveTool {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SaveToDriveTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: "save_to_drive".to_string(),
            description: "Save final output to storage as a text document".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "user_id": {"type": "string", "minLength": 1},
                    "name": {"type": "string", "minLength": 1},
                    "content": {"type": "string", "minLength": 1}
                },
                "required": ["user_id", "name", "content"],
                "additionalProperties": false
            }),
        }
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Drive
    }

    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError> {
        let user_id = str_param(parameters, "user_id")?;
        let name = str_param(parameters, "name")?;
        let content = str_param(parameters, "content")?;
        let document = self
            .store
            .create_document(user_id, DocumentKind::Text, None, Some(content.to_string()))
            .await;
        Ok(json!({"document_id": document.id, "name": name}))
    }

    fn run_input(&self, parameters: &Value) -> Value {
        json!({
            "user_id": parameters.get("user_id").cloned().unwrap_or(Value::Null),
            "name": parameters.get("name").cloned().unwrap_or(Value::Null),
        })
    }
}

/// `notify_discord`: post a message to a Discord webhook
pub struct NotifyDiscordTool {
    http: reqwest::Client,
}

impl NotifyDiscordTool {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Tool for NotifyDiscordTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: "notify_discord".to_string(),
            description: "Send a message to a Discord channel via webhook URL".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "webhook_url": {"type": "string", "format": "uri"},
                    "message": {"type": "string", "minLength": 1}
                },
                "required": ["webhook_url", "message"],
                "additionalProperties": false
            }),
        }
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Discord
    }

    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError> {
        let webhook_url = str_param(parameters, "webhook_url")?;
        let message = str_param(parameters, "message")?;
        let ok = match self
            .http
            .post(webhook_url)
            .json(&json!({"content": message}))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Webhook post failed");
                false
            }
        };
        Ok(json!({"ok": ok}))
    }

    /// The webhook URL embeds a credential, so only the message is kept
    fn run_input(&self, parameters: &Value) -> Value {
        json!({"message": parameters.get("message").cloned().unwrap_or(Value::Null)})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::test_client;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_parse_url_truncates_and_swallows_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>hello</p><style>x{}</style><p>world</p>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut tool = ParseUrlTool::new(Arc::new(test_client(&server.uri())));
        let ok = tool
            .execute(&json!({"url": format!("{}/ok", server.uri())}))
            .await
            .unwrap();
        assert_eq!(ok, json!({"text": "hello world"}));

        tool.initialize(Some(&json!({"max_chars": 3}))).await.unwrap();
        let short = tool
            .execute(&json!({"url": format!("{}/ok", server.uri())}))
            .await
            .unwrap();
        assert_eq!(short["text"], "hel");

        let down = tool
            .execute(&json!({"url": format!("{}/down", server.uri())}))
            .await
            .unwrap();
        assert_eq!(down, json!({"text": ""}));
    }

    #[tokio::test]
    async fn test_save_to_drive_stores_text_document() {
        let store = Arc::new(Store::new());
        let tool = SaveToDriveTool::new(store.clone());
        let result = tool
            .execute(&json!({"user_id": "u1", "name": "summary.txt", "content": "final"}))
            .await
            .unwrap();
        assert_eq!(result["name"], "summary.txt");

        let id: uuid::Uuid = serde_json::from_value(result["document_id"].clone()).unwrap();
        let document = store.get_document(id).await.unwrap();
        assert_eq!(document.kind, DocumentKind::Text);
        assert_eq!(document.storage, "WEB");
        assert_eq!(document.extracted_text.as_deref(), Some("final"));
    }

    #[tokio::test]
    async fn test_notify_discord_webhook() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_json(json!({"content": "done"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let tool = NotifyDiscordTool::new(reqwest::Client::new());
        let params = json!({"webhook_url": format!("{}/hook", server.uri()), "message": "done"});
        assert_eq!(tool.execute(&params).await.unwrap(), json!({"ok": true}));
        assert_eq!(tool.run_input(&params), json!({"message": "done"}));

        let unreachable = json!({"webhook_url": "http://127.0.0.1:9/hook", "message": "x"});
        assert_eq!(tool.execute(&unreachable).await.unwrap(), json!({"ok": false}));
    }
}
