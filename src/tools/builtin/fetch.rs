//! Page fetch tools

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::str_param;
use crate::research::ResearchClient;
use crate::store::ToolKind;
use crate::tools::{Tool, ToolDescription, ToolError};

/// `fetch_url_text_url`: readable text of the task's source page
pub struct FetchUrlTool {
    research: Arc<ResearchClient>,
}

impl FetchUrlTool {
    pub fn new(research: Arc<ResearchClient>) -> Self {
        Self { research }
    }
}

#[async_trait]
impl Tool for FetchUrlTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: "fetch_url_text_url".to_string(),
            description: "Fetch readable text from a web page URL to ground the answer on its content"
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string", "format": "uri", "description": "Page to fetch"}
                },
                "required": ["url"],
                "additionalProperties": false
            }),
        }
    }

    fn kind(&self) -> ToolKind {
        ToolKind::DocParser
    }

    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError> {
        let url = str_param(parameters, "url")?;
        let text = self
            .research
            .fetch_url_text(url)
            .await
            .map_err(|e| ToolError::ExecutionError(e.to_string()))?;
        Ok(json!({"ok": true, "text": text}))
    }

    fn run_input(&self, parameters: &Value) -> Value {
        json!({"url": parameters.get("url").cloned().unwrap_or(Value::Null)})
    }

    fn run_output(&self, result: &Value) -> Value {
        let length = result
            .get("text")
            .and_then(Value::as_str)
            .map(|t| t.chars().count())
            .unwrap_or(0);
        json!({"ok": result.get("ok").cloned().unwrap_or(Value::Bool(false)), "length": length})
    }
}

/// `fetch_url_text`: placeholder offered when the task has no URL
pub struct FetchUrlTextTool;

#[async_trait]
impl Tool for FetchUrlTextTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: "fetch_url_text".to_string(),
            description: "Fetch page text for the task's source URL; reports when there is none"
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": true
            }),
        }
    }

    fn kind(&self) -> ToolKind {
        ToolKind::DocParser
    }

    async fn execute(&self, _parameters: &Value) -> Result<Value, ToolError> {
        Ok(json!({"ok": false, "error": "No URL provided"}))
    }

    fn run_input(&self, _parameters: &Value) -> Value {
        json!({"url": null, "tag": "no_url"})
    }
}
