//! Research vendor tools

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{query_schema, str_param};
use crate::research::{ResearchClient, SearchResult};
use crate::store::ToolKind;
use crate::tools::{Tool, ToolDescription, ToolError};

fn query_input(parameters: &Value) -> Value {
    json!({"query": parameters.get("query").cloned().unwrap_or(Value::Null)})
}

fn ok_only(result: &Value) -> Value {
    json!({"ok": result.get("ok").cloned().unwrap_or(Value::Bool(false))})
}

/// `research_perplexity`: concise bullets from Perplexity
pub struct PerplexityTool {
    research: Arc<ResearchClient>,
}

impl PerplexityTool {
    pub fn new(research: Arc<ResearchClient>) -> Self {
        Self { research }
    }
}

#[async_trait]
impl Tool for PerplexityTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: "research_perplexity".to_string(),
            description: "Ask Perplexity for concise research bullets with sources".to_string(),
            parameters: query_schema("Research question"),
        }
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Perplexity
    }

    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError> {
        let query = str_param(parameters, "query")?;
        let text = self
            .research
            .ask_perplexity(query)
            .await
            .map_err(|e| ToolError::ExecutionError(e.to_string()))?;
        Ok(json!({"ok": true, "text": text}))
    }

    fn run_input(&self, parameters: &Value) -> Value {
        query_input(parameters)
    }

    fn run_output(&self, result: &Value) -> Value {
        ok_only(result)
    }
}

/// `research_tavily`: corroborating answer and source links from Tavily
pub struct TavilyTool {
    research: Arc<ResearchClient>,
}

impl TavilyTool {
    pub fn new(research: Arc<ResearchClient>) -> Self {
        Self { research }
    }
}

#[async_trait]
impl Tool for TavilyTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: "research_tavily".to_string(),
            description: "Search with Tavily to corroborate findings and collect source links"
                .to_string(),
            parameters: query_schema("Search query"),
        }
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Tavily
    }

    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError> {
        let query = str_param(parameters, "query")?;
        let text = self
            .research
            .ask_tavily(query)
            .await
            .map_err(|e| ToolError::ExecutionError(e.to_string()))?;
        Ok(json!({"ok": true, "text": text}))
    }

    fn run_input(&self, parameters: &Value) -> Value {
        query_input(parameters)
    }

    fn run_output(&self, result: &Value) -> Value {
        ok_only(result)
    }
}

const DEFAULT_LIMIT: usize = 3;
const MAX_LIMIT: usize = 5;

/// `web_search`: top Tavily results as `{title, url, snippet}`
pub struct WebSearchTool {
    research: Arc<ResearchClient>,
    max_results: usize,
}

impl WebSearchTool {
    pub fn new(research: Arc<ResearchClient>) -> Self {
        Self {
            research,
            max_results: MAX_LIMIT,
        }
    }

    /// Requested limit, clamped to the configured maximum
    fn extract_limit(parameters: &Value, max_results: usize) -> usize {
        let requested = parameters
            .get("limit")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_LIMIT);
        requested.clamp(1, max_results.max(1))
    }

    fn format_results(results: Vec<SearchResult>) -> Value {
        json!({ "results": results })
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: "web_search".to_string(),
            description: "Search the web for relevant information using Tavily. Returns the top results."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "minLength": 1, "description": "Search query"},
                    "limit": {"type": "integer", "minimum": 1, "maximum": MAX_LIMIT, "default": DEFAULT_LIMIT}
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        }
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Tavily
    }

    async fn initialize(&mut self, config: Option<&Value>) -> Result<(), ToolError> {
        if let Some(max) = config
            .and_then(|c| c.get("max_results"))
            .and_then(Value::as_u64)
        {
            self.max_results = (max as usize).clamp(1, MAX_LIMIT);
        }
        Ok(())
    }

    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError> {
        let query = str_param(parameters, "query")?;
        let limit = Self::extract_limit(parameters, self.max_results);
        // vendor failures degrade to an empty list
        let results = self
            .research
            .tavily_search(query, limit)
            .await
            .unwrap_or_default();
        Ok(Self::format_results(results))
    }
}
