//! Builtin tools
//!
//! Each module keeps argument parsing and result shaping in plain functions
//! next to the I/O that uses them.

pub mod basic;
pub mod fetch;
pub mod research;
pub mod x402_demo;

pub use basic::{NotifyDiscordTool, ParseUrlTool, SaveToDriveTool};
pub use fetch::{FetchUrlTextTool, FetchUrlTool};
pub use research::{PerplexityTool, TavilyTool, WebSearchTool};
pub use x402_demo::X402DemoTool;

use super::{Tool, ToolContext, ToolError};
use serde_json::Value;

/// Instantiate a builtin by its configured name
pub fn create(tool_name: &str, context: &ToolContext) -> Result<Box<dyn Tool>, ToolError> {
    let tool: Box<dyn Tool> = match tool_name {
        "fetch_url_text_url" => Box::new(FetchUrlTool::new(context.research.clone())),
        "fetch_url_text" => Box::new(FetchUrlTextTool),
        "research_perplexity" => Box::new(PerplexityTool::new(context.research.clone())),
        "research_tavily" => Box::new(TavilyTool::new(context.research.clone())),
        "web_search" => Box::new(WebSearchTool::new(context.research.clone())),
        "x402_demo_call" => Box::new(X402DemoTool::new(
            context.research.fetcher().clone(),
            context.x402_demo_url.clone(),
        )),
        "parse_url" => Box::new(ParseUrlTool::new(context.research.clone())),
        "save_to_drive" => Box::new(SaveToDriveTool::new(context.store.clone())),
        "notify_discord" => Box::new(NotifyDiscordTool::new(context.http.clone())),
        _ => return Err(ToolError::UnknownTool(tool_name.to_string())),
    };
    Ok(tool)
}

/// Required string argument
pub(crate) fn str_param<'a>(parameters: &'a Value, name: &str) -> Result<&'a str, ToolError> {
    parameters
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::ExecutionError(format!("Missing parameter: {name}")))
}

/// Schema for a single `query` string of at least two characters
pub(crate) fn query_schema(description: &str) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "minLength": 2,
                "description": description
            }
        },
        "required": ["query"],
        "additionalProperties": false
    })
}
