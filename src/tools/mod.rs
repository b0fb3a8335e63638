//! Tool system for the fulfillment agent
//!
//! Tools are registered from the `[tools]` config table. Every call made on
//! behalf of a task is validated against the tool's JSON schema, executed, and
//! recorded as a tool run on that task whether it succeeded or not.

use crate::config::ToolConfig;
use crate::error::sanitize_error_message;
use crate::observability::metrics;
use crate::research::ResearchClient;
use crate::store::{Store, ToolKind};
use crate::tool_span;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

pub mod builtin;

/// Tool interface
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name, description and JSON schema of the parameters
    fn describe(&self) -> ToolDescription;

    /// Tool-run category this tool is recorded under
    fn kind(&self) -> ToolKind;

    /// Receives the `config` table from `[tools]`, once at startup
    async fn initialize(&mut self, _config: Option<&Value>) -> Result<(), ToolError> {
        Ok(())
    }

    /// Parameters have already been validated against `describe().parameters`
    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError>;

    /// Input recorded on the tool run
    fn run_input(&self, parameters: &Value) -> Value {
        parameters.clone()
    }

    /// Output recorded on the tool run for a completed call
    fn run_output(&self, result: &Value) -> Value {
        result.clone()
    }

    async fn shutdown(&mut self) -> Result<(), ToolError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Shared clients handed to builtin tools
#[derive(Clone)]
pub struct ToolContext {
    pub research: Arc<ResearchClient>,
    pub store: Arc<Store>,
    pub http: reqwest::Client,
    pub x402_demo_url: String,
}

pub struct ToolSystem {
    context: ToolContext,
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolSystem {
    pub fn new(context: ToolContext) -> Self {
        Self {
            context,
            tools: HashMap::new(),
        }
    }

    /// Create and initialize every configured tool
    pub async fn initialize(
        &mut self,
        tool_configs: &HashMap<String, ToolConfig>,
    ) -> Result<(), ToolError> {
        for (tool_name, tool_config) in tool_configs {
            let mut tool = self.create_tool(tool_name, tool_config)?;

            let config = match tool_config {
                ToolConfig::Simple(_) => None,
                ToolConfig::Complex { config, .. } => Some(
                    serde_json::to_value(config)
                        .map_err(|e| ToolError::InitializationError(e.to_string()))?,
                ),
            };
            tool.initialize(config.as_ref()).await?;

            debug!(tool = %tool_name, "Tool registered");
            self.tools.insert(tool_name.clone(), tool);
        }
        Ok(())
    }

    /// Add an already-initialized tool under its described name
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.describe().name, tool);
    }

    fn create_tool(&self, tool_name: &str, config: &ToolConfig) -> Result<Box<dyn Tool>, ToolError> {
        let impl_name = match config {
            ToolConfig::Simple(impl_name) => impl_name,
            ToolConfig::Complex { implementation, .. } => implementation,
        };

        match impl_name.as_str() {
            "builtin" => builtin::create(tool_name, &self.context),
            _ => Err(ToolError::UnknownImplementation(impl_name.clone())),
        }
    }

    pub fn describe_tool(&self, tool_name: &str) -> Option<ToolDescription> {
        self.tools.get(tool_name).map(|tool| tool.describe())
    }

    /// Descriptions of all tools, sorted by name
    pub fn describe_all(&self) -> Vec<ToolDescription> {
        let mut descriptions: Vec<ToolDescription> =
            self.tools.values().map(|tool| tool.describe()).collect();
        descriptions.sort_by(|a, b| a.name.cmp(&b.name));
        descriptions
    }

    pub fn has_tool(&self, tool_name: &str) -> bool {
        self.tools.contains_key(tool_name)
    }

    /// Validate and execute without recording a tool run
    pub async fn execute_tool(&self, tool_name: &str, parameters: &Value) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.to_string()))?;
        self.validate_parameters(tool.as_ref(), parameters)?;
        tool.execute(parameters).await
    }

    /// Execute on behalf of a task and record the run
    ///
    /// Failures come back as `{ok: false, error}` so the caller can keep
    /// going; only an unregistered tool is an error.
    pub async fn execute_for_task(
        &self,
        task_id: Uuid,
        tool_name: &str,
        parameters: &Value,
    ) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.to_string()))?;

        let span = tool_span!(tool = tool_name, task_id = %task_id);
        async {
            let started = Instant::now();
            let outcome = match self.validate_parameters(tool.as_ref(), parameters) {
                Ok(()) => tool.execute(parameters).await,
                Err(e) => Err(e),
            };
            let elapsed = started.elapsed();

            let (result, recorded_output, success) = match outcome {
                Ok(result) => {
                    let success = result.get("ok").and_then(Value::as_bool) != Some(false);
                    let recorded = tool.run_output(&result);
                    (result, recorded, success)
                }
                Err(e) => {
                    let failure = json!({ "ok": false, "error": sanitize_error_message(&e.detail()) });
                    (failure.clone(), failure, false)
                }
            };

            metrics().tool_executed(tool_name, elapsed, success);
            if success {
                debug!(ms = elapsed.as_millis() as u64, "Tool call ok");
            } else {
                warn!(ms = elapsed.as_millis() as u64, output = %recorded_output, "Tool call failed");
            }

            self.context
                .store
                .append_tool_run(task_id, tool.kind(), tool.run_input(parameters), recorded_output, success)
                .await;
            Ok(result)
        }
        .instrument(span)
        .await
    }

    fn validate_parameters(&self, tool: &dyn Tool, parameters: &Value) -> Result<(), ToolError> {
        let description = tool.describe();
        let validator = jsonschema::validator_for(&description.parameters)
            .map_err(|e| ToolError::SchemaError(format!("Schema compilation error: {e}")))?;

        validator.validate(parameters).map_err(|errors| {
            let error_messages: Vec<String> = errors
                .map(|e| format!("At '{}': {}", e.instance_path, e))
                .collect();
            ToolError::ValidationError(error_messages.join("; "))
        })
    }

    pub fn list_tools(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn shutdown(&mut self) -> Result<(), ToolError> {
        for tool in self.tools.values_mut() {
            tool.shutdown().await?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Unknown tool implementation: {0}")]
    UnknownImplementation(String),
    #[error("Tool initialization failed: {0}")]
    InitializationError(String),
    #[error("Parameter validation failed: {0}")]
    ValidationError(String),
    #[error("Schema error: {0}")]
    SchemaError(String),
    #[error("Tool execution failed: {0}")]
    ExecutionError(String),
    #[error("Tool shutdown failed: {0}")]
    ShutdownError(String),
}

impl ToolError {
    /// Message without the variant prefix for execution failures
    pub fn detail(&self) -> String {
        match self {
            ToolError::ExecutionError(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_context(base_url: &str) -> ToolContext {
    ToolContext {
        research: Arc::new(crate::research::test_client(base_url)),
        store: Arc::new(Store::new()),
        http: reqwest::Client::new(),
        x402_demo_url: base_url.to_string(),
    }
}
