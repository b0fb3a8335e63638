//! Fixed-order fulfillment pipeline
//!
//! Stages run one after another through the tool system, so each call is
//! validated and recorded as a tool run. A failing stage leaves its part
//! empty and the next stage still runs. The gathered parts are handed to a
//! single synthesis call at the end.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::llm::{complete_text, LlmProvider};
use crate::tools::ToolSystem;

/// Context gathered by the research stages
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineParts {
    pub url_text: Option<String>,
    pub perplexity: Option<String>,
    pub tavily: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineOutput {
    /// Synthesized answer, empty when synthesis was unavailable or failed
    pub final_text: String,
    pub parts: PipelineParts,
}

pub struct TaskPipeline {
    tools: Arc<ToolSystem>,
    llm: Option<Arc<dyn LlmProvider>>,
    model: String,
    x402_demo: bool,
}

impl TaskPipeline {
    pub fn new(tools: Arc<ToolSystem>, llm: Option<Arc<dyn LlmProvider>>, model: impl Into<String>) -> Self {
        Self {
            tools,
            llm,
            model: model.into(),
            x402_demo: true,
        }
    }

    pub fn with_x402_demo(mut self, enabled: bool) -> Self {
        self.x402_demo = enabled;
        self
    }

    pub async fn run(
        &self,
        task_id: Uuid,
        instructions: &str,
        source_url: Option<&str>,
        research_query: &str,
    ) -> PipelineOutput {
        info!(%task_id, has_url = source_url.is_some(), "Pipeline start");
        let started = Instant::now();
        let mut parts = PipelineParts::default();

        if let Some(url) = source_url.filter(|u| !u.trim().is_empty()) {
            parts.url_text = self
                .text_stage(task_id, "fetch_url_text_url", json!({ "url": url }))
                .await;
        }
        parts.perplexity = self
            .text_stage(task_id, "research_perplexity", json!({ "query": research_query }))
            .await;
        parts.tavily = self
            .text_stage(task_id, "research_tavily", json!({ "query": research_query }))
            .await;

        if self.x402_demo {
            self.demo_stage(task_id).await;
        }

        let synth_started = Instant::now();
        let final_text = self.synthesize_final(instructions, &parts).await;
        info!(
            %task_id,
            ms = synth_started.elapsed().as_millis() as u64,
            len = final_text.len(),
            "Synthesis done"
        );
        info!(%task_id, total_ms = started.elapsed().as_millis() as u64, "Pipeline end");

        PipelineOutput { final_text, parts }
    }

    /// Run one stage and keep its `text` when the call succeeded
    async fn text_stage(&self, task_id: Uuid, tool: &str, params: Value) -> Option<String> {
        let started = Instant::now();
        let result = match self.tools.execute_for_task(task_id, tool, &params).await {
            Ok(result) => result,
            Err(e) => {
                error!(%task_id, stage = tool, error = %e, "Stage error");
                return None;
            }
        };
        let ms = started.elapsed().as_millis() as u64;

        if result.get("ok").and_then(Value::as_bool) != Some(true) {
            let reason = result.get("error").and_then(Value::as_str).unwrap_or("not ok");
            error!(%task_id, stage = tool, ms, error = reason, "Stage error");
            return None;
        }

        let text = result
            .get("text")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();
        info!(%task_id, stage = tool, ms, len = text.len(), "Stage ok");
        (!text.is_empty()).then(|| text.to_string())
    }

    async fn demo_stage(&self, task_id: Uuid) {
        match self
            .tools
            .execute_for_task(task_id, "x402_demo_call", &json!({}))
            .await
        {
            Ok(result) => info!(%task_id, status = %result.get("status").unwrap_or(&serde_json::Value::Null), "x402 demo call done"),
            Err(e) => warn!(%task_id, error = %e, "x402 demo call skipped"),
        }
    }

    /// Final answer from the gathered context; empty on any failure
    pub async fn synthesize_final(&self, instructions: &str, parts: &PipelineParts) -> String {
        let Some(llm) = self.llm.as_deref() else {
            return String::new();
        };
        match complete_text(llm, &self.model, None, &synthesis_prompt(instructions, parts), 0.2).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Synthesis failed");
                String::new()
            }
        }
    }
}

/// Prompt for the synthesis call
pub fn synthesis_prompt(instructions: &str, parts: &PipelineParts) -> String {
    fn section(label: &str, value: &Option<String>, placeholder: &str) -> String {
        match value.as_deref().filter(|v| !v.is_empty()) {
            Some(text) => format!("{label}:\n{text}"),
            None => placeholder.to_string(),
        }
    }

    [
        instructions.to_string(),
        String::new(),
        "Context:".to_string(),
        section("URL Text", &parts.url_text, "(no url text)"),
        section("Perplexity", &parts.perplexity, "(no perplexity)"),
        section("Tavily", &parts.tavily, "(no tavily)"),
        String::new(),
        "Write a concise final answer with bullets and 1–2 line summary.".to_string(),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Store, ToolKind};
    use crate::testing::mocks::{MockLlmProvider, MockTool};
    use crate::tools::test_context;

    fn tool_system(store: &Arc<Store>, tools: Vec<MockTool>) -> Arc<ToolSystem> {
        let mut context = test_context("http://127.0.0.1:9");
        context.store = store.clone();
        let mut system = ToolSystem::new(context);
        for tool in tools {
            system.register(Box::new(tool));
        }
        Arc::new(system)
    }

    #[test]
    fn test_synthesis_prompt_placeholders() {
        let parts = PipelineParts {
            url_text: None,
            perplexity: Some("- p".to_string()),
            tavily: None,
        };
        assert_eq!(
            synthesis_prompt("Do it.", &parts),
            "Do it.\n\nContext:\n(no url text)\nPerplexity:\n- p\n(no tavily)\n\nWrite a concise final answer with bullets and 1–2 line summary."
        );
    }

    #[tokio::test]
    async fn test_all_stages_in_order() {
        let store = Arc::new(Store::new());
        let fetch = MockTool::succeeding("fetch_url_text_url", json!({"ok": true, "text": "page"}));
        let perplexity = MockTool::succeeding("research_perplexity", json!({"ok": true, "text": "bullets"}))
            .with_kind(ToolKind::Perplexity);
        let tavily = MockTool::succeeding("research_tavily", json!({"ok": true, "text": "links"}))
            .with_kind(ToolKind::Tavily);
        let demo = MockTool::succeeding("x402_demo_call", json!({"ok": true, "status": 200}));
        let fetch_calls = fetch.calls();
        let tools = tool_system(&store, vec![fetch, perplexity, tavily, demo]);

        let llm = Arc::new(MockLlmProvider::with_responses(vec!["final".to_string()]));
        let pipeline = TaskPipeline::new(tools, Some(llm.clone() as Arc<dyn LlmProvider>), "synth-model");
        let task_id = Uuid::new_v4();
        let output = pipeline
            .run(task_id, "Be brief.", Some("https://example.com"), "rust")
            .await;

        assert_eq!(output.final_text, "final");
        assert_eq!(output.parts.url_text.as_deref(), Some("page"));
        assert_eq!(output.parts.tavily.as_deref(), Some("links"));
        assert_eq!(fetch_calls.lock().unwrap()[0], json!({"url": "https://example.com"}));

        let kinds: Vec<ToolKind> = store.list_tool_runs(task_id).await.iter().map(|r| r.tool).collect();
        assert_eq!(
            kinds,
            vec![ToolKind::DocParser, ToolKind::Perplexity, ToolKind::Tavily, ToolKind::DocParser]
        );

        let request = &llm.requests()[0];
        assert_eq!(request.model, "synth-model");
        assert!(request.messages[0].content.contains("URL Text:\npage"));
    }

    #[tokio::test]
    async fn test_failing_stage_does_not_stop_later_stages() {
        let store = Arc::new(Store::new());
        let perplexity = MockTool::failing("research_perplexity", "rate limited");
        let tavily = MockTool::succeeding("research_tavily", json!({"ok": true, "text": "links"}));
        let tavily_calls = tavily.calls();
        let tools = tool_system(&store, vec![perplexity, tavily]);

        let pipeline = TaskPipeline::new(tools, None, "m").with_x402_demo(false);
        let task_id = Uuid::new_v4();
        let output = pipeline.run(task_id, "Be brief.", None, "rust").await;

        assert_eq!(output.parts.perplexity, None);
        assert_eq!(output.parts.tavily.as_deref(), Some("links"));
        assert_eq!(output.parts.url_text, None);
        assert_eq!(tavily_calls.lock().unwrap().len(), 1);
        // no model configured
        assert_eq!(output.final_text, "");

        let runs = store.list_tool_runs(task_id).await;
        assert_eq!(runs.len(), 2);
        assert!(!runs[0].success);
    }

    #[tokio::test]
    async fn test_unregistered_stage_is_skipped() {
        let store = Arc::new(Store::new());
        let tools = tool_system(&store, vec![]);
        let llm: Arc<dyn LlmProvider> = Arc::new(MockLlmProvider::failing());
        let pipeline = TaskPipeline::new(tools, Some(llm), "m");

        let output = pipeline
            .run(Uuid::new_v4(), "x", Some("https://example.com"), "rust")
            .await;
        assert_eq!(output, PipelineOutput::default());
    }

    #[tokio::test]
    async fn test_ok_false_result_leaves_part_unset() {
        let store = Arc::new(Store::new());
        let tavily = MockTool::succeeding("research_tavily", json!({"ok": false, "error": "empty"}));
        let tools = tool_system(&store, vec![tavily]);
        let pipeline = TaskPipeline::new(tools, None, "m").with_x402_demo(false);

        let output = pipeline.run(Uuid::new_v4(), "x", None, "rust").await;
        assert_eq!(output.parts.tavily, None);
    }
}
