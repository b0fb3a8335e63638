//! Tool-calling agent loop
//!
//! The model sees every registered tool and decides the call order itself,
//! guided by the generated instructions. Each requested call goes through
//! [`ToolSystem::execute_for_task`] and its JSON result is fed back as a
//! `tool` message until the model answers without tool calls.

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::AgentError;
use crate::llm::{CompletionRequest, CompletionResponse, LlmProvider, Message, ToolCall};
use crate::tools::ToolSystem;

const KICKOFF_MESSAGE: &str = "Proceed with the task as instructed.";

pub struct AutonomousAgent {
    llm: Arc<dyn LlmProvider>,
    tools: Arc<ToolSystem>,
    model: String,
    temperature: f32,
    max_iterations: usize,
}

impl AutonomousAgent {
    pub fn new(llm: Arc<dyn LlmProvider>, tools: Arc<ToolSystem>, model: impl Into<String>) -> Self {
        Self {
            llm,
            tools,
            model: model.into(),
            temperature: 0.2,
            max_iterations: 10,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Drive the loop to a final answer
    pub async fn run(&self, task_id: Uuid, instructions: &str) -> Result<String, AgentError> {
        let available_tools = self.tools.describe_all();
        let mut messages = vec![Message::system(instructions), Message::user(KICKOFF_MESSAGE)];
        let mut iteration = 0;

        loop {
            iteration += 1;
            Self::check_iteration_limit(iteration, self.max_iterations)?;

            let request = CompletionRequest::new(&self.model, messages.clone())
                .with_temperature(self.temperature)
                .with_tools(available_tools.clone());
            let response = self.llm.complete(request).await?;

            if Self::should_continue_tool_loop(&response) {
                let calls = response.tool_calls.clone().unwrap_or_default();
                debug!(%task_id, iteration, tool_count = calls.len(), "Processing tool calls");

                messages.push(Message::assistant_tool_calls(
                    response.content.clone().unwrap_or_default(),
                    calls.clone(),
                ));
                let results = self.execute_tool_calls(task_id, &calls).await;
                messages.extend(results);
                continue;
            }

            info!(%task_id, iterations = iteration, "Agent loop completed");
            return Ok(response.text());
        }
    }

    /// One `tool` message per call, in request order
    async fn execute_tool_calls(&self, task_id: Uuid, calls: &[ToolCall]) -> Vec<Message> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            debug!(%task_id, tool = %call.name, "Executing tool call");
            let output = match self
                .tools
                .execute_for_task(task_id, &call.name, &call.arguments)
                .await
            {
                Ok(result) => result,
                Err(e) => json!({ "ok": false, "error": e.to_string() }),
            };
            results.push(Message::tool_result(&call.id, output.to_string()));
        }
        results
    }

    fn check_iteration_limit(iteration: usize, max_iterations: usize) -> Result<(), AgentError> {
        if iteration > max_iterations {
            return Err(AgentError::IterationLimit(max_iterations));
        }
        Ok(())
    }

    fn should_continue_tool_loop(response: &CompletionResponse) -> bool {
        response.has_tool_calls()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MessageRole;
    use crate::store::Store;
    use crate::testing::mocks::{MockLlmProvider, MockTool, MockTurn};
    use crate::tools::test_context;

    fn tools_with(store: &Arc<Store>, tools: Vec<MockTool>) -> Arc<ToolSystem> {
        let mut context = test_context("http://127.0.0.1:9");
        context.store = store.clone();
        let mut system = ToolSystem::new(context);
        for tool in tools {
            system.register(Box::new(tool));
        }
        Arc::new(system)
    }

    #[tokio::test]
    async fn test_tool_results_are_fed_back() {
        let store = Arc::new(Store::new());
        let tavily = MockTool::succeeding("research_tavily", json!({"ok": true, "text": "links"}));
        let tavily_calls = tavily.calls();
        let tools = tools_with(&store, vec![tavily]);

        let llm = Arc::new(MockLlmProvider::with_turns(vec![
            MockTurn::call("research_tavily", json!({"query": "rust"})),
            MockTurn::Text("  - answer  ".to_string()),
        ]));
        let agent = AutonomousAgent::new(llm.clone(), tools, "agent-model");

        let task_id = Uuid::new_v4();
        let answer = agent.run(task_id, "Use tavily.").await.unwrap();
        assert_eq!(answer, "- answer");
        assert_eq!(tavily_calls.lock().unwrap().len(), 1);
        assert_eq!(store.list_tool_runs(task_id).await.len(), 1);

        let requests = llm.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].messages[0].content, "Use tavily.");
        assert_eq!(requests[0].messages[1].content, "Proceed with the task as instructed.");
        assert_eq!(requests[0].tools.as_ref().map(Vec::len), Some(1));

        let followup = &requests[1].messages;
        assert_eq!(followup.len(), 4);
        assert_eq!(followup[2].role, MessageRole::Assistant);
        assert_eq!(followup[3].role, MessageRole::Tool);
        assert_eq!(followup[3].tool_call_id.as_deref(), Some("call_research_tavily"));
        assert!(followup[3].content.contains("links"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_to_model() {
        let store = Arc::new(Store::new());
        let tools = tools_with(&store, vec![]);
        let llm = Arc::new(MockLlmProvider::with_turns(vec![
            MockTurn::call("delete_everything", json!({})),
            MockTurn::Text("done".to_string()),
        ]));
        let agent = AutonomousAgent::new(llm.clone(), tools, "m");

        assert_eq!(agent.run(Uuid::new_v4(), "x").await.unwrap(), "done");
        let tool_message = &llm.requests()[1].messages[3];
        assert!(tool_message.content.contains("Unknown tool: delete_everything"));
    }

    #[tokio::test]
    async fn test_iteration_cap() {
        let store = Arc::new(Store::new());
        let tools = tools_with(&store, vec![MockTool::succeeding("research_tavily", json!({"ok": true}))]);
        let llm = Arc::new(MockLlmProvider::with_turns(vec![MockTurn::call(
            "research_tavily",
            json!({"query": "again"}),
        )]));
        let agent = AutonomousAgent::new(llm.clone(), tools, "m").with_max_iterations(3);

        let err = agent.run(Uuid::new_v4(), "x").await.unwrap_err();
        assert!(matches!(err, AgentError::IterationLimit(3)));
        assert_eq!(llm.call_count(), 3);
    }

    #[tokio::test]
    async fn test_llm_failure_propagates() {
        let store = Arc::new(Store::new());
        let agent = AutonomousAgent::new(
            Arc::new(MockLlmProvider::failing()),
            tools_with(&store, vec![]),
            "m",
        );
        assert!(matches!(
            agent.run(Uuid::new_v4(), "x").await,
            Err(AgentError::Llm(_))
        ));
    }

    #[test]
    fn test_check_iteration_limit() {
        assert!(AutonomousAgent::check_iteration_limit(10, 10).is_ok());
        assert!(AutonomousAgent::check_iteration_limit(11, 10).is_err());
    }
}
