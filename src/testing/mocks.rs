//! Mock implementations for testing
//!
//! Scripted LLM, payout rail and tool doubles so the agent and HTTP layers
//! can be exercised without vendors or a chain.

use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider, TokenUsage,
    ToolCall,
};
use crate::payments::{PaymentError, PayoutRail};
use crate::store::ToolKind;
use crate::tools::{Tool, ToolDescription, ToolError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One scripted model turn
#[derive(Debug, Clone)]
pub enum MockTurn {
    Text(String),
    ToolCalls(Vec<ToolCall>),
    Fail(String),
}

impl MockTurn {
    /// Single tool call with a generated id
    pub fn call(name: &str, arguments: Value) -> Self {
        MockTurn::ToolCalls(vec![ToolCall {
            id: format!("call_{name}"),
            name: name.to_string(),
            arguments,
        }])
    }
}

/// Mock LLM provider replaying scripted turns in a cycle
#[derive(Debug, Default)]
pub struct MockLlmProvider {
    turns: Vec<MockTurn>,
    next: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_turns(turns: Vec<MockTurn>) -> Self {
        Self {
            turns,
            ..Default::default()
        }
    }

    pub fn with_responses(responses: Vec<String>) -> Self {
        Self::with_turns(responses.into_iter().map(MockTurn::Text).collect())
    }

    /// Every call fails
    pub fn failing() -> Self {
        Self::with_turns(vec![MockTurn::Fail("Mock LLM failure".to_string())])
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn available_models(&self) -> Vec<String> {
        vec!["mock-model".to_string()]
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        lock(&self.requests).push(request);

        let index = self.next.fetch_add(1, Ordering::SeqCst);
        let turn = if self.turns.is_empty() {
            MockTurn::Text("Mock response".to_string())
        } else {
            self.turns[index % self.turns.len()].clone()
        };

        let (content, tool_calls, finish_reason) = match turn {
            MockTurn::Text(text) => (Some(text), None, FinishReason::Stop),
            MockTurn::ToolCalls(calls) => (None, Some(calls), FinishReason::ToolCalls),
            MockTurn::Fail(message) => return Err(LlmError::RequestFailed(message)),
        };

        Ok(CompletionResponse {
            content,
            model: "mock-model".to_string(),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
            finish_reason,
            tool_calls,
            metadata: HashMap::new(),
        })
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        Ok(())
    }
}

/// Payout rail recording transfers instead of sending them
#[derive(Debug, Default)]
pub struct MockPayoutRail {
    pub transfers: Mutex<Vec<(String, f64)>>,
    pub should_fail: bool,
}

impl MockPayoutRail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub fn transfers(&self) -> Vec<(String, f64)> {
        lock(&self.transfers).clone()
    }
}

#[async_trait]
impl PayoutRail for MockPayoutRail {
    fn network(&self) -> &str {
        "devnet"
    }

    async fn transfer_sol(&self, recipient: &str, amount_sol: f64) -> Result<String, PaymentError> {
        if self.should_fail {
            return Err(PaymentError::TransactionFailed("Mock transfer failure".to_string()));
        }
        let mut transfers = lock(&self.transfers);
        transfers.push((recipient.to_string(), amount_sol));
        Ok(format!("mock-sig-{}", transfers.len()))
    }
}

/// Tool with a fixed outcome that records its calls
pub struct MockTool {
    name: String,
    kind: ToolKind,
    outcome: Result<Value, String>,
    delay: Option<Duration>,
    calls: Arc<Mutex<Vec<Value>>>,
}

impl MockTool {
    pub fn succeeding(name: &str, result: Value) -> Self {
        Self {
            name: name.to_string(),
            kind: ToolKind::DocParser,
            outcome: Ok(result),
            delay: None,
            calls: Arc::default(),
        }
    }

    pub fn failing(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ToolKind::DocParser,
            outcome: Err(message.to_string()),
            delay: None,
            calls: Arc::default(),
        }
    }

    pub fn with_kind(mut self, kind: ToolKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sleep this long before answering, to keep a run in flight
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Handle to the recorded parameters, usable after the tool is boxed
    pub fn calls(&self) -> Arc<Mutex<Vec<Value>>> {
        self.calls.clone()
    }
}

#[async_trait]
impl Tool for MockTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: self.name.clone(),
            description: format!("Mock tool {}", self.name),
            parameters: json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "additionalProperties": true
            }),
        }
    }

    fn kind(&self) -> ToolKind {
        self.kind
    }

    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError> {
        lock(&self.calls).push(parameters.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcome.clone().map_err(ToolError::ExecutionError)
    }
}
