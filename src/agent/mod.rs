//! Task fulfillment
//!
//! A run generates instructions for the task, then either walks the fixed
//! pipeline (fetch, Perplexity, Tavily, x402 demo, synthesis) or hands the
//! tools to the model in a tool-calling loop. Whatever comes out decides the
//! final status, and a completed task triggers the payout.

pub mod autonomous;
pub mod classify;
pub mod instructions;
pub mod payout;
pub mod pipeline;
pub mod runner;

pub use autonomous::AutonomousAgent;
pub use classify::{classify_by_keywords, classify_task_type};
pub use instructions::{
    build_dynamic_instructions, build_prompt, generate_instructions, research_query, short_label,
    task_label,
};
pub use payout::{PayoutOutcome, PayoutPolicy, PayoutService};
pub use pipeline::{synthesis_prompt, PipelineOutput, PipelineParts, TaskPipeline};
pub use runner::{RunClaim, TaskRunner};

use thiserror::Error;

/// Errors from the tool-calling loop
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Tool execution exceeded maximum iterations ({0})")]
    IterationLimit(usize),
    #[error("LLM error: {0}")]
    Llm(#[from] crate::llm::LlmError),
}
