//! AgenX micro-task marketplace
//!
//! Users post small tasks (summaries, captions, data extraction) with a SOL
//! payout. An agent fulfils them with web research and an LLM, the owner
//! hears about progress on Discord, and completed work is paid out from a
//! Solana treasury.
//!
//! # Layout
//!
//! - [`api`]: warp HTTP API and shared application state
//! - [`agent`]: instruction writing, the fulfillment pipeline, the
//!   tool-calling loop and the task runner
//! - [`tools`]: tools the agent can call, with JSON schema validation
//! - [`research`]: page text extraction, Perplexity and Tavily
//! - [`payments`]: x402 paid fetch, Solana transfers and the price feed
//! - [`notify`]: Discord notifications
//! - [`store`]: in-memory records
//! - [`cli`]: the work behind the binary's subcommands
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use agenx::api::{routes, AppState};
//! use agenx::config::AppConfig;
//! use std::sync::Arc;
//!
//! # async fn serve() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::from_toml_str("[server]\nport = 3000")?;
//! let state = Arc::new(AppState::build(&config).await?);
//! warp::serve(routes(state)).run(([127, 0, 0, 1], 3000)).await;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod notify;
pub mod observability;
pub mod payments;
pub mod research;
pub mod store;
pub mod testing;
pub mod tools;

pub use agent::{TaskPipeline, TaskRunner};
pub use api::{routes, AppState};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use store::{Store, Task, TaskStatus, TaskType};
pub use tools::{Tool, ToolDescription, ToolError, ToolSystem};
