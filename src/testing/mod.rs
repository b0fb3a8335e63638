//! Testing utilities and mock implementations
//!
//! Doubles for the LLM provider, the payout rail and tools, so the agent
//! and HTTP layers can be tested without third-party services.

pub mod mocks;

pub use mocks::*;
