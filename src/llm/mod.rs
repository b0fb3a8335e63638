//! LLM provider abstraction layer
//!
//! The service talks to chat-completion models in two places: agent-side
//! calls (instructions, classification, the autonomous loop) and the final
//! synthesis. [`LlmSettings`] picks the model for each.

pub mod provider;
pub mod providers;

pub use provider::*;
pub use providers::*;

use crate::config::AppConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Model choices resolved from config
#[derive(Debug, Clone, PartialEq)]
pub struct LlmSettings {
    pub model: String,
    pub agent_model: String,
    pub temperature: f32,
}

impl LlmSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.llm.model.clone(),
            agent_model: config.llm.effective_agent_model().to_string(),
            temperature: config.llm.temperature,
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            agent_model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
        }
    }
}

/// Build the configured provider; `None` when no API key is set
pub fn build_provider(config: &AppConfig) -> Result<Option<Arc<dyn LlmProvider>>, LlmError> {
    let Some(api_key) = config.llm_api_key() else {
        info!(
            env = %config.llm.api_key_env,
            "No LLM API key set; synthesis and instruction generation use fallbacks"
        );
        return Ok(None);
    };

    match config.llm.provider.as_str() {
        "openai" => {
            let provider = OpenAiProvider::new(OpenAiConfig {
                api_key,
                base_url: config.llm.base_url.clone(),
                timeout: Duration::from_secs(config.llm.timeout_secs),
            })?;
            Ok(Some(Arc::new(provider)))
        }
        other => Err(LlmError::NotConfigured(format!(
            "Unsupported LLM provider: {other}"
        ))),
    }
}

/// One-shot completion returning trimmed text; blank answers are errors
pub async fn complete_text(
    provider: &dyn LlmProvider,
    model: &str,
    system: Option<&str>,
    user: &str,
    temperature: f32,
) -> Result<String, LlmError> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system {
        messages.push(Message::system(system));
    }
    messages.push(Message::user(user));

    let response = provider
        .complete(CompletionRequest::new(model, messages).with_temperature(temperature))
        .await?;
    let text = response.text();
    if text.is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(text)
}
