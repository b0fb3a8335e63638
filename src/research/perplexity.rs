use serde_json::{json, Value};

use super::{ResearchClient, ResearchError};
use crate::payments::PaidRequest;

const SYSTEM_PROMPT: &str = "Return concise bullet points with sources if possible.";

impl ResearchClient {
    /// Bullet-point answer from Perplexity
    pub async fn ask_perplexity(&self, query: &str) -> Result<String, ResearchError> {
        let key = self
            .settings
            .perplexity_api_key
            .as_deref()
            .ok_or(ResearchError::NotConfigured("Perplexity"))?;

        let body = json!({
            "model": self.settings.perplexity_model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": query}
            ],
            "temperature": 0.1
        });
        let request = PaidRequest::post_json(
            format!("{}/chat/completions", self.settings.perplexity_base_url),
            body,
        )
        .bearer(key);

        let response = self.fetcher.send(request).await?;
        if !response.is_success() {
            return Err(ResearchError::Status {
                source_name: "Perplexity".to_string(),
                status: response.status.as_u16(),
            });
        }

        let data: Value = response
            .json()
            .map_err(|e| ResearchError::InvalidResponse(e.to_string()))?;
        let content = data
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or("");
        if content.is_empty() {
            return Err(ResearchError::Empty("Perplexity".to_string()));
        }
        Ok(content.to_string())
    }
}
