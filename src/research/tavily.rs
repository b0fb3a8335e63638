use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{ResearchClient, ResearchError};
use crate::payments::PaidRequest;

const SOURCE_LINES: usize = 5;

/// Normalized search hit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Default, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<TavilyHit>,
}

#[derive(Debug, Default, Deserialize)]
struct TavilyHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
}

impl ResearchClient {
    async fn tavily_search_raw(
        &self,
        key: &str,
        body: Value,
    ) -> Result<TavilyResponse, ResearchError> {
        let mut body = body;
        body["api_key"] = json!(key);
        let request = PaidRequest::post_json(format!("{}/search", self.settings.tavily_base_url), body)
            .bearer(key);

        let response = self.fetcher.send(request).await?;
        if !response.is_success() {
            return Err(ResearchError::Status {
                source_name: "Tavily".to_string(),
                status: response.status.as_u16(),
            });
        }
        response
            .json()
            .map_err(|e| ResearchError::InvalidResponse(e.to_string()))
    }

    /// Tavily answer followed by up to five `- title (url)` source lines
    pub async fn ask_tavily(&self, query: &str) -> Result<String, ResearchError> {
        let key = self
            .settings
            .tavily_api_key
            .as_deref()
            .ok_or(ResearchError::NotConfigured("Tavily"))?;

        let data = self
            .tavily_search_raw(
                key,
                json!({
                    "query": query,
                    "search_depth": "advanced",
                    "max_results": self.settings.tavily_max_results,
                    "include_answer": true,
                    "include_images": false,
                    "include_raw_content": false
                }),
            )
            .await?;

        let sources = data
            .results
            .iter()
            .take(SOURCE_LINES)
            .map(|hit| format!("- {} ({})", hit.title, hit.url))
            .collect::<Vec<_>>()
            .join("\n");
        let out = [data.answer.unwrap_or_default(), sources]
            .into_iter()
            .filter(|part| !part.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        if out.is_empty() {
            return Err(ResearchError::Empty("Tavily".to_string()));
        }
        Ok(out)
    }

    /// Plain search results; no key means no results
    pub async fn tavily_search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, ResearchError> {
        let Some(key) = self.settings.tavily_api_key.as_deref() else {
            debug!("Tavily key missing, returning no search results");
            return Ok(Vec::new());
        };

        let data = self
            .tavily_search_raw(key, json!({"query": query, "max_results": limit}))
            .await?;
        Ok(data
            .results
            .into_iter()
            .take(limit)
            .map(|hit| SearchResult {
                title: hit.title,
                url: hit.url,
                snippet: hit
                    .snippet
                    .filter(|s| !s.is_empty())
                    .or(hit.content)
                    .unwrap_or_default(),
            })
            .collect())
    }
}
